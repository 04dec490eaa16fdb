//! Eight-scene blend state shared by every cell in an encoder bank.
//!
//! Grounded on `EncoderBank.hpp`'s `StateEncoderCell::SceneManager`: two
//! active scene indices blended by a `[0,1]` factor, with writes
//! distributed across both endpoints and clamp-conservation so a write
//! near a scene's rail doesn't silently lose gesture.

use crate::error::{ModulationError, ModulationResult};

pub const NUM_SCENES: usize = 8;

fn check_scene(scene: usize) -> ModulationResult<()> {
    if scene >= NUM_SCENES {
        return Err(ModulationError::SceneOutOfRange(scene));
    }
    Ok(())
}

/// Blended read of an 8-scene value array at the manager's current
/// `(scene1, scene2, blend)` state.
pub fn scene_value(values: &[f32; NUM_SCENES], scene1: usize, scene2: usize, blend: f32) -> f32 {
    values[scene1] * (1.0 - blend) + values[scene2] * blend
}

/// Owns the current `(track, scene1, scene2, blend)` tuple and the
/// per-frame changed flags that force a modulation-tree recompute.
#[derive(Clone)]
pub struct SceneManager {
    track: usize,
    num_tracks: usize,
    scene1: usize,
    scene2: usize,
    blend: f32,
    changed: bool,
    changed_scene: bool,
}

impl SceneManager {
    pub fn new(num_tracks: usize) -> Self {
        SceneManager { track: 0, num_tracks, scene1: 0, scene2: 1, blend: 0.0, changed: true, changed_scene: true }
    }

    /// A manager with both blend endpoints pinned to `scene`, so reads
    /// and writes through it act on that one scene's slot directly
    /// regardless of the blend factor. Used by the scene document layer,
    /// which serializes absolute per-scene values rather than a blend.
    pub fn single_scene(num_tracks: usize, scene: usize) -> ModulationResult<Self> {
        check_scene(scene)?;
        Ok(SceneManager { track: 0, num_tracks, scene1: scene, scene2: scene, blend: 0.0, changed: true, changed_scene: true })
    }

    pub fn track(&self) -> usize {
        self.track
    }

    pub fn set_track(&mut self, track: usize) -> ModulationResult<()> {
        if track >= self.num_tracks {
            return Err(ModulationError::TrackOutOfRange(track));
        }
        if track != self.track {
            self.track = track;
            self.changed = true;
        }
        Ok(())
    }

    pub fn scene1(&self) -> usize {
        self.scene1
    }

    pub fn scene2(&self) -> usize {
        self.scene2
    }

    pub fn blend(&self) -> f32 {
        self.blend
    }

    pub fn set_blend(&mut self, blend: f32) {
        let blend = blend.clamp(0.0, 1.0);
        if blend != self.blend {
            self.blend = blend;
            self.changed = true;
        }
    }

    /// Whichever endpoint the current blend sits closer to (ties favor
    /// `scene1`).
    pub fn nearer_endpoint(&self) -> usize {
        if self.blend <= 0.5 {
            self.scene1
        } else {
            self.scene2
        }
    }

    /// A scene-change message: without `shift`, replace whichever endpoint
    /// is nearer the current blend with `target`. With `shift`, the caller
    /// should instead copy the current blended value into `target` (via
    /// each cell's `copy_to_scene`) and leave the endpoints alone.
    ///
    /// Returns the endpoint that was replaced, or `None` when `shift` was
    /// held (a copy, not a replace).
    pub fn change_scene(&mut self, target: usize, shift: bool) -> ModulationResult<Option<usize>> {
        check_scene(target)?;
        self.changed_scene = true;
        self.changed = true;
        if shift {
            return Ok(None);
        }

        if self.blend <= 0.5 {
            self.scene1 = target;
        } else {
            self.scene2 = target;
        }
        Ok(Some(target))
    }

    /// Distribute a delta across both blend endpoints. At the rails
    /// (`blend` 0 or 1) the delta lands entirely on the active endpoint;
    /// in between, each endpoint takes its `(1-t)`/`t` share, and if one
    /// endpoint clips, the other is recomputed so the blended read still
    /// lands exactly on the clamped target value.
    pub fn write(&self, values: &mut [f32; NUM_SCENES], delta: f32) {
        if delta == 0.0 {
            return;
        }

        let t = self.blend;
        if t <= 0.0 {
            values[self.scene1] = (values[self.scene1] + delta).clamp(0.0, 1.0);
            return;
        }
        if t >= 1.0 {
            values[self.scene2] = (values[self.scene2] + delta).clamp(0.0, 1.0);
            return;
        }

        let target = (scene_value(values, self.scene1, self.scene2, t) + delta).clamp(0.0, 1.0);
        let new1 = values[self.scene1] + delta * (1.0 - t);
        let new2 = values[self.scene2] + delta * t;

        if !(0.0..=1.0).contains(&new1) {
            values[self.scene1] = new1.clamp(0.0, 1.0);
            values[self.scene2] = (target - values[self.scene1] * (1.0 - t)) / t;
        } else if !(0.0..=1.0).contains(&new2) {
            values[self.scene2] = new2.clamp(0.0, 1.0);
            values[self.scene1] = (target - values[self.scene2] * t) / (1.0 - t);
        } else {
            values[self.scene1] = new1;
            values[self.scene2] = new2;
        }
    }

    pub fn take_changed(&mut self) -> bool {
        std::mem::replace(&mut self.changed, false)
    }

    pub fn take_changed_scene(&mut self) -> bool {
        std::mem::replace(&mut self.changed_scene, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_value_blends_linearly() {
        let mut values = [0.0f32; NUM_SCENES];
        values[0] = 0.0;
        values[1] = 1.0;
        assert_eq!(scene_value(&values, 0, 1, 0.25), 0.25);
    }

    #[test]
    fn write_splits_delta_by_blend_factor() {
        let manager = SceneManager::new(4);
        let mut values = [0.5f32; NUM_SCENES];
        manager.write(&mut values, 0.2);
        assert!((values[0] - 0.7).abs() < 1e-5);
        assert!((values[1] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn write_rebalances_when_one_endpoint_clamps() {
        let mut manager = SceneManager::new(4);
        manager.set_blend(0.5);
        let mut values = [0.0f32; NUM_SCENES];
        values[0] = 0.95;
        values[1] = 0.0;
        manager.write(&mut values, 0.2);
        // scene1 wants +0.1 but only has 0.05 headroom; scene2 is
        // recomputed so the blended read still lands on the clamped
        // target value instead of just the naive +0.1 share.
        assert!((values[0] - 1.0).abs() < 1e-5);
        assert!((values[1] - 0.35).abs() < 1e-5);
    }

    #[test]
    fn change_scene_without_shift_replaces_nearer_endpoint() {
        let mut manager = SceneManager::new(4);
        manager.set_blend(0.2);
        let replaced = manager.change_scene(5, false).unwrap();
        assert_eq!(replaced, Some(5));
        assert_eq!(manager.scene1(), 5);
        assert_eq!(manager.scene2(), 1);
    }

    #[test]
    fn change_scene_with_shift_leaves_endpoints_alone() {
        let mut manager = SceneManager::new(4);
        let replaced = manager.change_scene(5, true).unwrap();
        assert_eq!(replaced, None);
        assert_eq!(manager.scene1(), 0);
        assert_eq!(manager.scene2(), 1);
        assert!(manager.take_changed_scene());
    }
}
