//! The encoder modulation tree: a base parameter with up to 15 modulator
//! amounts and 16 performance gestures, each itself a full node so
//! modulators can be modulated.
//!
//! Grounded on `EncoderBank.hpp`'s `BankedEncoderCell`/`Modulators`: the
//! `ModulatorValues` changed-bitset gate, the post-gesture-then-modulator
//! two-stage `Compute`, and the gesture-redirect on `Increment`. Every
//! active modulator always contributes to the weighted sum; the
//! affecting-bitset gate only decides whether a modulator's own subtree
//! needs recomputing this frame (see the Open Question note in
//! `DESIGN.md` on the original's early-exit, which this reconstructs as a
//! pure recompute-skip rather than a sum exclusion).

use crate::scene::SceneManager;
use crate::state_cell::{StateCell, MAX_POLY};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub const NUM_MODULATORS: usize = 15;
pub const NUM_GESTURES: usize = 16;

/// A bitset over up to 16 modulators or gestures (`BitSet16` in the
/// original).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bits16(u16);

impl Bits16 {
    pub fn zero() -> Self {
        Bits16(0)
    }

    pub fn set(&mut self, index: usize, value: bool) {
        if value {
            self.0 |= 1 << index;
        } else {
            self.0 &= !(1 << index);
        }
    }

    pub fn get(&self, index: usize) -> bool {
        self.0 & (1 << index) != 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn intersect(&self, other: Bits16) -> Bits16 {
        Bits16(self.0 & other.0)
    }

    pub fn union(&mut self, other: Bits16) {
        self.0 |= other.0;
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

/// Per-frame modulator/gesture weight arrays, shared by every node in one
/// encoder bank. Filled externally (e.g. from live CV or another bank's
/// output), then `compute_changed` diffs against the previous frame so
/// `ModulatorNode::compute` can skip untouched subtrees.
pub struct ModulatorValues {
    value: [[f32; MAX_POLY]; NUM_MODULATORS],
    value_prev: [[f32; MAX_POLY]; NUM_MODULATORS],
    gesture_weights: [f32; NUM_GESTURES],
    gesture_weights_prev: [f32; NUM_GESTURES],
    changed_modulators: Bits16,
    changed_gestures: Bits16,
}

impl ModulatorValues {
    pub fn new() -> Self {
        ModulatorValues {
            value: [[0.0; MAX_POLY]; NUM_MODULATORS],
            value_prev: [[0.0; MAX_POLY]; NUM_MODULATORS],
            gesture_weights: [0.0; NUM_GESTURES],
            gesture_weights_prev: [0.0; NUM_GESTURES],
            changed_modulators: Bits16::zero(),
            changed_gestures: Bits16::zero(),
        }
    }

    pub fn set_modulator_value(&mut self, modulator: usize, track_voice: usize, value: f32) {
        self.value[modulator][track_voice] = value;
    }

    pub fn modulator_value(&self, modulator: usize, track_voice: usize) -> f32 {
        self.value[modulator][track_voice]
    }

    pub fn set_gesture_weight(&mut self, gesture: usize, weight: f32) {
        self.gesture_weights[gesture] = weight;
    }

    pub fn gesture_weight(&self, gesture: usize) -> f32 {
        self.gesture_weights[gesture]
    }

    pub fn changed_modulators(&self) -> Bits16 {
        self.changed_modulators
    }

    pub fn changed_gestures(&self) -> Bits16 {
        self.changed_gestures
    }

    pub fn compute_changed(&mut self) {
        self.changed_modulators.clear();
        self.changed_gestures.clear();
        for i in 0..NUM_MODULATORS {
            if self.value[i] != self.value_prev[i] {
                self.changed_modulators.set(i, true);
                self.value_prev[i] = self.value[i];
            }
        }
        for i in 0..NUM_GESTURES {
            if self.gesture_weights[i] != self.gesture_weights_prev[i] {
                self.changed_gestures.set(i, true);
                self.gesture_weights_prev[i] = self.gesture_weights[i];
            }
        }
    }
}

impl Default for ModulatorValues {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderType {
    BaseParam,
    ModulatorAmount,
    GestureParam,
}

/// State every node's children and frame logic share: current track,
/// voice count, the globally selected gesture slot (if any), and a shift
/// flag that changes what `increment` does while a gesture is selected.
pub struct SharedEncoderState {
    pub num_tracks: usize,
    pub num_voices: usize,
    pub current_track: AtomicUsize,
    pub shift: AtomicBool,
    selected_gesture: AtomicUsize,
}

const NO_GESTURE: usize = usize::MAX;

impl SharedEncoderState {
    pub fn new(num_tracks: usize, num_voices: usize) -> Arc<Self> {
        Arc::new(SharedEncoderState {
            num_tracks,
            num_voices,
            current_track: AtomicUsize::new(0),
            shift: AtomicBool::new(false),
            selected_gesture: AtomicUsize::new(NO_GESTURE),
        })
    }

    pub fn selected_gesture(&self) -> Option<usize> {
        match self.selected_gesture.load(Ordering::Relaxed) {
            NO_GESTURE => None,
            g => Some(g),
        }
    }

    pub fn select_gesture(&self, gesture: Option<usize>) {
        self.selected_gesture.store(gesture.unwrap_or(NO_GESTURE), Ordering::Relaxed);
    }

    pub fn track(&self) -> usize {
        self.current_track.load(Ordering::Relaxed)
    }
}

/// One node of the modulation tree: a base parameter, a modulator amount,
/// or a gesture, each of which can itself carry its own modulators and
/// gestures.
pub struct ModulatorNode {
    state: StateCell,
    kind: EncoderType,
    index: usize,
    depth: usize,
    shared: Arc<SharedEncoderState>,

    is_active: [[bool; MAX_POLY]; crate::scene::NUM_SCENES],
    banked_value: [f32; MAX_POLY],
    post_gesture_value: [f32; MAX_POLY],
    output: Vec<f32>,
    brightness: f32,
    gesture_brightness: f32,
    force_update: bool,
    modulators_affecting: Bits16,
    gestures_affecting: Bits16,

    modulators: Vec<Option<Box<ModulatorNode>>>,
    active_modulators: Vec<usize>,
    gestures: Vec<Option<Box<ModulatorNode>>>,

    default_value: f32,
}

impl ModulatorNode {
    pub fn new_root(min: f32, max: f32, exponential: bool, shared: Arc<SharedEncoderState>) -> Self {
        let num_tracks = shared.num_tracks;
        let num_voices = shared.num_voices;
        ModulatorNode {
            state: StateCell::new(min, max, exponential, num_tracks),
            kind: EncoderType::BaseParam,
            index: 0,
            depth: 0,
            shared,
            is_active: [[false; MAX_POLY]; crate::scene::NUM_SCENES],
            banked_value: [0.0; MAX_POLY],
            post_gesture_value: [0.0; MAX_POLY],
            output: vec![0.0; num_tracks * num_voices],
            brightness: 1.0,
            gesture_brightness: 1.0,
            force_update: true,
            modulators_affecting: Bits16::zero(),
            gestures_affecting: Bits16::zero(),
            modulators: (0..NUM_MODULATORS).map(|_| None).collect(),
            active_modulators: Vec::new(),
            gestures: (0..NUM_GESTURES).map(|_| None).collect(),
            default_value: 0.0,
        }
    }

    fn new_child(kind: EncoderType, index: usize, depth: usize, shared: Arc<SharedEncoderState>) -> Self {
        let num_tracks = shared.num_tracks;
        let num_voices = shared.num_voices;
        ModulatorNode {
            state: StateCell::new(0.0, 1.0, false, num_tracks),
            kind,
            index,
            depth,
            shared,
            is_active: [[false; MAX_POLY]; crate::scene::NUM_SCENES],
            banked_value: [0.0; MAX_POLY],
            post_gesture_value: [0.0; MAX_POLY],
            output: vec![0.0; num_tracks * num_voices],
            brightness: 1.0,
            gesture_brightness: 1.0,
            force_update: true,
            modulators_affecting: Bits16::zero(),
            gestures_affecting: Bits16::zero(),
            modulators: (0..NUM_MODULATORS).map(|_| None).collect(),
            active_modulators: Vec::new(),
            gestures: (0..NUM_GESTURES).map(|_| None).collect(),
            default_value: 0.0,
        }
    }

    pub fn kind(&self) -> EncoderType {
        self.kind
    }

    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    pub fn output(&self, track: usize, voice: usize) -> f32 {
        self.output[track * self.shared.num_voices + voice]
    }

    /// The cell's own (pre-modulation) value for `track`, blended per the
    /// scene manager's current `(scene1, scene2, blend)`.
    pub fn normalized_value(&self, scene_manager: &SceneManager, track: usize) -> f32 {
        self.state.normalized_value_for_track(scene_manager, track)
    }

    fn set_force_update_recursive(&mut self) {
        self.force_update = true;
        // Parent propagation is the caller's responsibility in this tree
        // shape (nodes don't hold a parent pointer); callers walk down
        // from the root and mark every node on the path to the edit.
    }

    /// Ensure the modulator slot at `index` exists, lazily creating it.
    fn ensure_modulator(&mut self, index: usize) -> &mut ModulatorNode {
        if self.modulators[index].is_none() {
            self.modulators[index] = Some(Box::new(ModulatorNode::new_child(
                EncoderType::ModulatorAmount,
                index,
                self.depth + 1,
                self.shared.clone(),
            )));
            self.active_modulators.push(index);
        }
        self.modulators[index].as_mut().unwrap()
    }

    fn ensure_gesture(&mut self, index: usize) -> &mut ModulatorNode {
        if self.gestures[index].is_none() {
            self.gestures[index] =
                Some(Box::new(ModulatorNode::new_child(EncoderType::GestureParam, index, self.depth + 1, self.shared.clone())));
        }
        self.gestures[index].as_mut().unwrap()
    }

    /// Turning the physical encoder: redirects into the selected gesture
    /// cell (auto-activating it) unless this node itself is a gesture, in
    /// which case the base value moves directly.
    pub fn increment(&mut self, scene_manager: &SceneManager, delta: f32) {
        let track = scene_manager.track();
        if self.kind != EncoderType::GestureParam {
            if let Some(gesture_ix) = self.shared.selected_gesture() {
                let gesture = self.ensure_gesture(gesture_ix);
                if !gesture.is_active_both_endpoints(scene_manager, track) {
                    gesture.set_active(scene_manager, track, true);
                    self.force_update = true;
                } else {
                    gesture.increment(scene_manager, delta);
                }
                return;
            }
        }

        self.state.increment(scene_manager, track, delta);
        self.force_update = true;
    }

    fn set_active(&mut self, scene_manager: &SceneManager, track: usize, active: bool) {
        self.is_active[scene_manager.scene1()][track] = active;
        self.is_active[scene_manager.scene2()][track] = active;
    }

    /// Active in at least one blend endpoint — used for display and for
    /// gating whether a gesture contributes to the weighted blend.
    pub fn is_active(&self, scene_manager: &SceneManager, track: usize) -> bool {
        self.is_active[scene_manager.scene1()][track] || self.is_active[scene_manager.scene2()][track]
    }

    /// Active in both blend endpoints — gates whether turning the encoder
    /// again should increment the gesture instead of auto-(re)activating
    /// it.
    fn is_active_both_endpoints(&self, scene_manager: &SceneManager, track: usize) -> bool {
        self.is_active[scene_manager.scene1()][track] && self.is_active[scene_manager.scene2()][track]
    }

    fn effective_modulator_weight(&self, scene_manager: &SceneManager, weight: f32, track: usize) -> f32 {
        let w1 = if self.is_active[scene_manager.scene1()][track] { weight } else { 0.0 };
        let w2 = if self.is_active[scene_manager.scene2()][track] { weight } else { 0.0 };
        w1 * (1.0 - scene_manager.blend()) + w2 * scene_manager.blend()
    }

    pub fn copy_to_scene(&mut self, scene_manager: &SceneManager, scene: usize) {
        self.state.copy_to_scene(scene_manager, scene);

        for track in 0..self.shared.num_tracks {
            let active1 = self.is_active[scene_manager.scene1()][track] && scene_manager.blend() < 1.0;
            let active2 = self.is_active[scene_manager.scene2()][track] && scene_manager.blend() > 0.0;
            self.is_active[scene][track] = active1 || active2;
        }

        for &ix in &self.active_modulators {
            if let Some(m) = self.modulators[ix].as_mut() {
                m.copy_to_scene(scene_manager, scene);
            }
        }
        for g in self.gestures.iter_mut().flatten() {
            g.copy_to_scene(scene_manager, scene);
        }
    }

    fn compute_post_gesture_values(&mut self, modulator_values: &ModulatorValues, scene_manager: &SceneManager, track: usize) {
        let num_tracks = self.shared.num_tracks;
        let mut gesture_weight_sum = [0.0f64; MAX_POLY];
        let mut gesture_value = [0.0f64; MAX_POLY];
        let mut current_gesture_weight = 0.0f32;
        let selected = self.shared.selected_gesture();

        for i in 0..NUM_GESTURES {
            let banked_value_for_track: Vec<f32> = (0..num_tracks).map(|t| self.state.value(scene_manager, t)).collect();
            if let Some(cell) = self.gestures[i].as_mut() {
                cell.compute(modulator_values, scene_manager);
                for j in 0..num_tracks {
                    let w = cell.effective_modulator_weight(scene_manager, modulator_values.gesture_weight(i), j);
                    if selected == Some(i) && j == track {
                        current_gesture_weight = w;
                    }
                    gesture_weight_sum[j] += w as f64;
                    let cell_value = cell.state.value(scene_manager, j);
                    gesture_value[j] += w as f64 * (banked_value_for_track[j] as f64 * (1.0 - w as f64) + cell_value as f64 * w as f64);
                }
            }
        }

        for i in 0..num_tracks {
            self.post_gesture_value[i] =
                if gesture_weight_sum[i] > 0.0 { (gesture_value[i] / gesture_weight_sum[i]) as f32 } else { self.state.value(scene_manager, i) };
        }

        self.gesture_brightness = match selected {
            None => 1.0 - gesture_weight_sum[track] as f32,
            Some(g) if self.gestures[g].as_ref().is_some_and(|c| c.is_active(scene_manager, track)) => current_gesture_weight,
            Some(_) => 1.0,
        };
    }

    fn compute_modulators(&mut self, modulator_values: &ModulatorValues, scene_manager: &SceneManager, track: usize) {
        let num_tracks = self.shared.num_tracks;
        let num_voices = self.shared.num_voices;
        let mut mod_value = vec![0.0f32; num_tracks * num_voices];
        let mut mod_weight = vec![0.0f32; num_tracks * num_voices];

        for &ix in &self.active_modulators {
            let Some(cell) = self.modulators[ix].as_mut() else { continue };
            // `compute` itself no-ops unless forced or an affecting bit
            // changed, so calling it unconditionally here costs nothing
            // for a quiescent modulator while still keeping its last
            // computed output in the weighted sum below.
            cell.compute(modulator_values, scene_manager);
            for j in 0..num_tracks {
                for k in 0..num_voices {
                    let slot = j * num_voices + k;
                    mod_value[slot] += cell.output[slot] * modulator_values.modulator_value(ix, slot);
                    mod_weight[slot] += cell.output[slot];
                }
            }
        }

        for i in 0..num_tracks {
            let value = self.post_gesture_value[i];
            for j in 0..num_voices {
                let slot = i * num_voices + j;
                self.output[slot] =
                    if mod_weight[slot] > 1.0 { mod_value[slot] / mod_weight[slot] } else { value * (1.0 - mod_weight[slot]) + mod_value[slot] };
            }
        }

        let brightness = (1.0 - mod_weight[num_voices * track]) * self.gesture_brightness;
        self.brightness = brightness.clamp(0.0, 1.0);
    }

    /// The per-frame recompute gate: skip unless forced, or a modulator/
    /// gesture this node's subtree actually depends on changed.
    pub fn compute(&mut self, modulator_values: &ModulatorValues, scene_manager: &SceneManager) {
        let track = scene_manager.track();

        let modulator_hit = !self.modulators_affecting.intersect(modulator_values.changed_modulators()).is_zero();
        let gesture_hit = !self.gestures_affecting.intersect(modulator_values.changed_gestures()).is_zero();

        if self.force_update || modulator_hit || gesture_hit {
            if self.force_update || gesture_hit {
                self.compute_post_gesture_values(modulator_values, scene_manager, track);
            }
            self.compute_modulators(modulator_values, scene_manager, track);
        }

        if self.depth > 0 && self.kind == EncoderType::ModulatorAmount {
            let slot = track * self.shared.num_voices;
            self.brightness = modulator_values.modulator_value(self.index, slot).clamp(0.0, 1.0);
        }

        self.force_update = false;
    }

    /// Recomputes `modulators_affecting`/`gestures_affecting` for this node
    /// and every descendant, from the root down. Call after any structural
    /// edit (a gesture activated/deactivated, a modulator created or
    /// collected).
    pub fn recompute_affecting(&mut self) {
        let mut modulators_affecting = Bits16::zero();
        for &ix in &self.active_modulators {
            if let Some(cell) = self.modulators[ix].as_mut() {
                cell.recompute_affecting();
                modulators_affecting.set(ix, true);
                modulators_affecting.union(cell.modulators_affecting);
            }
        }

        let mut gestures_affecting = Bits16::zero();
        for (i, g) in self.gestures.iter_mut().enumerate() {
            if let Some(cell) = g {
                cell.recompute_affecting();
                if cell.is_active_any_scene() {
                    gestures_affecting.set(i, true);
                }
                gestures_affecting.union(cell.gestures_affecting);
            }
        }

        self.modulators_affecting = modulators_affecting;
        self.gestures_affecting = gestures_affecting;
    }

    fn is_active_any_scene(&self) -> bool {
        self.is_active.iter().any(|scene| scene.iter().any(|&a| a))
    }

    fn can_be_garbage_collected(&self) -> bool {
        match self.kind {
            EncoderType::GestureParam => !self.is_active_any_scene(),
            _ => self.gestures.iter().all(|g| g.is_none()) && self.active_modulators.is_empty() && self.state.all_zero(),
        }
    }

    /// Drops modulator/gesture children that have gone idle (zeroed
    /// modulator amounts, deactivated gestures with no remaining descent).
    pub fn garbage_collect(&mut self) {
        let mut i = 0;
        while i < self.active_modulators.len() {
            let ix = self.active_modulators[i];
            if let Some(cell) = self.modulators[ix].as_mut() {
                cell.garbage_collect();
            }
            if self.modulators[ix].as_ref().is_some_and(|c| c.can_be_garbage_collected()) {
                self.modulators[ix] = None;
                self.active_modulators.swap_remove(i);
            } else {
                i += 1;
            }
        }

        for g in self.gestures.iter_mut() {
            if g.as_ref().is_some_and(|c| c.can_be_garbage_collected()) {
                *g = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneManager;

    fn shared(tracks: usize, voices: usize) -> Arc<SharedEncoderState> {
        SharedEncoderState::new(tracks, voices)
    }

    #[test]
    fn increment_moves_the_base_value_when_no_gesture_is_selected() {
        let shared = shared(1, 1);
        let mut root = ModulatorNode::new_root(0.0, 1.0, false, shared);
        let scene_manager = SceneManager::new(1);
        root.increment(&scene_manager, 0.4);
        assert!((root.state.value(&scene_manager, 0) - 0.4).abs() < 1e-5);
    }

    #[test]
    fn increment_redirects_into_the_selected_gesture() {
        let shared = shared(1, 1);
        shared.select_gesture(Some(2));
        let mut root = ModulatorNode::new_root(0.0, 1.0, false, shared);
        let scene_manager = SceneManager::new(1);

        root.increment(&scene_manager, 0.3);
        // First increment only activates the gesture (matching the
        // original's "auto-activate on first touch" behavior).
        assert!(root.gestures[2].is_some());
        assert!(root.gestures[2].as_ref().unwrap().is_active(&scene_manager, 0));
        assert_eq!(root.state.value(&scene_manager, 0), 0.0);

        root.increment(&scene_manager, 0.3);
        assert!(root.gestures[2].as_ref().unwrap().state.value(&scene_manager, 0) > 0.0);
    }

    #[test]
    fn compute_blends_a_single_modulator_contribution_into_output() {
        let shared = shared(1, 1);
        let mut root = ModulatorNode::new_root(0.0, 1.0, false, shared);
        let scene_manager = SceneManager::new(1);
        root.increment(&scene_manager, 0.5);

        root.ensure_modulator(0);
        root.modulators[0].as_mut().unwrap().increment(&scene_manager, 1.0);
        root.active_modulators = vec![0];
        root.recompute_affecting();
        root.force_update = true;

        let mut values = ModulatorValues::new();
        values.set_modulator_value(0, 0, 0.3);
        values.compute_changed();

        root.compute(&values, &scene_manager);
        // A single full-strength modulator (cell.output == 1.0, since a
        // bare modulator cell with no children just reads its own value)
        // pushes mod_weight to exactly 1.0, so the base value is fully
        // displaced: output == modValue == cell.output * weight.
        let out = root.output(0, 0);
        assert!((out - 0.3).abs() < 1e-4);
    }

    #[test]
    fn garbage_collect_drops_a_zeroed_modulator() {
        let shared = shared(1, 1);
        let mut root = ModulatorNode::new_root(0.0, 1.0, false, shared);
        root.ensure_modulator(3);
        assert_eq!(root.active_modulators, vec![3]);
        root.garbage_collect();
        assert!(root.active_modulators.is_empty());
        assert!(root.modulators[3].is_none());
    }
}
