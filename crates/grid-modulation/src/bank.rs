//! A 4×4 grid of [`ModulatorNode`] base parameters sharing one
//! [`SceneManager`] and [`SharedEncoderState`] — one physical encoder
//! bank.
//!
//! Grounded on `EncoderBank.hpp`'s `EncoderBankInternal`: the
//! `m_baseCell[4][4]` layout, per-frame `ModulatorValues`, and
//! scene-change dispatch that replaces or copies depending on shift.

use crate::modulator::{ModulatorNode, ModulatorValues, SharedEncoderState};
use crate::scene::SceneManager;
use std::sync::Arc;

pub const BANK_WIDTH: usize = 4;
pub const BANK_HEIGHT: usize = 4;

pub struct EncoderBank {
    scene_manager: SceneManager,
    shared: Arc<SharedEncoderState>,
    base_cells: Vec<Vec<ModulatorNode>>,
}

impl EncoderBank {
    pub fn new(num_tracks: usize, num_voices: usize) -> Self {
        let shared = SharedEncoderState::new(num_tracks, num_voices);
        let base_cells = (0..BANK_WIDTH)
            .map(|_| (0..BANK_HEIGHT).map(|_| ModulatorNode::new_root(0.0, 1.0, false, shared.clone())).collect())
            .collect();

        EncoderBank { scene_manager: SceneManager::new(num_tracks), shared, base_cells }
    }

    pub fn scene_manager(&self) -> &SceneManager {
        &self.scene_manager
    }

    pub fn scene_manager_mut(&mut self) -> &mut SceneManager {
        &mut self.scene_manager
    }

    pub fn cell(&self, x: usize, y: usize) -> &ModulatorNode {
        &self.base_cells[x][y]
    }

    pub fn cell_mut(&mut self, x: usize, y: usize) -> &mut ModulatorNode {
        &mut self.base_cells[x][y]
    }

    pub fn select_gesture(&self, gesture: Option<usize>) {
        self.shared.select_gesture(gesture);
    }

    pub fn set_shift(&self, shift: bool) {
        self.shared.shift.store(shift, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn set_track(&mut self, track: usize) -> Result<(), crate::error::ModulationError> {
        self.scene_manager.set_track(track)
    }

    /// A scene-change message. Without shift, the nearer endpoint is
    /// replaced for every cell (the scene manager itself is global, so
    /// this is just bookkeeping); with shift, every cell's current
    /// blended value is copied into the target scene.
    pub fn change_scene(&mut self, target: usize, shift: bool) -> Result<(), crate::error::ModulationError> {
        let replaced = self.scene_manager.change_scene(target, shift)?;
        if replaced.is_none() {
            for row in self.base_cells.iter_mut() {
                for cell in row.iter_mut() {
                    cell.copy_to_scene(&self.scene_manager, target);
                }
            }
        }
        Ok(())
    }

    /// Recompute the whole tree for this frame: every base cell against
    /// the shared `ModulatorValues`.
    pub fn compute(&mut self, modulator_values: &ModulatorValues) {
        for row in self.base_cells.iter_mut() {
            for cell in row.iter_mut() {
                cell.compute(modulator_values, &self.scene_manager);
            }
        }
    }

    /// Garbage-collect idle modulators/gestures, then recompute affecting
    /// masks from the root down. Call after any structural edit
    /// (deselecting a gesture, zeroing a modulator).
    pub fn garbage_collect_and_recompute_affecting(&mut self) {
        for row in self.base_cells.iter_mut() {
            for cell in row.iter_mut() {
                cell.garbage_collect();
                cell.recompute_affecting();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_change_without_shift_replaces_the_nearer_endpoint() {
        let mut bank = EncoderBank::new(1, 1);
        bank.change_scene(4, false).unwrap();
        assert_eq!(bank.scene_manager().scene1(), 4);
    }

    #[test]
    fn scene_change_with_shift_copies_current_value_into_target() {
        let mut bank = EncoderBank::new(1, 1);
        let scene_manager = bank.scene_manager().clone();
        bank.cell_mut(1, 1).increment(&scene_manager, 0.6);

        bank.change_scene(4, true).unwrap();

        let scene_manager = bank.scene_manager().clone();
        assert!((bank.cell(1, 1).normalized_value(&scene_manager, 0) - 0.6).abs() < 1e-5);
    }
}
