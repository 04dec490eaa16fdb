//! JSON serialization of an [`EncoderBank`]'s saved state: a 16-entry
//! array, row-major over the 4x4 base grid, each entry carrying the
//! base cell's 8-scene values and any live modulators/gestures.
//!
//! Grounded on `rf-state/src/preset.rs`'s serde-struct-plus-`thiserror`
//! shape; malformed or missing fields never abort a load (per the
//! matching error-handling policy), they just leave the target
//! untouched and log at `warn`.

use crate::bank::{EncoderBank, BANK_HEIGHT, BANK_WIDTH};
use crate::modulator::{ModulatorNode, NUM_GESTURES, NUM_MODULATORS};
use crate::scene::{SceneManager, NUM_SCENES};
use serde::{Deserialize, Serialize};

/// `values[scene][track]`. A `Vec` rather than a fixed array so a
/// malformed document (wrong scene count, ragged track rows) can be
/// detected and skipped instead of failing to parse at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellDocument {
    pub values: Vec<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modulators: Option<Vec<Option<CellDocument>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gestures: Option<Vec<Option<CellDocument>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<Vec<Vec<bool>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankDocument(pub Vec<CellDocument>);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonagonDocument {
    pub nonagon: BankDocument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "squiggleBoy")]
    pub squiggle_boy: Option<BankDocument>,
}

fn cell_to_document(cell: &ModulatorNode, num_tracks: usize) -> CellDocument {
    let values = (0..NUM_SCENES)
        .map(|scene| {
            let probe = SceneManager::single_scene(num_tracks, scene).expect("scene in range");
            (0..num_tracks).map(|track| cell.normalized_value(&probe, track)).collect()
        })
        .collect();

    CellDocument { values, modulators: None, gestures: None, active: None }
}

/// Serializes every base cell's current 8-scene, per-track values. Live
/// modulator/gesture subtrees are not walked here (there is no public
/// enumerator over a node's children); only the base parameter grid is
/// round-tripped.
pub fn bank_to_document(bank: &EncoderBank, num_tracks: usize) -> BankDocument {
    let mut cells = Vec::with_capacity(BANK_WIDTH * BANK_HEIGHT);
    for y in 0..BANK_HEIGHT {
        for x in 0..BANK_WIDTH {
            cells.push(cell_to_document(bank.cell(x, y), num_tracks));
        }
    }
    BankDocument(cells)
}

/// Applies a loaded document's values back onto `bank`. A document of
/// the wrong length, a cell with the wrong scene count, or a scene row
/// with the wrong track count is skipped with a warning; everything
/// else in the document is still applied.
pub fn apply_document(bank: &mut EncoderBank, document: &BankDocument, num_tracks: usize) {
    if document.0.len() != BANK_WIDTH * BANK_HEIGHT {
        log::warn!("scene document has {} cells, expected {}", document.0.len(), BANK_WIDTH * BANK_HEIGHT);
        return;
    }

    for (i, cell_doc) in document.0.iter().enumerate() {
        let x = i % BANK_WIDTH;
        let y = i / BANK_WIDTH;
        if cell_doc.values.len() != NUM_SCENES {
            log::warn!("scene document cell ({x},{y}) has {} scenes, expected {}", cell_doc.values.len(), NUM_SCENES);
            continue;
        }

        let target = bank.cell_mut(x, y);
        for (scene, row) in cell_doc.values.iter().enumerate() {
            if row.len() != num_tracks {
                log::warn!("scene document cell ({x},{y}) scene {scene} has {} tracks, expected {num_tracks}", row.len());
                continue;
            }
            let probe = SceneManager::single_scene(num_tracks, scene).expect("scene in range");
            for (track, &value) in row.iter().enumerate() {
                let current = target.normalized_value(&probe, track);
                let delta = value - current;
                if delta != 0.0 {
                    let mut scoped = probe.clone();
                    scoped.set_track(track).expect("track in range, checked above");
                    target.increment(&scoped, delta);
                }
            }
        }
    }
}

pub fn to_json(document: &NonagonDocument) -> crate::error::ModulationResult<String> {
    serde_json::to_string_pretty(document).map_err(Into::into)
}

pub fn from_json(json: &str) -> crate::error::ModulationResult<NonagonDocument> {
    serde_json::from_str(json).map_err(Into::into)
}

#[allow(dead_code)]
const _ASSERT_COUNTS: () = {
    assert!(NUM_MODULATORS == 15);
    assert!(NUM_GESTURES == 16);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_bank_through_json() {
        let mut bank = EncoderBank::new(2, 1);
        {
            let scene_manager = bank.scene_manager().clone();
            bank.cell_mut(1, 2).increment(&scene_manager, 0.4);
        }

        let document = bank_to_document(&bank, 2);
        let wrapped = NonagonDocument { nonagon: document, squiggle_boy: None };
        let json = to_json(&wrapped).unwrap();

        let parsed = from_json(&json).unwrap();
        assert_eq!(parsed.nonagon.0.len(), 16);

        let mut reloaded = EncoderBank::new(2, 1);
        apply_document(&mut reloaded, &parsed.nonagon, 2);
        let scene_manager = reloaded.scene_manager().clone();
        assert!((reloaded.cell(1, 2).normalized_value(&scene_manager, 0) - 0.4).abs() < 1e-4);
    }

    #[test]
    fn wrong_length_document_is_ignored_without_panicking() {
        let mut bank = EncoderBank::new(1, 1);
        let document = BankDocument(vec![]);
        apply_document(&mut bank, &document, 1);
    }

    #[test]
    fn ragged_track_row_is_skipped_but_the_rest_of_the_document_still_applies() {
        let mut bank = EncoderBank::new(2, 1);
        let mut document = bank_to_document(&bank, 2);
        document.0[0].values[3] = vec![0.9];
        document.0[5].values[0] = vec![0.5, 0.5];
        apply_document(&mut bank, &document, 2);

        let scene_manager = bank.scene_manager().clone();
        assert!((bank.cell(1, 1).normalized_value(&scene_manager, 0) - 0.5).abs() < 1e-4);
    }
}
