//! Launchpad family note-number mapping and the sysex color writer.
//!
//! Grounded on `LaunchPadMidi.hpp`'s `LPMidi`/`LPSysexWriter`: the note
//! formula folds the bottom two Launchpad Pro rows (sent as notes 1..9) into
//! the same coordinate space as the rest of the 10x10 note grid, and the
//! sysex writer shadows what it last sent per physical cell so it only
//! emits a record when the bus color actually changed.

use grid_core::bus::Bus;
use grid_core::color::Color;
use grid_core::coord::{Coord, X_MAX, X_MIN, Y_MAX, Y_MIN};

use crate::raw::{MessageIn, Mode, RawMidi, STATUS_CC, STATUS_NOTE_OFF, STATUS_NOTE_ON, STATUS_POLY_AFTERTOUCH};

pub const BASE_GRID_SIZE: i32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchpadShape {
    LaunchPadX,
    LaunchPadMiniMk3,
    LaunchPadProMk3,
}

pub fn pos_to_note(x: i32, y: i32) -> u8 {
    let mut y = BASE_GRID_SIZE - y - 1;

    if y == -1 {
        y = 9;
    } else if y == -2 {
        y = -1;
    }

    (11 + 10 * y + x) as u8
}

pub fn note_to_pos(note: u8) -> (i32, i32) {
    let note = note as i32;
    if note < 10 {
        return (note - 1, 9);
    }

    let mut y = (note - 11) / 10;
    let mut x = (note - 11) % 10;

    if y == 9 {
        y = -1;
    }
    if x == 9 {
        x = -1;
        y += 1;
    }

    (x, 7 - y)
}

pub fn shape_supports(shape: LaunchpadShape, x: i32, y: i32) -> bool {
    match shape {
        LaunchpadShape::LaunchPadX | LaunchpadShape::LaunchPadMiniMk3 => (0..9).contains(&x) && (-1..8).contains(&y),
        LaunchpadShape::LaunchPadProMk3 => (-1..9).contains(&x) && (-1..10).contains(&y),
    }
}

/// Decode a raw MIDI message from a Launchpad-routed input into a
/// [`MessageIn`], or `None` for statuses this codec doesn't speak.
pub fn from_midi(msg: RawMidi) -> MessageIn {
    let mut mode = match msg.status() {
        STATUS_NOTE_ON | STATUS_CC => Mode::PadPress,
        STATUS_NOTE_OFF => Mode::PadRelease,
        STATUS_POLY_AFTERTOUCH => Mode::PadPressure,
        _ => return MessageIn::default(),
    };

    if msg.value() == 0 {
        mode = Mode::PadRelease;
    }

    let (x, y) = note_to_pos(msg.note());
    MessageIn::new(msg.timestamp, msg.route_id, mode, x, y, msg.value() as i64)
}

/// Writes the 7-byte-header sysex frame for whatever cells changed on the
/// bus since the last write, shadowing what it last sent so unaffected
/// cells aren't re-sent.
pub struct LpSysexWriter {
    shape: LaunchpadShape,
    sent: Vec<Vec<bool>>,
    color: Vec<Vec<Color>>,
    epoch: u64,
}

const WIDTH: usize = (X_MAX - X_MIN + 1) as usize;
const HEIGHT: usize = (Y_MAX - Y_MIN + 1) as usize;

fn shadow_index(coord: Coord) -> (usize, usize) {
    ((coord.x - X_MIN) as usize, (coord.y - Y_MIN) as usize)
}

impl LpSysexWriter {
    pub fn new(shape: LaunchpadShape) -> Self {
        LpSysexWriter { shape, sent: vec![vec![false; HEIGHT]; WIDTH], color: vec![vec![Color::BLACK; HEIGHT]; WIDTH], epoch: 0 }
    }

    pub fn reset(&mut self) {
        for row in &mut self.sent {
            row.iter_mut().for_each(|s| *s = false);
        }
        self.epoch = 0;
    }

    /// Build the sysex message for any changed, shape-supported cells.
    /// Returns `None` if the bus hasn't advanced past the last epoch this
    /// writer observed, or if nothing shape-supported actually changed.
    pub fn write(&mut self, bus: &Bus) -> Option<Vec<u8>> {
        let changed = bus.poll_changed(&mut self.epoch);
        if changed.is_empty() {
            return None;
        }

        let mut buffer = vec![240u8, 0, 32, 41, 2];
        buffer.push(match self.shape {
            LaunchpadShape::LaunchPadX | LaunchpadShape::LaunchPadMiniMk3 => 12,
            LaunchpadShape::LaunchPadProMk3 => 14,
        });
        buffer.push(3);

        let mut wrote_any = false;
        for (coord, color) in changed {
            if !shape_supports(self.shape, coord.x, coord.y) {
                continue;
            }

            let (sx, sy) = shadow_index(coord);
            if self.sent[sx][sy] && self.color[sx][sy] == color {
                continue;
            }

            wrote_any = true;
            buffer.push(3);
            buffer.push(pos_to_note(coord.x, coord.y));
            buffer.push(color.r / 2);
            buffer.push(color.g / 2);
            buffer.push(color.b / 2);

            self.sent[sx][sy] = true;
            self.color[sx][sy] = color;
        }

        if !wrote_any {
            return None;
        }

        buffer.push(247);
        Some(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_mapping_round_trips_across_the_base_grid() {
        for y in 0..8 {
            for x in 0..9 {
                let note = pos_to_note(x, y);
                assert_eq!(note_to_pos(note), (x, y), "x={x} y={y} note={note}");
            }
        }
    }

    #[test]
    fn overflow_rows_land_on_the_remapped_bottom_rows() {
        // y = -1 and y = -2 are the Pro Mk3's extra rows below the base grid.
        let note_row_minus1 = pos_to_note(0, -1);
        let note_row_minus2 = pos_to_note(0, -2);
        assert_eq!(note_to_pos(note_row_minus1), (0, -1));
        assert_eq!(note_to_pos(note_row_minus2), (0, -2));
    }

    #[test]
    fn zero_velocity_note_on_decodes_as_release() {
        let msg = RawMidi::note(0, 0, 0, pos_to_note(0, 0), 0);
        let decoded = from_midi(msg);
        assert_eq!(decoded.mode, Mode::PadRelease);
    }

    #[test]
    fn shape_supports_restricts_the_extra_rows_to_pro_mk3() {
        assert!(!shape_supports(LaunchpadShape::LaunchPadX, 0, -1 - 1));
        assert!(shape_supports(LaunchpadShape::LaunchPadProMk3, -1, 9));
        assert!(!shape_supports(LaunchpadShape::LaunchPadX, -1, 0));
    }

    #[test]
    fn sysex_writer_only_emits_shape_supported_cells_that_changed() {
        let bus_table = grid_core::bus::BusTable::new();
        let handle = bus_table.allocate().unwrap();
        let mut writer = LpSysexWriter::new(LaunchpadShape::LaunchPadProMk3);

        assert!(writer.write(&handle).is_none());

        let changed = handle.put_color(Coord::new(0, 0), Color::new(255, 0, 0));
        handle.bump_epoch(changed);

        let frame = writer.write(&handle).expect("expected a sysex frame");
        assert_eq!(frame[0], 240);
        assert_eq!(*frame.last().unwrap(), 247);

        // Re-writing the same bus state without another change yields nothing.
        assert!(writer.write(&handle).is_none());
    }
}
