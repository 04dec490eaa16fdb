//! Encoder controller note mapping and the three-phase round-robin output
//! writer (color, brightness, value).
//!
//! Grounded on `EncoderMidi.hpp`'s `EncoderMidi`/`EncoderMidiWriter`: CC
//! number is `y*4 + x`, channel 0 carries signed relative increments,
//! channel 1 carries press/release, and outgoing state cycles through
//! three phases per cell so only the phase whose underlying value actually
//! changed gets written.

use grid_core::color::Color;

use crate::raw::{MessageIn, Mode, RawMidi, STATUS_CC};

pub const BANK_WIDTH: usize = 4;
pub const BANK_HEIGHT: usize = 4;

pub fn pos_to_note(x: i32, y: i32) -> u8 {
    (y * 4 + x) as u8
}

pub fn note_to_pos(note: u8) -> (i32, i32) {
    (note as i32 % 4, note as i32 / 4)
}

pub fn shape_supports(x: i32, y: i32) -> bool {
    (0..4).contains(&x) && (0..4).contains(&y)
}

pub fn from_midi(msg: RawMidi) -> MessageIn {
    if msg.status() != STATUS_CC {
        return MessageIn::default();
    }

    let (x, y) = note_to_pos(msg.cc_number());
    let (mode, amount) = match msg.channel() {
        0 => (Mode::EncoderIncDec, msg.value() as i64 - 64),
        1 => {
            if msg.value() > 0 {
                (Mode::EncoderPush, 1)
            } else {
                (Mode::EncoderRelease, 0)
            }
        }
        _ => return MessageIn::default(),
    };

    MessageIn::new(msg.timestamp, msg.route_id, mode, x, y, amount)
}

/// What the writer needs from the caller's encoder bank for one cell: the
/// color/brightness it should display and the normalized value for the
/// currently selected track.
pub trait EncoderCellState {
    fn color(&self, x: usize, y: usize) -> Color;
    fn brightness(&self, x: usize, y: usize) -> f32;
    fn value(&self, x: usize, y: usize) -> f32;
}

#[derive(Clone, Copy)]
struct CellShadow {
    sent: bool,
    color: Color,
    brightness: f32,
    value: f32,
}

impl Default for CellShadow {
    fn default() -> Self {
        CellShadow { sent: false, color: Color::BLACK, brightness: 0.0, value: 0.0 }
    }
}

/// Emits the per-cell color/brightness/value CC messages for a 4x4 encoder
/// bank, skipping phases whose value hasn't moved since last write.
pub struct EncoderMidiWriter {
    route_id: i32,
    shadow: [[CellShadow; BANK_HEIGHT]; BANK_WIDTH],
}

impl EncoderMidiWriter {
    pub fn new(route_id: i32) -> Self {
        EncoderMidiWriter { route_id, shadow: [[CellShadow::default(); BANK_HEIGHT]; BANK_WIDTH] }
    }

    pub fn reset(&mut self) {
        for col in &mut self.shadow {
            for cell in col.iter_mut() {
                cell.sent = false;
            }
        }
    }

    /// Every outgoing CC message for cells whose displayed state changed.
    pub fn write(&mut self, state: &dyn EncoderCellState) -> Vec<RawMidi> {
        let mut out = Vec::new();

        for x in 0..BANK_WIDTH {
            for y in 0..BANK_HEIGHT {
                let shadow = &mut self.shadow[x][y];
                let color = state.color(x, y);
                let brightness = state.brightness(x, y);
                let value = state.value(x, y);
                let note = pos_to_note(x as i32, y as i32);

                let color_due = (!shadow.sent || shadow.color != color) && brightness > 0.0;
                if color_due {
                    out.push(RawMidi::cc(0, self.route_id, 1, note, color.to_twister_hue()));
                    shadow.color = color;
                }

                let brightness_due = !shadow.sent || (shadow.brightness - brightness).abs() > f32::EPSILON;
                if brightness_due {
                    let byte = (17.0 + brightness * 30.0).clamp(0.0, 127.0) as u8;
                    out.push(RawMidi::cc(0, self.route_id, 2, note, byte));
                    shadow.brightness = brightness;
                }

                let value_due = !shadow.sent || (shadow.value - value).abs() > f32::EPSILON;
                if value_due {
                    let byte = (value * 127.0).clamp(0.0, 127.0) as u8;
                    out.push(RawMidi::cc(0, self.route_id, 0, note, byte));
                    shadow.value = value;
                }

                shadow.sent = true;
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        color: Color,
        brightness: f32,
        value: f32,
    }

    impl EncoderCellState for Fixed {
        fn color(&self, _x: usize, _y: usize) -> Color {
            self.color
        }
        fn brightness(&self, _x: usize, _y: usize) -> f32 {
            self.brightness
        }
        fn value(&self, _x: usize, _y: usize) -> f32 {
            self.value
        }
    }

    #[test]
    fn note_mapping_round_trips() {
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(note_to_pos(pos_to_note(x, y)), (x, y));
            }
        }
    }

    #[test]
    fn channel_0_decodes_signed_increment_around_64() {
        let msg = RawMidi::cc(0, 0, 0, 5, 70);
        let decoded = from_midi(msg);
        assert_eq!(decoded.mode, Mode::EncoderIncDec);
        assert_eq!(decoded.amount, 6);
    }

    #[test]
    fn channel_1_decodes_press_and_release() {
        assert_eq!(from_midi(RawMidi::cc(0, 0, 1, 0, 100)).mode, Mode::EncoderPush);
        assert_eq!(from_midi(RawMidi::cc(0, 0, 1, 0, 0)).mode, Mode::EncoderRelease);
    }

    #[test]
    fn writer_only_emits_unchanged_phases_once() {
        let state = Fixed { color: Color::new(10, 20, 30), brightness: 0.5, value: 0.25 };
        let mut writer = EncoderMidiWriter::new(0);

        let first = writer.write(&state);
        assert_eq!(first.len(), 16 * 3);

        let second = writer.write(&state);
        assert!(second.is_empty());
    }
}
