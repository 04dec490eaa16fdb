//! The raw three-byte MIDI message controllers speak on the wire, and the
//! decoded [`MessageIn`] the rest of the engine consumes.
//!
//! Grounded on `BasicMidi.hpp` (status/data byte layout and constructors)
//! and `MessageIn.hpp` (decoded message shape and its `Mode` enum).

/// A raw, timestamped 3-byte MIDI message tagged with the route it arrived
/// on. `route_id` is `-1` for messages with no controller origin (clock,
/// transport).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMidi {
    pub timestamp: u64,
    pub route_id: i32,
    pub bytes: [u8; 3],
}

pub const STATUS_NOTE_OFF: u8 = 0x80;
pub const STATUS_NOTE_ON: u8 = 0x90;
pub const STATUS_POLY_AFTERTOUCH: u8 = 0xA0;
pub const STATUS_CC: u8 = 0xB0;
pub const STATUS_AFTERTOUCH: u8 = 0xD0;
pub const STATUS_PITCH_BEND: u8 = 0xE0;
pub const STATUS_CLOCK: u8 = 0xF8;
pub const STATUS_TRANSPORT_START: u8 = 0xFA;
pub const STATUS_TRANSPORT_STOP: u8 = 0xFC;

impl RawMidi {
    pub fn new(timestamp: u64, route_id: i32, status: u8, data1: u8, data2: u8) -> Self {
        RawMidi { timestamp, route_id, bytes: [status, data1, data2] }
    }

    pub fn note(timestamp: u64, route_id: i32, channel: u8, note: u8, velocity: u8) -> Self {
        if velocity == 0 {
            Self::note_off(timestamp, route_id, channel, note)
        } else {
            Self::new(timestamp, route_id, STATUS_NOTE_ON | (channel & 0x0F), note, velocity)
        }
    }

    pub fn note_off(timestamp: u64, route_id: i32, channel: u8, note: u8) -> Self {
        Self::new(timestamp, route_id, STATUS_NOTE_OFF | (channel & 0x0F), note, 0)
    }

    pub fn cc(timestamp: u64, route_id: i32, channel: u8, cc: u8, value: u8) -> Self {
        Self::new(timestamp, route_id, STATUS_CC | (channel & 0x0F), cc, value)
    }

    pub fn poly_aftertouch(timestamp: u64, route_id: i32, channel: u8, note: u8, value: u8) -> Self {
        Self::new(timestamp, route_id, STATUS_POLY_AFTERTOUCH | (channel & 0x0F), note, value)
    }

    pub fn channel(&self) -> u8 {
        self.bytes[0] & 0x0F
    }

    pub fn status(&self) -> u8 {
        self.bytes[0] & 0xF0
    }

    pub fn note(&self) -> u8 {
        self.bytes[1]
    }

    pub fn cc_number(&self) -> u8 {
        self.bytes[1]
    }

    pub fn value(&self) -> u8 {
        self.bytes[2]
    }
}

/// The engine-facing decoded message: a mode plus a position and amount,
/// already translated out of device-specific note/CC numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    NoMessage,
    PadPress,
    PadPressure,
    PadRelease,
    EncoderIncDec,
    EncoderPush,
    EncoderRelease,
    ParamSet14,
    ParamSet7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageIn {
    pub timestamp: u64,
    pub route_id: i32,
    pub mode: Mode,
    pub x: i32,
    pub y: i32,
    pub amount: i64,
}

impl Default for MessageIn {
    fn default() -> Self {
        MessageIn { timestamp: 0, route_id: -1, mode: Mode::NoMessage, x: 0, y: 0, amount: 0 }
    }
}

impl MessageIn {
    pub fn new(timestamp: u64, route_id: i32, mode: Mode, x: i32, y: i32, amount: i64) -> Self {
        MessageIn { timestamp, route_id, mode, x, y, amount }
    }

    /// Normalize `amount` to `[0, 1]` against the value width implied by
    /// `mode`: 14-bit for `ParamSet14`, 7-bit otherwise.
    pub fn amount_float(&self) -> f32 {
        let max = if self.mode == Mode::ParamSet14 { (1i64 << 14) - 1 } else { (1i64 << 7) - 1 };
        self.amount as f32 / max as f32
    }

    pub fn visible(&self, timestamp: u64) -> bool {
        self.timestamp <= timestamp
    }

    pub fn no_message(&self) -> bool {
        self.mode == Mode::NoMessage
    }

    pub fn is_param_set(&self) -> bool {
        matches!(self.mode, Mode::ParamSet14 | Mode::ParamSet7)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_with_zero_velocity_becomes_note_off() {
        let msg = RawMidi::note(0, 0, 0, 60, 0);
        assert_eq!(msg.status(), STATUS_NOTE_OFF);
    }

    #[test]
    fn amount_float_uses_14_bit_width_for_param_set_14() {
        let msg = MessageIn::new(0, 0, Mode::ParamSet14, 0, 0, (1 << 14) - 1);
        assert!((msg.amount_float() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn amount_float_uses_7_bit_width_otherwise() {
        let msg = MessageIn::new(0, 0, Mode::ParamSet7, 0, 0, 127);
        assert!((msg.amount_float() - 1.0).abs() < 1e-6);
    }
}
