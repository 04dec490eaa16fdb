//! The input message bus: a bounded ring of decoded [`MessageIn`] records
//! gated by timestamp, plus the route decoder that turns raw MIDI bytes
//! into them before they're pushed.
//!
//! Grounded on `MessageInBus.hpp`'s `MessageInBus`: `Pop` peeks the head
//! and only consumes it if the head is already visible at the caller's
//! `timestamp`, so a producer thread's message with a timestamp ahead of
//! "now" waits in the queue instead of jumping the line.

use grid_midi::{MessageIn, RawMidi, RouteType, Router};
use grid_transport::Ring;

pub const INPUT_BUS_CAPACITY: usize = 16384;

pub struct InputBus {
    queue: Ring<MessageIn>,
    router: Router,
}

impl InputBus {
    pub fn new() -> Self {
        InputBus { queue: Ring::new(INPUT_BUS_CAPACITY), router: Router::new() }
    }

    pub fn set_route_type(&mut self, route: usize, route_type: RouteType) -> Result<(), grid_midi::MidiError> {
        self.router.set_route(route, route_type)
    }

    /// Push an already-decoded message. Logs and drops it if the bus is
    /// saturated rather than blocking the producer thread.
    pub fn push(&self, msg: MessageIn) -> bool {
        if self.queue.push(msg).is_err() {
            log::warn!("input bus push failed, queue is full");
            return false;
        }
        true
    }

    /// Decode a raw MIDI message through the route table, then push it.
    pub fn push_midi(&self, msg: RawMidi) -> bool {
        self.push(self.router.from_midi(msg))
    }

    /// Peek the head; consume and return it only if it's visible at `now`.
    pub fn pop(&self, now: u64) -> Option<MessageIn> {
        match self.queue.peek() {
            Some(msg) if msg.visible(now) => self.queue.pop(),
            _ => None,
        }
    }

    /// Drain every message visible at `now`, in arrival order, applying
    /// `apply` to each.
    pub fn process(&self, now: u64, mut apply: impl FnMut(MessageIn)) {
        while let Some(msg) = self.pop(now) {
            apply(msg);
        }
    }
}

impl Default for InputBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_midi::Mode;

    #[test]
    fn pop_holds_back_a_message_timestamped_in_the_future() {
        let bus = InputBus::new();
        bus.push(MessageIn::new(10, 0, Mode::PadPress, 0, 0, 100));

        assert!(bus.pop(5).is_none());
        assert!(bus.pop(10).is_some());
    }

    #[test]
    fn process_drains_only_the_visible_prefix_in_order() {
        let bus = InputBus::new();
        bus.push(MessageIn::new(1, 0, Mode::PadPress, 0, 0, 1));
        bus.push(MessageIn::new(2, 0, Mode::PadPress, 1, 0, 2));
        bus.push(MessageIn::new(100, 0, Mode::PadPress, 2, 0, 3));

        let mut seen = Vec::new();
        bus.process(5, |msg| seen.push(msg.x));
        assert_eq!(seen, vec![0, 1]);

        let mut seen2 = Vec::new();
        bus.process(200, |msg| seen2.push(msg.x));
        assert_eq!(seen2, vec![2]);
    }

    #[test]
    fn push_midi_decodes_through_the_route_table() {
        let mut bus = InputBus::new();
        bus.set_route_type(0, RouteType::Encoder).unwrap();
        bus.push_midi(RawMidi::cc(0, 0, 0, 5, 70));

        let msg = bus.pop(0).unwrap();
        assert_eq!(msg.mode, Mode::EncoderIncDec);
    }
}
