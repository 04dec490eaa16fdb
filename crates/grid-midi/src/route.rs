//! Route-id to decoder dispatch.
//!
//! Grounded on `MidiToMessageIn.hpp`'s `MidiToMessageIn`: a fixed 16-slot
//! route-type table, configured once by the host at startup, selects which
//! codec decodes messages arriving on a given route id.

use crate::encoder;
use crate::error::{MidiError, MidiResult};
use crate::launchpad;
use crate::raw::{MessageIn, Mode, RawMidi};

pub const NUM_ROUTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteType {
    #[default]
    Unassigned,
    LaunchPad(launchpad::LaunchpadShape),
    Encoder,
    Param14,
    Param7,
}

pub struct Router {
    routes: [RouteType; NUM_ROUTES],
}

impl Router {
    pub fn new() -> Self {
        Router { routes: [RouteType::default(); NUM_ROUTES] }
    }

    pub fn set_route(&mut self, route: usize, route_type: RouteType) -> MidiResult<()> {
        if route >= NUM_ROUTES {
            return Err(MidiError::RouteOutOfRange(route as i32));
        }
        self.routes[route] = route_type;
        Ok(())
    }

    /// Decode `msg` via the route type configured for its `route_id`.
    /// Unassigned/out-of-range/unrecognized-status input yields a
    /// `Mode::NoMessage` record rather than an error: a dispatcher sees a
    /// continuous stream and must not abort the stream on a message it
    /// doesn't have a decoder for.
    pub fn from_midi(&self, msg: RawMidi) -> MessageIn {
        if msg.route_id < 0 || msg.route_id as usize >= NUM_ROUTES {
            return MessageIn::default();
        }

        match self.routes[msg.route_id as usize] {
            RouteType::LaunchPad(_) => launchpad::from_midi(msg),
            RouteType::Encoder => encoder::from_midi(msg),
            RouteType::Param14 => MessageIn::default(),
            RouteType::Param7 => MessageIn::new(msg.timestamp, msg.route_id, Mode::ParamSet7, msg.note() as i32, 0, msg.value() as i64),
            RouteType::Unassigned => MessageIn::default(),
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::STATUS_CC;

    #[test]
    fn unassigned_route_yields_no_message() {
        let router = Router::new();
        let msg = RawMidi::cc(0, 3, 0, 0, 70);
        assert!(router.from_midi(msg).no_message());
    }

    #[test]
    fn out_of_range_route_yields_no_message() {
        let router = Router::new();
        let msg = RawMidi::cc(0, 99, 0, 0, 70);
        assert!(router.from_midi(msg).no_message());
    }

    #[test]
    fn param7_route_wraps_the_cc_value_directly() {
        let mut router = Router::new();
        router.set_route(5, RouteType::Param7).unwrap();
        let msg = RawMidi::new(0, 5, STATUS_CC, 10, 90);
        let decoded = router.from_midi(msg);
        assert_eq!(decoded.mode, Mode::ParamSet7);
        assert_eq!(decoded.amount, 90);
        assert_eq!(decoded.x, 10);
    }

    #[test]
    fn encoder_route_dispatches_to_the_encoder_codec() {
        let mut router = Router::new();
        router.set_route(2, RouteType::Encoder).unwrap();
        let msg = RawMidi::cc(0, 2, 0, 5, 70);
        let decoded = router.from_midi(msg);
        assert_eq!(decoded.mode, Mode::EncoderIncDec);
    }
}
