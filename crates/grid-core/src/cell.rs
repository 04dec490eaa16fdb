//! The `Cell` capability interface and its generic press/release dispatch.
//!
//! Concrete cell kinds (buttons, faders, encoders) each own their state with
//! interior mutability so the same `Arc<dyn Cell>` can be shared across
//! several grids (e.g. a menu grid exposing an encoder via two positions).
//! Dynamic dispatch is reserved for the grid edge; everything below a grid's
//! `Apply` call goes through the concrete type.

use crate::color::Color;
use parking_lot::Mutex;

/// An entity with a displayed color, a press state, and handlers for
/// press/release/pressure-change. `apply` is the generic dispatcher from
/// §4.5: a second press while pressed routes to pressure-change only, and a
/// release only fires when the cell is currently pressed.
pub trait Cell: Send + Sync {
    fn color(&self) -> Color;
    fn set_color(&self, color: Color);

    fn is_pressed(&self) -> bool;
    fn velocity(&self) -> Option<u8>;

    fn is_pressure_sensitive(&self) -> bool {
        false
    }

    fn on_press(&self, velocity: u8);
    fn on_release(&self);
    fn on_pressure_change(&self, _velocity: u8) {}

    /// Dispatch a touch message. Zero velocity is a release (only fires if
    /// currently pressed); nonzero velocity is a press (only fires if not
    /// currently pressed, otherwise a pressure change if supported).
    fn apply(&self, velocity: u8) {
        if velocity == 0 {
            if self.is_pressed() {
                self.on_release();
            }
        } else if !self.is_pressed() {
            self.on_press(velocity);
        } else if self.is_pressure_sensitive() {
            self.on_pressure_change(velocity);
        }
    }
}

#[derive(Default)]
struct ButtonState {
    color: Color,
    pressed: bool,
    velocity: Option<u8>,
}

/// A plain button cell used for menu chrome, gate toggles, and other
/// non-continuous controls. Press/release are delivered through boxed
/// callbacks so a grid can wire a button to arbitrary engine behavior
/// without a bespoke `Cell` impl per button.
pub struct ButtonCell {
    state: Mutex<ButtonState>,
    pressure_sensitive: bool,
    on_press_cb: Option<Box<dyn Fn(u8) + Send + Sync>>,
    on_release_cb: Option<Box<dyn Fn() + Send + Sync>>,
    on_pressure_cb: Option<Box<dyn Fn(u8) + Send + Sync>>,
}

impl ButtonCell {
    pub fn new() -> Self {
        ButtonCell {
            state: Mutex::new(ButtonState::default()),
            pressure_sensitive: false,
            on_press_cb: None,
            on_release_cb: None,
            on_pressure_cb: None,
        }
    }

    pub fn with_pressure_sensitive(mut self, pressure_sensitive: bool) -> Self {
        self.pressure_sensitive = pressure_sensitive;
        self
    }

    pub fn with_on_press(mut self, f: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.on_press_cb = Some(Box::new(f));
        self
    }

    pub fn with_on_release(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_release_cb = Some(Box::new(f));
        self
    }

    pub fn with_on_pressure_change(mut self, f: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.on_pressure_cb = Some(Box::new(f));
        self
    }
}

impl Default for ButtonCell {
    fn default() -> Self {
        Self::new()
    }
}

impl Cell for ButtonCell {
    fn color(&self) -> Color {
        self.state.lock().color
    }

    fn set_color(&self, color: Color) {
        self.state.lock().color = color;
    }

    fn is_pressed(&self) -> bool {
        self.state.lock().pressed
    }

    fn velocity(&self) -> Option<u8> {
        self.state.lock().velocity
    }

    fn is_pressure_sensitive(&self) -> bool {
        self.pressure_sensitive
    }

    fn on_press(&self, velocity: u8) {
        {
            let mut s = self.state.lock();
            s.pressed = true;
            s.velocity = Some(velocity);
        }
        if let Some(cb) = &self.on_press_cb {
            cb(velocity);
        }
    }

    fn on_release(&self) {
        {
            let mut s = self.state.lock();
            s.pressed = false;
            s.velocity = None;
        }
        if let Some(cb) = &self.on_release_cb {
            cb();
        }
    }

    fn on_pressure_change(&self, velocity: u8) {
        self.state.lock().velocity = Some(velocity);
        if let Some(cb) = &self.on_pressure_cb {
            cb(velocity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn two_presses_without_release_fire_exactly_one_on_press() {
        let presses = Arc::new(AtomicU32::new(0));
        let releases = Arc::new(AtomicU32::new(0));
        let p = presses.clone();
        let r = releases.clone();
        let cell = ButtonCell::new()
            .with_on_press(move |_| {
                p.fetch_add(1, Ordering::SeqCst);
            })
            .with_on_release(move || {
                r.fetch_add(1, Ordering::SeqCst);
            });

        cell.apply(100);
        cell.apply(100);
        assert_eq!(presses.load(Ordering::SeqCst), 1);

        cell.apply(0);
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        // Further releases are no-ops.
        cell.apply(0);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pressure_sensitive_cell_routes_second_press_to_pressure_change() {
        let pressure_calls = Arc::new(AtomicU32::new(0));
        let pc = pressure_calls.clone();
        let cell = ButtonCell::new()
            .with_pressure_sensitive(true)
            .with_on_pressure_change(move |_| {
                pc.fetch_add(1, Ordering::SeqCst);
            });

        cell.apply(50);
        cell.apply(90);
        assert_eq!(pressure_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cell.velocity(), Some(90));
    }
}
