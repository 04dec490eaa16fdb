//! The encoder acceleration state machine shared by every continuous
//! encoder cell (plain, banked, scene-blended). Turning is reported as
//! signed ticks with a timestamp; this tracks direction and inter-tick
//! timing to scale how far each tick moves the underlying value.

/// Minimum per-tick increment, applied right after a direction change, an
/// idle gap, or the very first tick.
pub const MIN_SPEED: f32 = 0.001;
/// Maximum per-tick increment, reached by sustained fast turning.
pub const MAX_SPEED: f32 = 1.0 / 128.0;
/// Per-unit-velocity increment applied while an encoder is held and pressed
/// (press-to-fine-tune gesture).
pub const PRESS_SPEED: f32 = 0.005;

const RESET_TIME_US: u64 = 200_000;
const FAST_TIME_US: u64 = 5_000;
const SLOW_TIME_US: u64 = 50_000;

/// Default 7-bit twister hue code and animation brightness for encoders that
/// don't override them.
pub const DEFAULT_TWISTER_COLOR: u8 = 64;
pub const DEFAULT_ANIMATION_VALUE: u8 = 47;

pub fn brightness_to_animation_value(brightness: f32) -> u8 {
    (17.0 + brightness.clamp(0.0, 1.0) * 30.0) as u8
}

/// Per-cell acceleration state. Embed one of these in any encoder cell and
/// route turn/press/release/pressure events through it to get the increment
/// to apply to the cell's own normalized value.
#[derive(Debug, Clone)]
pub struct EncoderAcceleration {
    last_velocity: u8,
    last_timestamp_us: Option<u64>,
    last_delta_sign: i32,
    last_speed: f32,
}

impl EncoderAcceleration {
    pub fn new() -> Self {
        EncoderAcceleration {
            last_velocity: 0,
            last_timestamp_us: None,
            last_delta_sign: 0,
            last_speed: MIN_SPEED,
        }
    }

    /// A relative turn of `delta` ticks observed at `timestamp_us`. Returns
    /// the signed increment to apply; `0.0` if `delta` is zero.
    pub fn handle_inc_dec(&mut self, timestamp_us: u64, delta: i64) -> f32 {
        if delta == 0 {
            return 0.0;
        }

        let current_sign = if delta > 0 { 1 } else { -1 };

        let reset = match self.last_timestamp_us {
            None => true,
            Some(last) => {
                (self.last_delta_sign != 0 && current_sign != self.last_delta_sign)
                    || (last < timestamp_us && RESET_TIME_US < timestamp_us - last)
            }
        };

        let speed = if reset {
            MIN_SPEED
        } else {
            match self.last_timestamp_us {
                Some(last) if last < timestamp_us => {
                    let time_delta_us = timestamp_us - last;
                    let scale_factor = if time_delta_us <= FAST_TIME_US {
                        2.0
                    } else if time_delta_us >= SLOW_TIME_US {
                        1.0
                    } else {
                        let t = (time_delta_us - FAST_TIME_US) as f32 / (SLOW_TIME_US - FAST_TIME_US) as f32;
                        2.0 * (1.0 - t) + t
                    };
                    (self.last_speed * scale_factor).clamp(MIN_SPEED, MAX_SPEED)
                }
                _ => self.last_speed,
            }
        };

        self.last_timestamp_us = Some(timestamp_us);
        self.last_delta_sign = current_sign;
        self.last_speed = speed;

        delta as f32 * speed
    }

    /// A fresh press at `velocity`. Returns the increment to apply.
    pub fn on_press(&mut self, velocity: u8) -> f32 {
        let svelocity = velocity as i8 as f32;
        self.last_velocity = velocity;
        svelocity * PRESS_SPEED
    }

    pub fn on_release(&mut self) {
        self.last_velocity = 0;
    }

    /// A pressure update while already pressed. Returns the increment to
    /// apply, scaled by the change from the previous reported velocity.
    pub fn on_pressure_change(&mut self, velocity: u8) -> f32 {
        let svelocity = (velocity as i32 - self.last_velocity as i32) as f32;
        self.last_velocity = velocity;
        svelocity * PRESS_SPEED
    }
}

impl Default for EncoderAcceleration {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_uses_minimum_speed() {
        let mut acc = EncoderAcceleration::new();
        let inc = acc.handle_inc_dec(1_000, 1);
        assert_eq!(inc, MIN_SPEED);
    }

    #[test]
    fn fast_consecutive_ticks_accelerate_up_to_the_cap() {
        let mut acc = EncoderAcceleration::new();
        let mut t = 0u64;
        let mut last = 0.0;
        for _ in 0..10 {
            t += FAST_TIME_US;
            last = acc.handle_inc_dec(t, 1);
        }
        assert!(last.abs() <= MAX_SPEED + f32::EPSILON);
        assert!(last.abs() > MIN_SPEED);
    }

    #[test]
    fn direction_flip_resets_to_minimum_speed() {
        let mut acc = EncoderAcceleration::new();
        acc.handle_inc_dec(0, 1);
        acc.handle_inc_dec(FAST_TIME_US, 1);
        let after_flip = acc.handle_inc_dec(2 * FAST_TIME_US, -1);
        assert_eq!(after_flip, -MIN_SPEED);
    }

    #[test]
    fn idle_gap_resets_to_minimum_speed() {
        let mut acc = EncoderAcceleration::new();
        acc.handle_inc_dec(0, 1);
        acc.handle_inc_dec(FAST_TIME_US, 1);
        let after_idle = acc.handle_inc_dec(FAST_TIME_US + RESET_TIME_US + 1, 1);
        assert_eq!(after_idle, MIN_SPEED);
    }

    #[test]
    fn pressure_change_scales_from_previous_velocity() {
        let mut acc = EncoderAcceleration::new();
        let press_inc = acc.on_press(50);
        assert_eq!(press_inc, 50.0 * PRESS_SPEED);
        let change_inc = acc.on_pressure_change(90);
        assert_eq!(change_inc, 40.0 * PRESS_SPEED);
    }
}
