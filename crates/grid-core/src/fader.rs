//! Column faders: a run of cells along one column that together display and
//! move a single continuous value, either by holding a direction (relative
//! mode) or by pressing directly at a position (absolute mode).

use crate::cell::Cell;
use crate::color::Color;
use parking_lot::Mutex;
use std::sync::Arc;

const MAX_VELOCITY: f32 = 127.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Structure {
    Linear,
    Bipolar,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Holding a cell moves the value at a speed derived from how far the
    /// cell is from the column's center and how hard it's pressed.
    Relative,
    /// Pressing a cell jumps the value directly to that cell's position.
    Absolute,
}

struct FaderState {
    value: f32,
    last_abs_value: f32,
    target: f32,
    speed: f32,
    moving: bool,
    pos_from_bottom: usize,
    pos_from_center: i32,
    value_within_cell: f32,
    velocities: Vec<u8>,
}

/// The shared state behind one column of [`FaderCell`]s.
pub struct FaderColumn {
    height: usize,
    color_scheme: Vec<Color>,
    min_speed: f32,
    max_speed: f32,
    min_value: f32,
    max_value: f32,
    log_max_over_min: f32,
    pressure_sensitive: bool,
    structure: Structure,
    mode: Mode,
    state: Mutex<FaderState>,
}

impl FaderColumn {
    pub fn new(
        height: usize,
        color_scheme: Vec<Color>,
        min_value: f32,
        max_value: f32,
        min_speed: f32,
        max_speed: f32,
        pressure_sensitive: bool,
        structure: Structure,
        mode: Mode,
        initial_value: f32,
    ) -> Arc<Self> {
        let log_max_over_min = if structure == Structure::Exponential {
            (max_value / min_value).log2()
        } else {
            0.0
        };

        let column = Arc::new(FaderColumn {
            height,
            color_scheme,
            min_speed,
            max_speed,
            min_value,
            max_value,
            log_max_over_min,
            pressure_sensitive,
            structure,
            mode,
            state: Mutex::new(FaderState {
                value: initial_value,
                last_abs_value: initial_value,
                target: 0.0,
                speed: 0.0,
                moving: false,
                pos_from_bottom: 0,
                pos_from_center: 0,
                value_within_cell: 0.0,
                velocities: vec![0u8; height],
            }),
        });

        let norm = column.normalize(initial_value);
        column.compute_fader_pos(&mut column.state.lock(), norm);
        column
    }

    pub fn is_bipolar(&self) -> bool {
        self.structure == Structure::Bipolar
    }

    pub fn is_exponential(&self) -> bool {
        self.structure == Structure::Exponential
    }

    pub fn value(&self) -> f32 {
        self.state.lock().value
    }

    fn denormalize(&self, norm: f32) -> f32 {
        if self.is_bipolar() {
            self.max_value * norm
        } else if self.is_exponential() {
            self.min_value * (norm * self.log_max_over_min).exp2()
        } else {
            self.min_value + (self.max_value - self.min_value) * norm
        }
    }

    fn normalize(&self, abs_val: f32) -> f32 {
        if self.is_bipolar() {
            abs_val / self.max_value
        } else if self.is_exponential() {
            (abs_val / self.min_value).log2() / self.log_max_over_min
        } else {
            (abs_val - self.min_value) / (self.max_value - self.min_value)
        }
    }

    fn from_center(&self, row: usize) -> i32 {
        let mut fc = row as i32 - (self.height / 2) as i32;
        if self.height % 2 == 0 && row >= self.height / 2 {
            fc += 1;
        }
        fc
    }

    fn compute_fader_pos(&self, s: &mut FaderState, norm_state: f32) {
        if self.is_bipolar() {
            let h = self.height / 2;
            let per_block = (h as f32 * norm_state).abs();
            let pos_from_center_mag = (per_block.floor() as i64).clamp(0, h as i64 - 1) as usize;
            if norm_state < 0.0 {
                s.pos_from_bottom = h - pos_from_center_mag - 1;
                s.value_within_cell = (per_block - s.pos_from_bottom as f32).clamp(0.0, 1.0);
            } else {
                s.pos_from_bottom = if self.height % 2 == 1 {
                    h + pos_from_center_mag + 1
                } else {
                    h + pos_from_center_mag
                };
                s.value_within_cell = (per_block - pos_from_center_mag as f32).clamp(0.0, 1.0);
            }
        } else {
            let per_block = self.height as f32 * norm_state;
            s.pos_from_bottom = (per_block.floor() as i64).clamp(0, self.height as i64 - 1) as usize;
            s.value_within_cell = (per_block - s.pos_from_bottom as f32).clamp(0.0, 1.0);
        }

        let mut pfc = s.pos_from_bottom as i32 - (self.height / 2) as i32;
        if self.height % 2 == 0 && s.pos_from_bottom >= self.height / 2 {
            pfc += 1;
        }
        s.pos_from_center = pfc;
    }

    fn row_speed(&self, velocity: u8, row: usize) -> f32 {
        let vel = if self.mode == Mode::Relative {
            let towards_center = (self.height / 2) as i32 - self.from_center(row).abs();
            velocity >> (2 * towards_center.max(0))
        } else {
            velocity
        };
        let frac = vel as f32 / MAX_VELOCITY;
        self.min_speed + (self.max_speed - self.min_speed) * frac
    }

    fn row_speed_non_reduced(&self, velocity: u8) -> f32 {
        let frac = velocity as f32 / MAX_VELOCITY;
        self.min_speed + (self.max_speed - self.min_speed) * frac
    }

    /// Recompute speed/target/moving from the currently-held rows. Only
    /// meaningful in relative mode.
    fn set_speed_and_target(&self) {
        if self.mode != Mode::Relative {
            return;
        }
        let mut s = self.state.lock();
        let is_even = self.height % 2 == 0;
        let center_row = self.height / 2;

        let mut center_touched = s.velocities[center_row] > 0;
        if center_touched && is_even && center_row > 0 {
            center_touched = s.velocities[center_row - 1] > 0;
        }

        let mut non_center_touched = false;
        let mut speed = 0.0f32;
        for row in 0..self.height {
            if s.velocities[row] == 0 {
                continue;
            }
            let fc = self.from_center(row);
            if (!is_even && fc != 0) || fc.abs() != 1 {
                non_center_touched = true;
            }
            let component = self.row_speed(s.velocities[row], row);
            if fc > 0 {
                speed += component;
            } else if fc < 0 {
                speed -= component;
            }
        }

        if self.is_bipolar() && center_touched && !non_center_touched {
            s.target = 0.0;
            s.speed = self.row_speed_non_reduced(s.velocities[center_row]);
            s.moving = true;
        } else if !self.is_bipolar() && center_touched && !is_even {
            s.moving = false;
        } else if speed != 0.0 {
            s.speed = speed.abs();
            s.moving = true;
            s.target = if speed > 0.0 {
                1.0
            } else if self.is_bipolar() {
                -1.0
            } else {
                0.0
            };
        } else {
            s.moving = false;
        }
    }

    fn jump_to_row(&self, row: usize) {
        let norm = (row as f32 + 0.5) / self.height as f32;
        let mut s = self.state.lock();
        s.value = self.denormalize(norm);
        s.last_abs_value = s.value;
        s.moving = false;
        self.compute_fader_pos(&mut s, norm);
    }

    fn on_row_press(&self, row: usize, velocity: u8) {
        match self.mode {
            Mode::Absolute => self.jump_to_row(row),
            Mode::Relative => {
                self.state.lock().velocities[row] = velocity;
                self.set_speed_and_target();
            }
        }
    }

    fn on_row_release(&self, row: usize) {
        if self.mode == Mode::Relative {
            self.state.lock().velocities[row] = 0;
            self.set_speed_and_target();
        }
    }

    /// Advance the fader's motion by `dt` seconds, or pick up an externally
    /// written value if one landed while idle.
    pub fn tick(&self, dt: f32) {
        let mut s = self.state.lock();
        if s.moving {
            let dx = dt * s.speed;
            let mut norm = self.normalize(s.value);
            if (norm - s.target).abs() < dx {
                norm = s.target;
                s.value = self.denormalize(s.target);
                s.moving = false;
            } else if norm < s.target {
                norm += dx;
                s.value = self.denormalize(norm);
            } else {
                norm -= dx;
                s.value = self.denormalize(norm);
            }
            s.last_abs_value = s.value;
            self.compute_fader_pos(&mut s, norm);
        } else if s.value != s.last_abs_value {
            let norm = self.normalize(s.value);
            self.compute_fader_pos(&mut s, norm);
            s.last_abs_value = s.value;
        }
    }

    fn row_color(&self, row: usize) -> Color {
        let s = self.state.lock();
        let fc = self.from_center(row);
        if self.is_bipolar()
            && (fc == 0 || (fc.abs() < s.pos_from_center.abs() && (fc > 0) == (s.pos_from_center > 0)))
        {
            return *self.color_scheme.last().unwrap_or(&Color::BLACK);
        }
        if !self.is_bipolar() && row < s.pos_from_bottom {
            return *self.color_scheme.last().unwrap_or(&Color::BLACK);
        }
        if row == s.pos_from_bottom {
            let len = self.color_scheme.len().max(1);
            let ix = ((s.value_within_cell * len as f32) as usize).min(len - 1);
            return self.color_scheme.get(ix).copied().unwrap_or(Color::BLACK);
        }
        Color::BLACK
    }
}

/// One row of a [`FaderColumn`], exposed as a [`Cell`] so a grid can hold it
/// behind `Arc<dyn Cell>` alongside buttons and encoders.
pub struct FaderCell {
    column: Arc<FaderColumn>,
    row: usize,
}

impl FaderCell {
    pub fn new(column: Arc<FaderColumn>, row: usize) -> Self {
        FaderCell { column, row }
    }
}

impl Cell for FaderCell {
    fn color(&self) -> Color {
        self.column.row_color(self.row)
    }

    fn set_color(&self, _color: Color) {
        // Fader rows derive their color from position; direct writes are ignored.
    }

    fn is_pressed(&self) -> bool {
        self.column.state.lock().velocities[self.row] > 0
    }

    fn velocity(&self) -> Option<u8> {
        let v = self.column.state.lock().velocities[self.row];
        (v > 0).then_some(v)
    }

    fn is_pressure_sensitive(&self) -> bool {
        self.column.pressure_sensitive
    }

    fn on_press(&self, velocity: u8) {
        self.column.on_row_press(self.row, velocity);
    }

    fn on_release(&self) {
        self.column.on_row_release(self.row);
    }

    fn on_pressure_change(&self, velocity: u8) {
        self.column.on_row_press(self.row, velocity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> Vec<Color> {
        vec![Color::new(0, 0, 64), Color::new(0, 0, 160), Color::new(0, 0, 255)]
    }

    #[test]
    fn linear_fader_starts_at_denormalized_initial_value() {
        let column = FaderColumn::new(8, scheme(), 0.0, 1.0, 1.0, 100.0, true, Structure::Linear, Mode::Relative, 0.5);
        assert!((column.value() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn holding_top_row_drives_value_toward_max() {
        let column = FaderColumn::new(8, scheme(), 0.0, 1.0, 1.0, 100.0, true, Structure::Linear, Mode::Relative, 0.0);
        column.on_row_press(7, 127);
        for _ in 0..2000 {
            column.tick(0.01);
        }
        assert!(column.value() > 0.9);
    }

    #[test]
    fn absolute_mode_press_jumps_directly() {
        let column = FaderColumn::new(4, scheme(), 0.0, 1.0, 1.0, 100.0, true, Structure::Linear, Mode::Absolute, 0.0);
        column.on_row_press(3, 100);
        assert!(column.value() > 0.7);
    }

    #[test]
    fn bipolar_center_release_allows_value_to_settle_at_zero() {
        let column = FaderColumn::new(8, scheme(), -1.0, 1.0, 1.0, 100.0, true, Structure::Bipolar, Mode::Relative, 0.6);
        column.on_row_press(4, 127);
        for _ in 0..2000 {
            column.tick(0.01);
        }
        assert!(column.value().abs() < 0.2);
    }
}
