//! Yaeltex vendor sysex color writer: an 8-byte header followed by
//! per-channel `(cc, r/2, g/2, b/2)` blocks, with an HSV-quantized palette
//! fallback and a per-cell cooldown to avoid flooding the device.
//!
//! Grounded on `YaeltexHSV.hpp` (RGB->HSV->126-entry palette quantization)
//! and the cooldown-gated write pattern shared with `LPSysexWriter` in
//! `LaunchPadMidi.hpp`.

use grid_core::color::Color;

/// Number of hue slices the 126-entry palette is divided into.
const HUE_SLICES: i32 = 42;

struct Hsv {
    h: f32,
    s: f32,
    v: f32,
}

fn rgb_to_hsv(color: Color) -> Hsv {
    let r = color.r as f32 / 255.0;
    let g = color.g as f32 / 255.0;
    let b = color.b as f32 / 255.0;

    let maxc = r.max(g).max(b);
    let minc = r.min(g).min(b);
    let delta = maxc - minc;

    if delta < 1e-6 {
        return Hsv { h: 0.0, s: 0.0, v: maxc };
    }

    let s = delta / maxc;
    let mut h = if maxc == r {
        (g - b) / delta
    } else if maxc == g {
        2.0 + (b - r) / delta
    } else {
        4.0 + (r - g) / delta
    };
    h /= 6.0;
    if h < 0.0 {
        h += 1.0;
    }

    Hsv { h, s, v: maxc }
}

/// Map 24-bit RGB onto the device's 7-bit palette code (0..127): a white
/// short-circuit, a black/low-saturation short-circuit, then 3 saturation
/// bands crossed with 42 hue slices.
pub fn rgb_to_yaeltex_code(color: Color) -> u8 {
    let hsv = rgb_to_hsv(color);

    if hsv.s < 0.10 && hsv.v > 0.85 {
        return 127;
    }
    if hsv.v < 0.10 || hsv.s < 0.25 {
        return 0;
    }

    let sat_index = if hsv.s < 0.50 {
        0
    } else if hsv.s < 0.75 {
        1
    } else {
        2
    };

    let hue_step = 360.0 / HUE_SLICES as f32;
    let hue_deg = hsv.h * 360.0;
    let mut hue_index = (hue_deg / hue_step).round() as i32;
    hue_index = hue_index.rem_euclid(HUE_SLICES);

    let code = 1 + 3 * hue_index + sat_index;
    code.clamp(1, 126) as u8
}

const COOLDOWN_FRAMES: u32 = 4;

#[derive(Clone, Copy)]
struct ChannelShadow {
    sent: bool,
    color: Color,
    cooldown: u32,
}

impl Default for ChannelShadow {
    fn default() -> Self {
        ChannelShadow { sent: false, color: Color::BLACK, cooldown: 0 }
    }
}

/// Writes Yaeltex sysex blocks for channels whose color changed, gated by
/// a per-channel cooldown counter that decrements once per [`tick`] call
/// and suppresses re-writes while nonzero.
///
/// [`tick`]: YaeltexSysexWriter::tick
pub struct YaeltexSysexWriter {
    device_id: u8,
    shadow: Vec<ChannelShadow>,
}

impl YaeltexSysexWriter {
    pub fn new(device_id: u8, num_channels: usize) -> Self {
        YaeltexSysexWriter { device_id, shadow: vec![ChannelShadow::default(); num_channels] }
    }

    pub fn tick(&mut self) {
        for s in &mut self.shadow {
            if s.cooldown > 0 {
                s.cooldown -= 1;
            }
        }
    }

    /// Build the sysex frame for `colors` (indexed by CC number), or `None`
    /// if nothing is due to be written this frame.
    pub fn write(&mut self, colors: &[Color]) -> Option<Vec<u8>> {
        let mut buffer = vec![240u8, 0, 32, 41, 2, self.device_id, 3, 0];
        let mut wrote_any = false;

        for (cc, &color) in colors.iter().enumerate() {
            if cc >= self.shadow.len() {
                break;
            }
            let shadow = &mut self.shadow[cc];
            if shadow.cooldown > 0 {
                continue;
            }
            if shadow.sent && shadow.color == color {
                continue;
            }

            wrote_any = true;
            buffer.push(cc as u8);
            buffer.push(color.r / 2);
            buffer.push(color.g / 2);
            buffer.push(color.b / 2);

            shadow.sent = true;
            shadow.color = color;
            shadow.cooldown = COOLDOWN_FRAMES;
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
    fn near_white_low_saturation_short_circuits_to_127() {
        assert_eq!(rgb_to_yaeltex_code(Color::new(250, 245, 240)), 127);
    }

    #[test]
    fn black_short_circuits_to_0() {
        assert_eq!(rgb_to_yaeltex_code(Color::new(2, 2, 2)), 0);
    }

    #[test]
    fn pure_red_falls_in_the_first_hue_slice_top_saturation_band() {
        let code = rgb_to_yaeltex_code(Color::new(255, 0, 0));
        assert!((1..=3).contains(&code), "expected a low code near hue 0, got {code}");
    }

    #[test]
    fn cooldown_suppresses_a_repeated_write_until_it_elapses() {
        let mut writer = YaeltexSysexWriter::new(1, 4);
        let colors = vec![Color::new(255, 0, 0); 4];

        let first = writer.write(&colors).expect("first write should emit");
        assert_eq!(first[0], 240);

        // Changing color during cooldown is still suppressed.
        let changed = vec![Color::new(0, 255, 0); 4];
        assert!(writer.write(&changed).is_none());

        for _ in 0..COOLDOWN_FRAMES {
            writer.tick();
        }
        assert!(writer.write(&changed).is_some());
    }
}
