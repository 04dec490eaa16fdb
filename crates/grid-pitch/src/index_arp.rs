//! The `IndexArp` sub-sequencer: picks a physical index out of a rhythm
//! mask on each clock tick and maps it to a normalized output value, and
//! `NonagonIndexArp`, which groups nine of them into three clocked trios
//! with overlapping pitch zones.
//!
//! Grounded on `IndexArp.hpp`'s `IndexArp`/`NonagonIndexArp`: the
//! rhythm-mask-gated `total_index`/`rhythm_index`/`motive_index` advance
//! on `Process`, and `GetOutput`'s offset-plus-interval-plus-page,
//! cycle-fold-or-fractional, invert, then range-map pipeline.

pub const RHYTHM_LENGTH: usize = 8;
pub const NUM_CLOCKS: usize = 7;
pub const NUM_TRIOS: usize = 3;
pub const VOICES_PER_TRIO: usize = 3;
pub const NUM_VOICES: usize = 9;

#[derive(Debug, Clone, Copy)]
pub struct IndexArpConfig {
    pub offset: f32,
    pub interval: f32,
    pub min: f32,
    pub max: f32,
    pub invert: bool,
    pub retro: bool,
    pub cycle: bool,
    pub page_interval: f32,
    pub rhythm: [bool; RHYTHM_LENGTH],
    pub rhythm_length: usize,
}

impl Default for IndexArpConfig {
    fn default() -> Self {
        IndexArpConfig {
            offset: 0.0,
            interval: 0.0,
            min: 0.0,
            max: 0.0,
            invert: false,
            retro: false,
            cycle: false,
            page_interval: 0.0,
            rhythm: [true; RHYTHM_LENGTH],
            rhythm_length: RHYTHM_LENGTH,
        }
    }
}

impl IndexArpConfig {
    /// At least one, even if every rhythm bit is false, so `physical_index`
    /// always has a valid note count to invert against in retro mode.
    fn num_notes(&self) -> i32 {
        self.rhythm[..self.rhythm_length].iter().filter(|&&bit| bit).count().max(1) as i32
    }

    fn physical_index(&self, index: i32) -> i32 {
        if self.retro {
            self.num_notes() - index
        } else {
            index
        }
    }

    pub fn output_for(&self, index: i32, page_index: i32) -> f32 {
        let physical = self.physical_index(index);
        let result = self.offset + physical as f32 * self.interval + page_index as f32 * self.page_interval;

        let mut result = if self.cycle {
            let mut r = result - 2.0 * (result / 2.0).floor();
            if r > 1.0 {
                r = 2.0 - r;
            }
            r
        } else {
            result - result.floor()
        };

        if self.invert {
            result = 1.0 - result;
        }

        self.min + result * (self.max - self.min)
    }
}

/// A single clocked arp lane: advances its rhythm-gated index on each
/// `process` where `clock` is set, and reads its output through
/// [`IndexArpConfig::output_for`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexArp {
    total_index: i32,
    index: i32,
    motive_index: i32,
    rhythm_index: i32,
    output: f32,
    triggered: bool,
}

impl IndexArp {
    pub fn new() -> Self {
        IndexArp { total_index: -1, rhythm_index: -1, ..Default::default() }
    }

    pub fn output(&self) -> f32 {
        self.output
    }

    pub fn triggered(&self) -> bool {
        self.triggered
    }

    pub fn index(&self) -> i32 {
        self.index
    }

    pub fn reset(&mut self) {
        self.index = 0;
        self.motive_index = 0;
        self.rhythm_index = 0;
    }

    /// `total_index` is the trio-shared running count this arp is told
    /// to adopt on a clock edge (the trio advances one shared counter;
    /// every voice in it reads the same value on its own clock edges).
    pub fn process(&mut self, config: &IndexArpConfig, clock: bool, read: bool, no_clock: bool, total_index: i32) {
        self.triggered = false;

        if no_clock {
            self.reset();
        }

        if clock {
            self.total_index = total_index;
            let rhythm_length = config.rhythm_length.max(1) as i32;
            self.rhythm_index = self.total_index.rem_euclid(rhythm_length);

            if config.rhythm[self.rhythm_index as usize] {
                self.motive_index = self.total_index / rhythm_length;

                self.index = -1;
                for i in 0..=self.rhythm_index {
                    if config.rhythm[i as usize] {
                        self.index += 1;
                    }
                }

                self.triggered = true;
            }
        }

        if read || self.triggered {
            self.output = config.output_for(self.index, self.motive_index);
        }
    }
}

/// Maps an arp's continuous output into a discrete index over
/// `num_distinct` sorted pitch groups, folding any out-of-range excess
/// into an octave count.
///
/// The original's `IndexArp::Get(numDistinctResults, &result, octave)`
/// is referenced by `LameJuis.hpp` but its body isn't in the retrieved
/// sources. Reconstructed here as: treat `output` as already scaled to
/// the `[0, num_distinct)` range the same way `output_for` scales to
/// `[min, max)`, and read any whole multiples of `num_distinct` back out
/// as an octave shift, so an arp configured with `max` several times
/// `num_distinct` walks up through octaves as it cycles.
pub fn select_index(output: f32, num_distinct: usize) -> (usize, i32) {
    if num_distinct == 0 {
        return (0, 0);
    }
    let n = num_distinct as f32;
    let octave = (output / n).floor();
    let remainder = output - octave * n;
    let index = (remainder.floor() as i64).clamp(0, num_distinct as i64 - 1) as usize;
    (index, octave as i32)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrioConfig {
    pub clock_select: Option<usize>,
    pub reset_select: Option<usize>,
    pub zone_height: [f32; VOICES_PER_TRIO],
    pub zone_overlap: [f32; VOICES_PER_TRIO],
}

/// Nine arps grouped into three clocked trios, each voice occupying a
/// zone of the `[0,1]` pitch range that overlaps the previous voice's
/// zone by `zone_overlap` of its own height.
pub struct NonagonIndexArp {
    arps: [IndexArp; NUM_VOICES],
    configs: [IndexArpConfig; NUM_VOICES],
    trios: [TrioConfig; NUM_TRIOS],
    total_index: [i32; NUM_TRIOS],
}

impl Default for NonagonIndexArp {
    fn default() -> Self {
        NonagonIndexArp {
            arps: std::array::from_fn(|_| IndexArp::new()),
            configs: std::array::from_fn(|_| IndexArpConfig::default()),
            trios: [TrioConfig::default(); NUM_TRIOS],
            total_index: [0; NUM_TRIOS],
        }
    }
}

impl NonagonIndexArp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trio_mut(&mut self, trio: usize) -> &mut TrioConfig {
        &mut self.trios[trio]
    }

    pub fn voice_config_mut(&mut self, voice: usize) -> &mut IndexArpConfig {
        &mut self.configs[voice]
    }

    pub fn arp(&self, voice: usize) -> &IndexArp {
        &self.arps[voice]
    }

    fn set_trio_zones(&mut self) {
        for trio in 0..NUM_TRIOS {
            for j in 0..VOICES_PER_TRIO {
                let voice = trio * VOICES_PER_TRIO + j;
                let min = if j == 0 {
                    0.0
                } else {
                    let prev = trio * VOICES_PER_TRIO + j - 1;
                    self.configs[prev].max - self.trios[trio].zone_height[j] * self.trios[trio].zone_overlap[j]
                };
                self.configs[voice].min = min;
                self.configs[voice].max = min + self.trios[trio].zone_height[j];
            }
        }
    }

    /// Advance every arp whose trio's selected clock fired this frame.
    /// `clocks` are the 7 shared external clock lines; `reset[trio]`
    /// clears that trio's voices back to their rhythm start.
    pub fn process(&mut self, clocks: [bool; NUM_CLOCKS], reset: [bool; NUM_TRIOS], read: bool) {
        self.set_trio_zones();

        for trio in 0..NUM_TRIOS {
            if reset[trio] {
                self.total_index[trio] += 1;
            }
        }

        for voice in 0..NUM_VOICES {
            let trio = voice / VOICES_PER_TRIO;
            let clock = self.trios[trio].clock_select.map(|c| clocks[c]).unwrap_or(false);
            let no_clock = self.trios[trio].clock_select.is_none() && read;
            let config = self.configs[voice];
            self.arps[voice].process(&config, clock, read, no_clock, self.total_index[trio]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rhythm_every_other() -> [bool; RHYTHM_LENGTH] {
        [true, false, true, false, true, false, true, false]
    }

    #[test]
    fn process_advances_index_only_on_rhythm_hits() {
        let config = IndexArpConfig { rhythm: rhythm_every_other(), interval: 0.1, min: 0.0, max: 1.0, ..Default::default() };
        let mut arp = IndexArp::new();

        arp.process(&config, true, false, false, 0);
        assert!(arp.triggered());
        assert_eq!(arp.index(), 0);

        arp.process(&config, true, false, false, 1);
        assert!(!arp.triggered());

        arp.process(&config, true, false, false, 2);
        assert!(arp.triggered());
        assert_eq!(arp.index(), 1);
    }

    #[test]
    fn cycle_folds_into_a_triangle_instead_of_a_sawtooth() {
        let config = IndexArpConfig { rhythm: [true; RHYTHM_LENGTH], cycle: true, interval: 0.3, min: 0.0, max: 1.0, ..Default::default() };
        let out_at = |index: i32| config.output_for(index, 0);
        // 3*0.3 = 0.9, folds to 0.9 (< 1, no fold yet); 4*0.3=1.2 folds to 0.8.
        assert!((out_at(3) - 0.9).abs() < 1e-5);
        assert!((out_at(4) - 0.8).abs() < 1e-5);
    }

    #[test]
    fn invert_flips_around_the_midpoint_before_range_mapping() {
        let config = IndexArpConfig { rhythm: [true; RHYTHM_LENGTH], invert: true, interval: 0.25, min: 0.0, max: 10.0, ..Default::default() };
        let normal = IndexArpConfig { invert: false, ..config };
        assert!((config.output_for(1, 0) - (10.0 - normal.output_for(1, 0))).abs() < 1e-4);
    }

    #[test]
    fn select_index_folds_excess_into_octaves() {
        assert_eq!(select_index(2.5, 4), (2, 0));
        assert_eq!(select_index(5.5, 4), (1, 1));
        assert_eq!(select_index(-0.5, 4), (3, -1));
    }

    #[test]
    fn nonagon_index_arp_derives_overlapping_zones_per_trio() {
        let mut nonagon = NonagonIndexArp::new();
        nonagon.trio_mut(0).zone_height = [0.5, 0.5, 0.5];
        nonagon.trio_mut(0).zone_overlap = [0.0, 0.2, 0.2];
        nonagon.trio_mut(0).clock_select = Some(0);

        let mut clocks = [false; NUM_CLOCKS];
        clocks[0] = true;
        nonagon.process(clocks, [false; NUM_TRIOS], false);

        assert!((nonagon.configs[0].min - 0.0).abs() < 1e-5);
        assert!((nonagon.configs[0].max - 0.5).abs() < 1e-5);
        assert!((nonagon.configs[1].min - (0.5 - 0.5 * 0.2)).abs() < 1e-5);
    }
}
