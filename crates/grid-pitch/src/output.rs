//! Per-output co-mute iteration, sorted pitch caching, and percentile/
//! index-arp channel selection.
//!
//! Grounded on `LameJuis.hpp`'s `Output`/`InputVectorIterator`/
//! `CacheForSingleInputVector`: a co-mute bitset enumerates the 2^|co-mute|
//! input vectors obtained by freezing every non-co-muted bit at the live
//! input's value, the resulting (counters, pitch) list is sorted once per
//! default vector and cached, and channel selection reads either a
//! percentile or an index-arp-driven rank out of the distinct-pitch
//! groups in that sorted list.

use crate::error::{PitchError, PitchResult};
use crate::index_arp::select_index;
use crate::matrix::{InputVector, LameJuis, MatrixEvalResultWithPitch, NUM_INPUTS};

pub const MAX_POLY: usize = 16;
const VECTOR_SPACE: usize = 1 << NUM_INPUTS;

/// Enumerates every input vector obtained by fixing the non-co-muted
/// bits of `default_vector` and iterating all combinations of the
/// co-muted bits.
pub struct InputVectorIterator {
    ordinal: u32,
    co_mute_size: usize,
    default_vector: InputVector,
    forwarding_indices: [usize; NUM_INPUTS],
}

impl InputVectorIterator {
    pub fn new(co_mute_vector: InputVector, default_vector: InputVector) -> Self {
        let co_mute_size = co_mute_vector.count_set_bits();
        let mut forwarding_indices = [0usize; NUM_INPUTS];
        let mut j = 0;
        for slot in forwarding_indices.iter_mut().take(co_mute_size) {
            while !co_mute_vector.get(j) {
                j += 1;
            }
            *slot = j;
            j += 1;
        }

        InputVectorIterator { ordinal: 0, co_mute_size, default_vector, forwarding_indices }
    }

    pub fn done(&self) -> bool {
        (1u32 << self.co_mute_size) <= self.ordinal
    }

    pub fn get(&self) -> InputVector {
        let mut result = self.default_vector;
        let bits = InputVector(self.ordinal as u8);
        for (i, &slot) in self.forwarding_indices[..self.co_mute_size].iter().enumerate() {
            result.set(slot, bits.get(i));
        }
        result
    }

    pub fn next(&mut self) {
        self.ordinal += 1;
    }
}

/// How one polyphony channel's pitch is picked out of the sorted,
/// deduplicated result list.
#[derive(Debug, Clone, Copy)]
pub enum ChannelSelection {
    Percentile(f32),
    /// `arp`/`pre_arp` name voices in the owning [`NonagonIndexArp`];
    /// `pre_arp` contributes an extra octave offset ahead of `arp`'s own.
    IndexArp { arp: usize, pre_arp: Option<usize> },
    Fixed { index: usize, octave: i32 },
}

impl Default for ChannelSelection {
    fn default() -> Self {
        ChannelSelection::Fixed { index: 0, octave: 0 }
    }
}

#[derive(Default, Clone, Copy)]
struct ChannelConfig {
    selection: ChannelSelection,
    octave: i32,
    harmonic: bool,
}

/// Sorted, deduplicated pitch cache for one default vector, shared by
/// every channel that asks for a pitch under the same matrix state.
#[derive(Clone)]
struct SortedCache {
    results: Vec<MatrixEvalResultWithPitch>,
    // rank of each sorted slot within its group of equal-pitch entries
    result_ord: Vec<usize>,
    // first sorted slot index for each distinct pitch group
    reverse_index: Vec<usize>,
    num_distinct: usize,
    evaluated: bool,
}

impl Default for SortedCache {
    fn default() -> Self {
        SortedCache { results: Vec::new(), result_ord: Vec::new(), reverse_index: Vec::new(), num_distinct: 0, evaluated: false }
    }
}

impl SortedCache {
    fn eval(&mut self, matrix: &mut LameJuis, co_mute: InputVector, default_vector: InputVector, harmonic: bool) {
        if self.evaluated {
            return;
        }

        let mut iter = InputVectorIterator::new(co_mute, default_vector);
        let mut results = Vec::new();
        while !iter.done() {
            let mut r = matrix.eval(iter.get());
            if !harmonic {
                r.octave_reduce();
            }
            results.push(r);
            iter.next();
        }

        results.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mut result_ord = vec![0usize; results.len()];
        let mut reverse_index = Vec::new();
        if !results.is_empty() {
            reverse_index.push(0);
            let mut cur = 0;
            for i in 1..results.len() {
                if results[i].pitch != results[i - 1].pitch {
                    cur += 1;
                    reverse_index.push(i);
                }
                result_ord[i] = cur;
            }
            self.num_distinct = cur + 1;
        }

        self.results = results;
        self.result_ord = result_ord;
        self.reverse_index = reverse_index;
        self.evaluated = true;
    }

    fn clear(&mut self) {
        self.evaluated = false;
    }

    fn percentile_to_ix(&self, percentile: f32) -> usize {
        let ix = (percentile * self.results.len() as f32) as i64;
        ix.clamp(0, self.results.len() as i64 - 1).max(0) as usize
    }
}

/// A single LameJuis output: a co-mute set, a polyphony count, and a
/// per-channel pitch-selection rule, with a pair of sorted-pitch caches
/// (harmonic/melodic) per possible default vector.
pub struct Output {
    co_mute: InputVector,
    channels: [ChannelConfig; MAX_POLY],
    poly_chans: usize,
    harmonic_caches: Vec<SortedCache>,
    melodic_caches: Vec<SortedCache>,
}

impl Default for Output {
    fn default() -> Self {
        Output {
            co_mute: InputVector::default(),
            channels: [ChannelConfig::default(); MAX_POLY],
            poly_chans: 0,
            harmonic_caches: vec![SortedCache::default(); VECTOR_SPACE],
            melodic_caches: vec![SortedCache::default(); VECTOR_SPACE],
        }
    }
}

impl Output {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_co_mute(&mut self, i: usize, value: bool) {
        self.co_mute.set(i, value);
        self.invalidate();
    }

    pub fn set_poly_chans(&mut self, poly_chans: usize) {
        self.poly_chans = poly_chans.min(MAX_POLY);
    }

    pub fn poly_chans(&self) -> usize {
        self.poly_chans
    }

    pub fn set_channel(&mut self, chan: usize, selection: ChannelSelection, octave: i32, harmonic: bool) -> PitchResult<()> {
        if chan >= MAX_POLY {
            return Err(PitchError::ChannelOutOfRange(chan));
        }
        self.channels[chan] = ChannelConfig { selection, octave, harmonic };
        Ok(())
    }

    fn invalidate(&mut self) {
        for cache in self.harmonic_caches.iter_mut().chain(self.melodic_caches.iter_mut()) {
            cache.clear();
        }
    }

    /// The pitch for `chan` given the matrix's current live input vector.
    /// Advances (and caches) the sorted pitch list for this default
    /// vector if it isn't already evaluated.
    pub fn compute_pitch(&mut self, matrix: &mut LameJuis, default_vector: InputVector, chan: usize, arps: &crate::index_arp::NonagonIndexArp) -> PitchResult<f32> {
        if chan >= self.poly_chans {
            return Err(PitchError::ChannelOutOfRange(chan));
        }

        let config = self.channels[chan];
        let co_mute = self.co_mute;
        let key = (default_vector.0 & 0x3F) as usize;
        let cache = if config.harmonic { &mut self.harmonic_caches[key] } else { &mut self.melodic_caches[key] };
        cache.eval(matrix, co_mute, default_vector, config.harmonic);

        if cache.results.is_empty() {
            return Ok(0.0);
        }

        let (ix, extra_octave) = match config.selection {
            ChannelSelection::Percentile(p) => (cache.percentile_to_ix(p), 0),
            ChannelSelection::Fixed { index, .. } => {
                let ix = cache.reverse_index.get(index).copied().unwrap_or(0);
                (ix, 0)
            }
            ChannelSelection::IndexArp { arp, pre_arp } => {
                let pre_octave = pre_arp.map(|p| select_index(arps.arp(p).output(), cache.num_distinct).1).unwrap_or(0);
                let (group, octave) = select_index(arps.arp(arp).output(), cache.num_distinct);
                let ix = cache.reverse_index.get(group).copied().unwrap_or(0);
                (ix, pre_octave + octave)
            }
        };

        let base_octave = match config.selection {
            ChannelSelection::Fixed { octave, .. } => octave,
            _ => config.octave,
        };

        Ok(cache.results[ix].pitch + (base_octave + extra_octave) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_arp::NonagonIndexArp;
    use crate::matrix::{MatrixSwitch, Operator, SwitchVal};

    fn and_matrix_on_input_0_and_1() -> LameJuis {
        let mut matrix = LameJuis::new();
        matrix.operation_mut(0).set_element(0, MatrixSwitch::Normal);
        matrix.operation_mut(0).set_element(1, MatrixSwitch::Normal);
        matrix.operation_mut(0).set_operator(Operator::And);
        matrix.operation_mut(0).set_switch(SwitchVal::Up);
        for i in 1..6 {
            matrix.operation_mut(i).set_operator(Operator::Off);
        }
        matrix.accumulator_mut(0).set(crate::matrix::Interval::Octave, 0.0, false);
        matrix
    }

    #[test]
    fn co_mute_iterator_enumerates_every_combination_of_co_muted_bits() {
        let mut co_mute = InputVector::default();
        co_mute.set(0, true);
        co_mute.set(2, true);
        let default_vector = InputVector(0b000100);

        let mut seen = Vec::new();
        let mut iter = InputVectorIterator::new(co_mute, default_vector);
        while !iter.done() {
            seen.push(iter.get().0 & 0x3F);
            iter.next();
        }

        assert_eq!(seen.len(), 4);
        assert!(seen.contains(&0b000100));
        assert!(seen.contains(&0b000101));
        assert!(seen.contains(&0b000001));
    }

    #[test]
    fn percentile_selection_picks_proportionally_into_the_sorted_list() {
        let mut matrix = and_matrix_on_input_0_and_1();
        let mut output = Output::new();
        output.set_co_mute(0, true);
        output.set_co_mute(1, true);
        output.set_poly_chans(1);
        output.set_channel(0, ChannelSelection::Percentile(1.0), 0, true).unwrap();

        let arps = NonagonIndexArp::new();
        let pitch = output.compute_pitch(&mut matrix, InputVector::default(), 0, &arps).unwrap();
        // Highest percentile should land on the AND-true case (both bits
        // set), worth a full octave.
        assert!((pitch - 1.0).abs() < 1e-4);
    }

    #[test]
    fn fixed_octave_offset_shifts_the_selected_pitch() {
        let mut matrix = and_matrix_on_input_0_and_1();
        let mut output = Output::new();
        output.set_poly_chans(1);
        output.set_channel(0, ChannelSelection::Fixed { index: 0, octave: 2 }, 0, true).unwrap();

        let arps = NonagonIndexArp::new();
        let pitch = output.compute_pitch(&mut matrix, InputVector::default(), 0, &arps).unwrap();
        assert!(pitch >= 2.0);
    }
}
