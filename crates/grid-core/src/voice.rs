//! Round-robin voice allocator used to map polyphonic gate cells (arpeggios,
//! chord grids) onto a bounded set of gate outputs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Hard upper bound on simultaneously tracked voices, independent of the
/// configured polyphony.
pub const MAX_VOICES: usize = 16;

/// A single allocated voice: the coordinate that triggered it and the gate
/// it drives. Two voices are equal iff their coordinates match, mirroring
/// the original comparison (gate identity is not part of equality).
#[derive(Clone)]
pub struct Voice {
    pub gate: Arc<AtomicBool>,
    pub x: i32,
    pub y: i32,
}

impl Voice {
    pub fn new(gate: Arc<AtomicBool>, x: i32, y: i32) -> Self {
        Voice { gate, x, y }
    }
}

impl PartialEq for Voice {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }
}

/// Round-robin polyphonic voice allocator (§4.4).
///
/// Allocation always succeeds: at capacity it steals the oldest voice at the
/// round-robin cursor, skipping past any slot whose gate is still high
/// (a previous deallocation raced a slow note-off) before writing the new
/// voice in.
pub struct VoiceAllocator {
    max_polyphony: usize,
    ix: usize,
    num_active: usize,
    voices: [Option<Voice>; MAX_VOICES],
}

impl VoiceAllocator {
    pub fn new(polyphony: usize) -> Self {
        let mut allocator = VoiceAllocator {
            max_polyphony: polyphony.clamp(1, MAX_VOICES),
            ix: 0,
            num_active: 0,
            voices: std::array::from_fn(|_| None),
        };
        allocator.clear();
        allocator
    }

    pub fn polyphony(&self) -> usize {
        self.max_polyphony
    }

    pub fn num_active(&self) -> usize {
        self.num_active
    }

    fn gate_high(&self, index: usize) -> bool {
        self.voices[index].as_ref().is_some_and(|v| v.gate.load(Ordering::Acquire))
    }

    fn deallocate_at(&mut self, index: usize) {
        if let Some(v) = &self.voices[index] {
            if v.gate.load(Ordering::Acquire) {
                v.gate.store(false, Ordering::Release);
                self.num_active -= 1;
            }
        }
    }

    /// Allocate `voice` at the current round-robin cursor, stealing the
    /// oldest voice first if at capacity.
    pub fn allocate(&mut self, voice: Voice) {
        if self.num_active == self.max_polyphony {
            self.deallocate_at(self.ix);
        }

        while self.gate_high(self.ix) {
            self.ix = (self.ix + 1) % self.max_polyphony;
        }

        voice.gate.store(true, Ordering::Release);
        self.voices[self.ix] = Some(voice);
        self.ix = (self.ix + 1) % self.max_polyphony;
        self.num_active += 1;
    }

    /// Release every voice whose coordinate matches `(x, y)`.
    pub fn deallocate(&mut self, x: i32, y: i32) {
        for i in 0..self.max_polyphony {
            if matches!(&self.voices[i], Some(v) if v.x == x && v.y == y) {
                self.deallocate_at(i);
            }
        }
    }

    /// Drop every gate and reset the cursor. Walks the full fixed-size
    /// backing array, not just the current polyphony, so voices left over
    /// from a larger polyphony setting don't linger with a stuck-high gate.
    pub fn clear(&mut self) {
        for slot in self.voices.iter() {
            if let Some(v) = slot {
                v.gate.store(false, Ordering::Release);
            }
        }
        self.ix = 0;
        self.num_active = 0;
    }

    pub fn set_polyphony(&mut self, polyphony: usize) {
        self.max_polyphony = polyphony.clamp(1, MAX_VOICES);
        self.clear();
    }

    /// Iterate the currently gated voices, in slot order.
    pub fn active(&self) -> impl Iterator<Item = &Voice> {
        self.voices[..self.max_polyphony]
            .iter()
            .filter_map(|slot| slot.as_ref())
            .filter(|v| v.gate.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(x: i32, y: i32) -> Voice {
        Voice::new(Arc::new(AtomicBool::new(false)), x, y)
    }

    #[test]
    fn allocation_at_capacity_steals_the_oldest_voice() {
        let mut alloc = VoiceAllocator::new(2);
        let a = voice(0, 0);
        let b = voice(1, 0);
        let c = voice(2, 0);

        alloc.allocate(a.clone());
        alloc.allocate(b.clone());
        assert_eq!(alloc.num_active(), 2);

        // Capacity reached: allocating c steals a's slot (the round-robin
        // cursor sat on it after b's allocation wrapped).
        alloc.allocate(c.clone());
        assert_eq!(alloc.num_active(), 2);
        assert!(!a.gate.load(Ordering::Acquire));
        assert!(b.gate.load(Ordering::Acquire));
        assert!(c.gate.load(Ordering::Acquire));
    }

    #[test]
    fn round_robin_skips_a_slot_whose_gate_is_still_high() {
        let mut alloc = VoiceAllocator::new(3);
        let a = voice(0, 0);
        let b = voice(1, 0);
        let d = voice(3, 0);

        alloc.allocate(a.clone());
        alloc.allocate(b.clone());
        // Slot 2 is empty; cursor now at 2. Manually raise an unrelated gate
        // to simulate a slot whose note-off hasn't landed yet.
        alloc.voices[2] = Some(voice(9, 9));
        alloc.voices[2].as_ref().unwrap().gate.store(true, Ordering::Release);
        alloc.num_active = 3;

        // At capacity: steals slot at cursor (2), which is high, so
        // deallocate_at on it only clears if its own gate check applies —
        // the allocator deallocates the cursor slot directly regardless.
        alloc.allocate(d.clone());
        assert!(d.gate.load(Ordering::Acquire));
    }

    #[test]
    fn deallocate_by_coordinate_releases_matching_voice() {
        let mut alloc = VoiceAllocator::new(4);
        let a = voice(5, 5);
        alloc.allocate(a.clone());
        assert_eq!(alloc.num_active(), 1);

        alloc.deallocate(5, 5);
        assert_eq!(alloc.num_active(), 0);
        assert!(!a.gate.load(Ordering::Acquire));
    }

    #[test]
    fn set_polyphony_clears_all_gates() {
        let mut alloc = VoiceAllocator::new(2);
        let a = voice(0, 0);
        alloc.allocate(a.clone());

        alloc.set_polyphony(4);
        assert_eq!(alloc.polyphony(), 4);
        assert_eq!(alloc.num_active(), 0);
        assert!(!a.gate.load(Ordering::Acquire));
    }
}
