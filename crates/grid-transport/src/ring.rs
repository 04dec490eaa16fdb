//! A fixed-capacity single-producer/single-consumer lock-free ring, plus a
//! byte-chunk variant used by the background file writer.
//!
//! Head and tail are wrap-free atomic counters (monotonically increasing);
//! the buffer index is the counter modulo capacity. Empty iff `head ==
//! tail`, full iff `head - tail == N`.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A bounded SPSC queue of `T`. `push` is called only from the producer,
/// `pop`/`peek` only from the consumer.
pub struct Ring<T> {
    capacity: usize,
    buffer: Box<[UnsafeCell<Option<T>>]>,
    head: AtomicUsize,
    tail: AtomicUsize,
}

unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    pub fn new(capacity: usize) -> Self {
        let buffer = (0..capacity).map(|_| UnsafeCell::new(None)).collect::<Vec<_>>().into_boxed_slice();
        Ring { capacity, buffer, head: AtomicUsize::new(0), tail: AtomicUsize::new(0) }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tail.load(Ordering::Acquire) - self.head.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Push a value; returns it back (as `Err`) if the ring is full.
    pub fn push(&self, value: T) -> Result<(), T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail - head == self.capacity {
            return Err(value);
        }

        let slot = &self.buffer[tail % self.capacity];
        // SAFETY: only the producer writes this slot, and only after the
        // consumer has advanced `head` past its previous occupant.
        unsafe { *slot.get() = Some(value) };
        self.tail.store(tail + 1, Ordering::Release);
        Ok(())
    }

    /// Remove and return the oldest value, or `None` if empty.
    pub fn pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }

        let slot = &self.buffer[head % self.capacity];
        // SAFETY: only the consumer touches this slot, and only within the
        // range the producer has published via `tail`.
        let value = unsafe { (*slot.get()).take() };
        self.head.store(head + 1, Ordering::Release);
        value
    }

    /// Look at the oldest value without consuming it.
    pub fn peek(&self) -> Option<&T>
    where
        T: Copy,
    {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        let slot = &self.buffer[head % self.capacity];
        unsafe { (*slot.get()).as_ref() }
    }
}

/// A byte-chunk ring: the producer stages bytes and flushes fixed-size
/// chunks into the underlying ring once a chunk fills (or on demand).
/// Used by the background file writer so disk writes happen in whole
/// chunks instead of byte-by-byte.
pub struct ChunkRing {
    ring: Ring<Vec<u8>>,
    chunk_size: usize,
    staging: UnsafeCell<Vec<u8>>,
}

unsafe impl Sync for ChunkRing {}

impl ChunkRing {
    pub fn new(capacity: usize, chunk_size: usize) -> Self {
        ChunkRing { ring: Ring::new(capacity), chunk_size, staging: UnsafeCell::new(Vec::with_capacity(chunk_size)) }
    }

    /// Producer-only: append bytes, flushing whole chunks as they fill.
    /// Returns `false` if a full chunk couldn't be pushed because the ring
    /// was full (the bytes are still staged and will be retried later).
    pub fn write(&self, data: &[u8]) -> bool {
        // SAFETY: single producer.
        let staging = unsafe { &mut *self.staging.get() };
        staging.extend_from_slice(data);
        let mut ok = true;
        while staging.len() >= self.chunk_size {
            let chunk: Vec<u8> = staging.drain(..self.chunk_size).collect();
            if self.ring.push(chunk).is_err() {
                ok = false;
                break;
            }
        }
        ok
    }

    /// Force whatever is staged out as a short final chunk.
    pub fn flush(&self) -> bool {
        // SAFETY: single producer.
        let staging = unsafe { &mut *self.staging.get() };
        if staging.is_empty() {
            return true;
        }
        let chunk = std::mem::take(staging);
        self.ring.push(chunk).is_ok()
    }

    pub fn pop(&self) -> Option<Vec<u8>> {
        self.ring.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_round_trips_in_fifo_order() {
        let ring: Ring<u32> = Ring::new(4);
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn push_fails_when_full() {
        let ring: Ring<u32> = Ring::new(2);
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        assert_eq!(ring.push(3), Err(3));
    }

    #[test]
    fn peek_does_not_consume() {
        let ring: Ring<u32> = Ring::new(2);
        ring.push(42).unwrap();
        assert_eq!(ring.peek(), Some(&42));
        assert_eq!(ring.peek(), Some(&42));
        assert_eq!(ring.pop(), Some(42));
    }

    #[test]
    fn chunk_ring_flushes_full_chunks_automatically() {
        let chunks = ChunkRing::new(4, 4);
        chunks.write(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(chunks.pop(), Some(vec![1, 2, 3, 4]));
        assert_eq!(chunks.pop(), None);

        chunks.flush();
        assert_eq!(chunks.pop(), Some(vec![5, 6]));
    }

    #[test]
    fn spsc_ring_survives_concurrent_producer_and_consumer() {
        let ring = std::sync::Arc::new(Ring::<u32>::new(16));
        let producer_ring = ring.clone();
        let producer = std::thread::spawn(move || {
            for i in 0..1000u32 {
                while producer_ring.push(i).is_err() {
                    std::thread::yield_now();
                }
            }
        });

        let mut received = Vec::new();
        while received.len() < 1000 {
            if let Some(v) = ring.pop() {
                received.push(v);
            } else {
                std::thread::yield_now();
            }
        }
        producer.join().unwrap();
        assert_eq!(received, (0..1000).collect::<Vec<_>>());
    }
}
