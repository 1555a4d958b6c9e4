//! Active-node tracking.
//!
//! [`ActiveSet`] keeps two atomic bitsets. During superstep `T` the bitset of
//! generation `T % 2` is read-only and lists the nodes executing in `T`; the
//! other generation collects nodes for `T + 1`, set either by the node itself
//! (it did not vote to halt) or by any thread delivering it a message. Workers
//! clear the bits of their own range in the current generation once they are
//! done with it, so at the barrier it is ready to become the next generation.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::AllocationError;

const WORD_BITS: usize = 64;

/// Fixed-size bitset with atomic per-bit updates.
#[derive(Debug)]
pub struct AtomicBitSet {
    words: Vec<AtomicU64>,
    len: usize,
}

impl AtomicBitSet {
    /// Allocates an all-clear bitset of `len` bits.
    pub fn try_new(len: usize) -> Result<Self, AllocationError> {
        let word_count = len.div_ceil(WORD_BITS);
        let mut words = Vec::new();
        words
            .try_reserve_exact(word_count)
            .map_err(|_| AllocationError {
                requested: word_count,
            })?;
        words.extend((0..word_count).map(|_| AtomicU64::new(0)));
        Ok(AtomicBitSet { words, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, index: usize) -> bool {
        let word = self.words[index / WORD_BITS].load(Ordering::Relaxed);
        word & (1 << (index % WORD_BITS)) != 0
    }

    /// Sets bit `index`, returning `true` if it was previously clear.
    #[inline]
    pub fn insert(&self, index: usize) -> bool {
        let mask = 1u64 << (index % WORD_BITS);
        let prev = self.words[index / WORD_BITS].fetch_or(mask, Ordering::Relaxed);
        prev & mask == 0
    }

    /// Sets every bit.
    pub fn insert_all(&self) {
        for (i, word) in self.words.iter().enumerate() {
            word.store(self.range_mask(i, 0, self.len), Ordering::Relaxed);
        }
    }

    /// Clears the bits in `[start, end)`. Boundary words are updated
    /// atomically so neighbouring ranges may be cleared concurrently.
    pub fn clear_range(&self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let first = start / WORD_BITS;
        let last = (end - 1) / WORD_BITS;
        for i in first..=last {
            let mask = self.range_mask(i, start, end);
            if mask == u64::MAX {
                self.words[i].store(0, Ordering::Relaxed);
            } else {
                self.words[i].fetch_and(!mask, Ordering::Relaxed);
            }
        }
    }

    /// Number of set bits.
    pub fn count(&self) -> u64 {
        self.words
            .iter()
            .map(|w| u64::from(w.load(Ordering::Relaxed).count_ones()))
            .sum()
    }

    /// Iterates the set bits in `[start, end)` in ascending order.
    pub fn iter_range(&self, start: usize, end: usize) -> SetBits<'_> {
        let end = end.min(self.len);
        let word_idx = start / WORD_BITS;
        let current = if start < end {
            self.words[word_idx].load(Ordering::Relaxed) & self.range_mask(word_idx, start, end)
        } else {
            0
        };
        SetBits {
            set: self,
            start,
            end,
            word_idx,
            current,
        }
    }

    /// Mask of the bits of word `word_idx` that fall inside `[start, end)`.
    fn range_mask(&self, word_idx: usize, start: usize, end: usize) -> u64 {
        let word_start = word_idx * WORD_BITS;
        let lo = start.saturating_sub(word_start).min(WORD_BITS);
        let hi = end.saturating_sub(word_start).min(WORD_BITS);
        if lo >= hi {
            return 0;
        }
        let upper = if hi == WORD_BITS { u64::MAX } else { (1u64 << hi) - 1 };
        let lower = (1u64 << lo) - 1;
        upper & !lower
    }
}

/// Iterator over set bits of an [`AtomicBitSet`] range.
pub struct SetBits<'a> {
    set: &'a AtomicBitSet,
    start: usize,
    end: usize,
    word_idx: usize,
    current: u64,
}

impl Iterator for SetBits<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.word_idx * WORD_BITS + bit);
            }
            self.word_idx += 1;
            if self.word_idx * WORD_BITS >= self.end {
                return None;
            }
            self.current = self.set.words[self.word_idx].load(Ordering::Relaxed)
                & self.set.range_mask(self.word_idx, self.start, self.end);
        }
    }
}

/// Double-buffered active-node bitsets indexed by superstep parity.
#[derive(Debug)]
pub struct ActiveSet {
    generations: [AtomicBitSet; 2],
}

impl ActiveSet {
    pub fn try_new(node_count: usize) -> Result<Self, AllocationError> {
        Ok(ActiveSet {
            generations: [
                AtomicBitSet::try_new(node_count)?,
                AtomicBitSet::try_new(node_count)?,
            ],
        })
    }

    /// Nodes executing in `superstep`.
    #[inline]
    pub fn current(&self, superstep: u32) -> &AtomicBitSet {
        &self.generations[(superstep % 2) as usize]
    }

    /// Nodes scheduled for `superstep + 1`.
    #[inline]
    pub fn next(&self, superstep: u32) -> &AtomicBitSet {
        &self.generations[((superstep + 1) % 2) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reports_newly_set_bits() {
        let set = AtomicBitSet::try_new(130).unwrap();
        assert!(set.insert(129));
        assert!(!set.insert(129));
        assert!(set.get(129));
        assert!(!set.get(128));
        assert_eq!(set.count(), 1);
    }

    #[test]
    fn insert_all_respects_length() {
        let set = AtomicBitSet::try_new(70).unwrap();
        set.insert_all();
        assert_eq!(set.count(), 70);
        assert_eq!(set.iter_range(0, 70).count(), 70);
    }

    #[test]
    fn iter_range_is_bounded_and_ordered() {
        let set = AtomicBitSet::try_new(200).unwrap();
        for i in [0, 5, 63, 64, 65, 127, 128, 199] {
            set.insert(i);
        }
        assert_eq!(set.iter_range(5, 128).collect::<Vec<_>>(), vec![5, 63, 64, 65, 127]);
        assert_eq!(set.iter_range(0, 200).count(), 8);
        assert_eq!(set.iter_range(66, 127).count(), 0);
        assert_eq!(set.iter_range(10, 10).count(), 0);
    }

    #[test]
    fn clear_range_keeps_neighbours() {
        let set = AtomicBitSet::try_new(192).unwrap();
        set.insert_all();
        set.clear_range(10, 150);
        assert_eq!(set.count(), 192 - 140);
        assert!(set.get(9));
        assert!(!set.get(10));
        assert!(!set.get(149));
        assert!(set.get(150));
    }

    #[test]
    fn generations_alternate_with_parity() {
        let active = ActiveSet::try_new(8).unwrap();
        active.next(0).insert(3);
        assert!(active.current(1).get(3));
        assert!(!active.current(0).get(3));
        assert!(std::ptr::eq(active.next(1), active.current(0)));
    }
}
