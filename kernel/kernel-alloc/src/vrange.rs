//! # Virtual-range randomiser
//!
//! Maintains a bounded, sorted set of free virtual ranges and hands out
//! uniformly-random, alignment-respecting placements within them. Backs the
//! kernel virtual allocator: instead of a simple bump or first-fit scheme,
//! every `n`-page request lands at one of the many equally valid aligned
//! offsets inside a suitable range, chosen uniformly at random.
//!
//! Ported from the size-descending, evict-smallest-on-full `RangeRandomizer`
//! design: ranges are kept sorted by `size` descending so that eviction under
//! capacity pressure always drops the range least useful to future large
//! requests.

use kernel_vmem::addresses::VirtualAddress;

/// Upper bound on how many disjoint free ranges this allocator tracks at
/// once. Matches the capacity of the design this is ported from.
pub const CAPACITY: usize = 256;

/// Fixed allocation alignment: one 4 KiB page.
pub const ALIGNMENT: u64 = 4096;

/// Source of uniformly-distributed random 64-bit values.
///
/// The kernel-side implementation is backed by RDRAND (see
/// [`crate::rdrand`]-equivalent wrapper in the `kernel` crate); tests use a
/// small deterministic PRNG so results are reproducible.
pub trait RandomSource {
    /// Return a uniformly-distributed `u64`.
    fn next_u64(&mut self) -> u64;

    /// Return a uniformly-distributed value in `[0, bound)`. `bound` must be
    /// non-zero. Uses Lemire's method to avoid modulo bias.
    fn uniform_below(&mut self, bound: u64) -> u64 {
        debug_assert!(bound > 0);
        if bound == 0 {
            return 0;
        }
        // Rejection-sampling against the largest multiple of `bound` that
        // fits in u64 keeps the distribution uniform even when `bound` does
        // not evenly divide 2^64.
        let limit = u64::MAX - (u64::MAX % bound);
        loop {
            let v = self.next_u64();
            if v < limit || limit == 0 {
                return v % bound;
            }
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Range {
    base: u64,
    size: u64,
}

impl Range {
    /// Number of distinct `alignment`-sized slide positions a
    /// `requested_size` allocation has inside this range.
    const fn possible_slides(self, requested_size: u64, alignment: u64) -> u64 {
        if self.size < requested_size {
            return 0;
        }
        (self.size - requested_size) / alignment + 1
    }

    /// Split this range around a carved-out sub-region
    /// `[base+offset, base+offset+requested_size)`, returning the (before,
    /// after) remainders, each `None` if empty.
    const fn split(self, offset: u64, requested_size: u64) -> (Option<Range>, Option<Range>) {
        let before = if offset > 0 {
            Some(Range {
                base: self.base,
                size: offset,
            })
        } else {
            None
        };
        let consumed = offset + requested_size;
        let after = if consumed < self.size {
            Some(Range {
                base: self.base + consumed,
                size: self.size - consumed,
            })
        } else {
            None
        };
        (before, after)
    }
}

/// A bounded, size-sorted set of free virtual ranges with randomised
/// placement.
pub struct RangeRandomizer {
    ranges: heapless_ranges::RangeSet,
}

impl Default for RangeRandomizer {
    fn default() -> Self {
        Self::new()
    }
}

impl RangeRandomizer {
    /// An empty randomiser.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ranges: heapless_ranges::RangeSet::new(),
        }
    }

    /// Insert a free range `[base, base+size)`, subject to the same
    /// capacity/eviction rule as ranges produced internally by `get`.
    pub fn add(&mut self, base: VirtualAddress, size: u64) {
        self.ranges.insert(Range {
            base: base.as_u64(),
            size,
        });
    }

    /// Uniformly-randomly place a `requested_size`-byte request, splitting
    /// whichever range it lands in. Returns `None` iff no stored range has
    /// `size >= requested_size`.
    pub fn get(&mut self, requested_size: u64, rng: &mut impl RandomSource) -> Option<VirtualAddress> {
        let total_slides: u64 = self
            .ranges
            .iter()
            .map(|r| r.possible_slides(requested_size, ALIGNMENT))
            .sum();
        if total_slides == 0 {
            return None;
        }

        let mut pick = rng.uniform_below(total_slides);
        let idx = self.ranges.iter().position(|r| {
            let slides = r.possible_slides(requested_size, ALIGNMENT);
            if pick < slides {
                true
            } else {
                pick -= slides;
                false
            }
        })?;

        let chosen = self.ranges.remove(idx);
        let offset = pick * ALIGNMENT;
        let (before, after) = chosen.split(offset, requested_size);
        if let Some(b) = before {
            self.ranges.insert(b);
        }
        if let Some(a) = after {
            self.ranges.insert(a);
        }

        Some(VirtualAddress::new(chosen.base + offset))
    }

    /// Number of ranges currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// True if no ranges are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.len() == 0
    }
}

/// A fixed-capacity, size-descending-sorted vector of [`Range`]s with
/// evict-smallest-when-full insertion.
mod heapless_ranges {
    use super::{Range, CAPACITY};

    pub(super) struct RangeSet {
        items: [Range; CAPACITY],
        len: usize,
    }

    impl RangeSet {
        pub(super) const fn new() -> Self {
            Self {
                items: [Range { base: 0, size: 0 }; CAPACITY],
                len: 0,
            }
        }

        pub(super) fn len(&self) -> usize {
            self.len
        }

        pub(super) fn iter(&self) -> impl Iterator<Item = &Range> {
            self.items[..self.len].iter()
        }

        /// Insert `r`, keeping the set sorted by `size` descending. If the
        /// set is already at capacity, the smallest tracked range is evicted
        /// first — but only if `r` is not itself smaller than that range
        /// (in which case `r` is simply dropped, matching the ported
        /// design's "don't bother keeping what you can't fit" rule).
        pub(super) fn insert(&mut self, r: Range) {
            if self.len == CAPACITY {
                let smallest = self.items[self.len - 1];
                if r.size <= smallest.size {
                    return;
                }
                self.len -= 1;
            }

            let pos = self.items[..self.len].partition_point(|x| x.size >= r.size);
            for i in (pos..self.len).rev() {
                self.items[i + 1] = self.items[i];
            }
            self.items[pos] = r;
            self.len += 1;
        }

        pub(super) fn remove(&mut self, idx: usize) -> Range {
            let r = self.items[idx];
            for i in idx..self.len - 1 {
                self.items[i] = self.items[i + 1];
            }
            self.len -= 1;
            r
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic PRNG (xorshift64*) for reproducible tests only.
    struct TestRng(u64);
    impl RandomSource for TestRng {
        fn next_u64(&mut self) -> u64 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.0 = x;
            x.wrapping_mul(0x2545_f491_4f6c_dd1d)
        }
    }

    #[test]
    fn single_exact_fit_range_has_one_slide() {
        let r = Range { base: 0, size: 4096 };
        assert_eq!(r.possible_slides(4096, 4096), 1);
    }

    #[test]
    fn byte_aligned_request_has_512_slides_in_one_page() {
        let r = Range { base: 0, size: 4096 };
        assert_eq!(r.possible_slides(8, 8), 512);
    }

    #[test]
    fn get_exact_fit_returns_the_only_possible_base() {
        let mut rr = RangeRandomizer::new();
        rr.add(VirtualAddress::new(0), 4096);
        let mut rng = TestRng(0xdead_beef);
        let got = rr.get(4096, &mut rng).expect("one range of the exact size");
        assert_eq!(got.as_u64(), 0);
        assert!(rr.is_empty());
    }

    #[test]
    fn get_returns_none_when_nothing_big_enough() {
        let mut rr = RangeRandomizer::new();
        rr.add(VirtualAddress::new(0x1000), 4096);
        let mut rng = TestRng(1);
        assert!(rr.get(8192, &mut rng).is_none());
    }

    #[test]
    fn get_result_lands_inside_the_original_range_and_is_removed() {
        let mut rr = RangeRandomizer::new();
        rr.add(VirtualAddress::new(0x1_0000), 64 * 1024);
        let mut rng = TestRng(42);
        let got = rr.get(4096, &mut rng).unwrap();
        assert!(got.as_u64() >= 0x1_0000);
        assert!(got.as_u64() + 4096 <= 0x1_0000 + 64 * 1024);
    }

    #[test]
    fn exhaustive_4096_byte_range_with_8_byte_requests_yields_512_distinct_slots() {
        let mut rr = RangeRandomizer::new();
        rr.add(VirtualAddress::new(0), 4096);
        let mut rng = TestRng(7);
        let mut seen = [false; 512];
        for _ in 0..512 {
            let got = rr.get(8, &mut rng).expect("a slot must remain available");
            let idx = (got.as_u64() / 8) as usize;
            assert!(!seen[idx], "slot {idx} returned twice");
            seen[idx] = true;
        }
        assert!(rr.get(8, &mut rng).is_none());
    }

    #[test]
    fn capacity_evicts_the_smallest_range_when_full() {
        let mut rr = RangeRandomizer::new();
        for i in 0..CAPACITY as u64 {
            rr.add(VirtualAddress::new(i * 0x10_0000), (i + 1) * 4096);
        }
        assert_eq!(rr.len(), CAPACITY);
        // Every range here is smaller than 1 extra page, so adding a huge
        // range must evict the current smallest (size 4096) and still fit.
        rr.add(VirtualAddress::new(0xffff_0000), 1 << 30);
        assert_eq!(rr.len(), CAPACITY);
    }
}
