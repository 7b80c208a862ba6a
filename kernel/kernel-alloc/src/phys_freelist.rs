//! # Multi-level physical page freelist
//!
//! Five intrusive, singly-linked freelists of physical pages, one per size
//! class `L ∈ 1..=5` (4 KiB, 2 MiB, 1 GiB, 512 GiB, 256 TiB). Each free page
//! stores the physical address of the next free page of the same class in
//! its own first 8 bytes; a zero next-pointer terminates the chain.
//!
//! `get(L)` pops the head of class `L`; on exhaustion it recursively borrows
//! one page from class `L+1` and splits it into 512 pages of class `L`,
//! keeping one and pushing the other 511. There is no coalescing on
//! `give` — once split, pages are only ever reassembled by being handed
//! back to a *higher* level explicitly (which this freelist does not do
//! itself; the page-table engine returns emptied tables at their native
//! level only).
//!
//! Level 1 exhaustion (no free 4 KiB page anywhere in levels 1..=5) is a
//! fatal condition: the kernel has run out of physical memory to hand out
//! page tables or mappings, and every caller assumes `get(1)` succeeds or
//! the machine halts.

use crate::phys_mapper::RawFreePage;
use kernel_vmem::PhysMapper;
use kernel_vmem::addresses::PhysicalAddress;
use log::{debug, error, warn};

/// Number of size classes tracked (levels 1..=5, see module docs).
pub const LEVELS: usize = 5;

/// Page size in bytes for freelist level `l` (1-indexed: 1..=5).
#[must_use]
pub const fn level_size(l: usize) -> u64 {
    debug_assert!(l >= 1 && l <= LEVELS);
    1u64 << (12 + 9 * (l - 1))
}

/// Per-size-class intrusive freelist of physical pages.
///
/// `M` provides the physical-to-virtual mapping used to read/write the
/// next-pointer stored inside each free page; the caller is responsible for
/// making sure every page ever pushed here is actually mapped writable
/// through `M` at the moment of the push/pop.
pub struct PhysFreeList<'m, M: PhysMapper> {
    mapper: &'m M,
    heads: [u64; LEVELS],
}

impl<'m, M: PhysMapper> PhysFreeList<'m, M> {
    /// An empty freelist at every level.
    #[must_use]
    pub const fn new(mapper: &'m M) -> Self {
        Self {
            mapper,
            heads: [0; LEVELS],
        }
    }

    /// Current head pointer for level `l` (1-indexed), `0` if empty.
    #[must_use]
    pub const fn head(&self, l: usize) -> u64 {
        self.heads[l - 1]
    }

    /// Push a free page of level `l` onto that level's list. No coalescing.
    ///
    /// # Panics
    /// Panics (fatal, per the component's error taxonomy) if `pa` is not
    /// aligned to `level_size(l)`.
    pub fn give(&mut self, pa: PhysicalAddress, l: usize) {
        assert!((1..=LEVELS).contains(&l), "freelist level out of range");
        let size = level_size(l);
        assert!(
            pa.is_aligned_to(size),
            "alignment_refused: {pa:?} is not aligned to level-{l} page size ({size:#x})"
        );

        let prev_head = self.heads[l - 1];
        unsafe {
            RawFreePage::at(self.mapper, pa).store_next(prev_head);
        }
        self.heads[l - 1] = pa.as_u64();
    }

    /// Pop a page of level `l`, splitting a page from a higher level on
    /// exhaustion. Returns `None` only when level `LEVELS` (the top level)
    /// is also exhausted; `get(1)` returning `None` is the fatal "out of
    /// physical memory" condition and callers should treat it as such.
    pub fn get(&mut self, l: usize) -> Option<PhysicalAddress> {
        assert!((1..=LEVELS).contains(&l), "freelist level out of range");

        if self.heads[l - 1] != 0 {
            let pa = PhysicalAddress::new(self.heads[l - 1]);
            let next = unsafe { RawFreePage::at(self.mapper, pa).take_next() };
            self.heads[l - 1] = next;
            return Some(pa);
        }

        if l == LEVELS {
            warn!("physical freelist exhausted at top level {LEVELS}");
            return None;
        }

        debug!("level-{l} freelist empty, borrowing from level-{}", l + 1);
        let parent = self.get(l + 1)?;
        self.split_into(parent, l);

        // The split pushed 512 pages onto level `l`; take one back off.
        let pa = PhysicalAddress::new(self.heads[l - 1]);
        let next = unsafe { RawFreePage::at(self.mapper, pa).take_next() };
        self.heads[l - 1] = next;
        Some(pa)
    }

    /// Allocate a 4 KiB page, halting (per component error taxonomy) on
    /// level-1 exhaustion — this is the fatal path every page-table and
    /// mapping allocation relies on.
    pub fn get_4k_or_halt(&mut self) -> PhysicalAddress {
        match self.get(1) {
            Some(pa) => pa,
            None => {
                error!("physical freelist exhausted at L=1: out of memory");
                panic!("physical freelist exhausted at L=1");
            }
        }
    }

    /// Split `parent` (a level-`l+1` page) into 512 level-`l` pages and
    /// push all of them onto the level-`l` list.
    fn split_into(&mut self, parent: PhysicalAddress, l: usize) {
        let child_size = level_size(l);
        let base = parent.as_u64();
        for i in 0..512u64 {
            let pa = PhysicalAddress::new(base + i * child_size);
            self.give(pa, l);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// A 4 KiB-aligned raw frame used to back the in-memory test harness.
    #[repr(align(4096))]
    struct Aligned4K(#[allow(dead_code)] [u8; 4096]);

    /// An in-memory identity-mapped "physical RAM" for testing. Big enough to
    /// back one level-2 (2 MiB) page as 512 contiguous 4 KiB frames.
    struct TestPhys {
        frames: Vec<Aligned4K>,
        base: u64,
    }

    impl TestPhys {
        fn with_frames(n: usize, base: u64) -> Self {
            let mut v = Vec::with_capacity(n);
            for _ in 0..n {
                v.push(Aligned4K([0u8; 4096]));
            }
            Self { frames: v, base }
        }
    }

    impl PhysMapper for TestPhys {
        unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
            let idx = ((pa.as_u64() - self.base) >> 12) as usize;
            unsafe { &mut *(&self.frames[idx] as *const Aligned4K as *mut T) }
        }
    }

    #[test]
    fn level2_splits_into_512_disjoint_level1_pages() {
        let base = 0x0020_0000u64; // 2 MiB, matches scenario S1 in the spec.
        let phys = TestPhys::with_frames(512, base);
        let mut fl = PhysFreeList::new(&phys);
        fl.give(PhysicalAddress::new(base), 2);

        let mut seen = HashSet::new();
        for _ in 0..512 {
            let pa = fl.get(1).expect("512 level-1 pages available after split");
            assert!(pa.is_aligned_to(level_size(1)));
            assert!(seen.insert(pa.as_u64()), "freelist returned the same page twice");
        }

        assert_eq!(fl.get(1), None, "513th get(1) must fail: freelist is exhausted");

        let mut sorted: Vec<u64> = seen.into_iter().collect();
        sorted.sort_unstable();
        assert_eq!(sorted.first().copied(), Some(base));
        assert_eq!(sorted.last().copied(), Some(base + 511 * 4096));
        assert_eq!(sorted.len(), 512);
    }

    #[test]
    fn give_then_get_round_trips_a_single_page() {
        let base = 0x0010_0000u64;
        let phys = TestPhys::with_frames(1, base);
        let mut fl = PhysFreeList::new(&phys);
        fl.give(PhysicalAddress::new(base), 1);
        assert_eq!(fl.get(1), Some(PhysicalAddress::new(base)));
        assert_eq!(fl.get(1), None);
    }

    #[test]
    #[should_panic(expected = "alignment_refused")]
    fn give_rejects_misaligned_page() {
        let phys = TestPhys::with_frames(1, 0);
        let mut fl = PhysFreeList::new(&phys);
        fl.give(PhysicalAddress::new(1), 1);
    }
}
