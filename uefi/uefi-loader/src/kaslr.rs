//! # KASLR base selection
//!
//! Chooses the physical-memory virtual base (PMVB) the rest of the boot
//! pipeline and the kernel use to derive `PA -> VA` (`VA = PA + PMVB`).
//!
//! This is a standalone, pure function rather than something wired into
//! [`crate::vmem::create_kernel_pagetables`]: this workspace's kernel image
//! is built non-PIE (`KERNEL_BASE` is a fixed linker-script constant, see
//! `kernel_info::memory`) and its existing HHDM consumers assume the fixed
//! `HHDM_BASE`. Actually relocating the kernel at every boot would require
//! converting it to a position-independent image, which is out of scope
//! here. `select_kaslr_base` exists so the selection algorithm itself is
//! implemented and tested against spec faithfully (see `P6`/`S` properties),
//! and so a future PIE kernel can adopt it directly; today's boot path logs
//! the candidate and falls back to the fixed `HHDM_BASE` for the actual
//! mapping.

use crate::rdrand::HardwareRng;
use kernel_alloc::vrange::RandomSource;
use kernel_vmem::addresses::{VirtualAddress, canonicalize_sign_extend_47};

/// Minimum offset of the PMVB from the origin of its half of the canonical
/// address space. The later of the two bootstrap drafts this is ported from
/// raised this from 2 GiB to 8 GiB; see `SPEC_FULL.md`'s Open Questions.
pub const MIN_KASLR_OFFSET: u64 = 8 * 1024 * 1024 * 1024;

/// Alignment level the chosen base is rounded down to: L=2, i.e. 2 MiB
/// huge-page granularity.
pub const KASLR_ALIGN: u64 = 2 * 1024 * 1024;

/// Origin of the canonical half this workspace's KASLR candidates are drawn
/// from. spec.md says "the lower half"; this workspace instead uses the
/// *upper* canonical half (sign bit set), matching the existing fixed
/// `HHDM_BASE`/`KERNEL_BASE` placement — see `SPEC_FULL.md`'s Open
/// Questions for why the half, not the algorithm, differs.
pub const CANONICAL_HALF_ORIGIN: u64 = 0xFFFF_8000_0000_0000;

/// Highest value a candidate offset from [`CANONICAL_HALF_ORIGIN`] may take
/// before canonicalisation folds it back down: half the span of the upper
/// canonical half.
const HALF_SPAN: u64 = 0x0000_7FFF_FFFF_FFFF;

/// Select a KASLR base: a canonical VA, at least [`MIN_KASLR_OFFSET`] above
/// [`CANONICAL_HALF_ORIGIN`], aligned down to [`KASLR_ALIGN`].
///
/// Draws one `u64` from `rng`, reduces it modulo the available span so the
/// offset always lands within the upper canonical half, adds the minimum
/// offset, aligns down, then re-canonicalises (alignment can only move the
/// value down, so canonicality is preserved, but re-deriving here keeps the
/// invariant local and explicit per this crate's canonical-address policy).
#[must_use]
pub fn select_kaslr_base(rng: &mut impl RandomSource) -> VirtualAddress {
    let usable_span = HALF_SPAN - MIN_KASLR_OFFSET;
    let draw = rng.uniform_below(usable_span + 1);
    let raw = CANONICAL_HALF_ORIGIN
        .wrapping_add(MIN_KASLR_OFFSET)
        .wrapping_add(draw);
    let aligned = raw & !(KASLR_ALIGN - 1);
    VirtualAddress::new(canonicalize_sign_extend_47(aligned))
}

/// Select the KASLR base using the hardware RDRAND-backed entropy source,
/// asserting step 1's "supports RDRAND" hardware prerequisite.
#[must_use]
pub fn select_kaslr_base_hw() -> VirtualAddress {
    let mut rng = HardwareRng;
    select_kaslr_base(&mut rng)
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn base_is_canonical_and_above_minimum_offset() {
        for seed in [1u64, 0xdead_beef, 0xffff_ffff_ffff_ffff, 0, 12345] {
            let mut rng = TestRng(seed);
            let base = select_kaslr_base(&mut rng);
            let v = base.as_u64();
            assert_eq!(
                canonicalize_sign_extend_47(v),
                v,
                "base {v:#x} is not canonical (seed {seed:#x})"
            );
            assert!(
                v >= CANONICAL_HALF_ORIGIN + MIN_KASLR_OFFSET,
                "base {v:#x} below the 8 GiB floor (seed {seed:#x})"
            );
        }
    }

    #[test]
    fn base_is_aligned_to_kaslr_level() {
        let mut rng = TestRng(777);
        let base = select_kaslr_base(&mut rng);
        assert_eq!(base.as_u64() % KASLR_ALIGN, 0);
    }

    #[test]
    fn base_stays_within_the_upper_canonical_half() {
        // Every draw must keep bit 63 set (sign-extended upper half) and
        // never fold over into the lower half's range.
        for seed in 0..64u64 {
            let mut rng = TestRng(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1);
            let base = select_kaslr_base(&mut rng);
            assert!(base.as_u64() >= 0xFFFF_8000_0000_0000);
        }
    }

    #[test]
    fn different_seeds_can_produce_different_bases() {
        let mut a = TestRng(1);
        let mut b = TestRng(2);
        let base_a = select_kaslr_base(&mut a);
        let base_b = select_kaslr_base(&mut b);
        // Not a hard guarantee for arbitrary RNGs, but true for this PRNG
        // and these seeds; catches an accidental constant-return bug.
        assert_ne!(base_a.as_u64(), base_b.as_u64());
    }
}
