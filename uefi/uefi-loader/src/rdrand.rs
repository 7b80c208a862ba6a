//! # RDRAND-backed random source (loader side)
//!
//! Mirrors `kernel::rdrand`'s wrapper and CPUID-gate-then-use pattern, but
//! is self-contained (the `kernel` crate is a binary, not a library, so this
//! loader cannot depend on it). Backs [`crate::kaslr::select_kaslr_base_hw`].

use kernel_alloc::vrange::RandomSource;

/// Number of retries before giving up on a single `rdrand` draw, per the
/// Intel SDM's guidance that `rdrand` may transiently fail under heavy
/// entropy-pool contention.
const MAX_RETRIES: u32 = 10;

/// `true` iff CPUID.01H:ECX.30 (`RDRAND`) is set.
#[inline]
#[allow(clippy::similar_names)]
fn has_rdrand() -> bool {
    let mut eax: u32 = 1;
    let mut ecx: u32 = 0;
    let (mut ebx, mut edx): (u32, u32);
    unsafe {
        core::arch::asm!(
            "push rbx",
            "cpuid",
            "mov {ebx_out:e}, ebx",
            "pop rbx",
            ebx_out = lateout(reg) ebx,
            inlateout("eax") eax,
            inlateout("ecx") ecx,
            lateout("edx") edx,
            options(nomem, preserves_flags),
        );
    }
    let _ = (eax, ebx, edx);
    (ecx & (1 << 30)) != 0
}

/// Issue one `rdrand` draw. Returns `None` if the CPU reported failure
/// (carry flag clear).
///
/// # Safety
/// The caller must have verified `rdrand` is supported before calling.
#[inline]
unsafe fn rdrand_u64_once() -> Option<u64> {
    let mut value: u64;
    let mut ok: u8;
    unsafe {
        core::arch::asm!(
            "rdrand {val}",
            "setc {ok}",
            val = out(reg) value,
            ok = out(reg_byte) ok,
            options(nomem, nostack),
        );
    }
    (ok != 0).then_some(value)
}

/// Draw one random `u64` via `rdrand`, asserting the instruction is
/// supported on this CPU (step 1's "asserts ... RDRAND (for KASLR)"
/// hardware prerequisite). Retries up to [`MAX_RETRIES`] times.
#[must_use]
pub fn rdrand_u64() -> Option<u64> {
    assert!(has_rdrand(), "RDRAND not supported on this CPU/VM");

    for _ in 0..MAX_RETRIES {
        if let Some(v) = unsafe { rdrand_u64_once() } {
            return Some(v);
        }
        core::hint::spin_loop();
    }
    None
}

/// [`RandomSource`] backed by the hardware `rdrand` instruction.
pub struct HardwareRng;

impl RandomSource for HardwareRng {
    fn next_u64(&mut self) -> u64 {
        rdrand_u64().unwrap_or_else(|| {
            panic!("RDRAND exhausted retries without producing a value");
        })
    }
}
