//! # RDRAND-backed random source
//!
//! Thin wrapper around the `rdrand` instruction, gated behind the same
//! CPUID-feature-check-then-use pattern this crate already uses for x2APIC
//! (see [`crate::apic::enable_and_read_id_x2apic`]). Backs KASLR base
//! selection and the virtual-range randomiser's uniform placement draws.

use crate::cpuid::Leaf01h;
use kernel_alloc::vrange::RandomSource;

/// Number of retries before giving up on a single `rdrand` draw, per the
/// Intel SDM's guidance that `rdrand` may transiently fail under heavy
/// entropy-pool contention.
const MAX_RETRIES: u32 = 10;

/// Issue one `rdrand` draw. Returns `None` if the CPU reported failure
/// (carry flag clear) after `MAX_RETRIES` attempts.
///
/// # Safety
/// The caller must have verified `rdrand` is supported (CPUID.01H:ECX.30)
/// before calling; executing the instruction on unsupported hardware is
/// undefined (in practice `#UD`).
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
/// supported on this CPU. Retries up to [`MAX_RETRIES`] times before giving
/// up and returning `None`.
#[must_use]
pub fn rdrand_u64() -> Option<u64> {
    let has_rdrand = unsafe { Leaf01h::new().has_rdrand() };
    assert!(has_rdrand, "RDRAND not supported on this CPU/VM");

    for _ in 0..MAX_RETRIES {
        if let Some(v) = unsafe { rdrand_u64_once() } {
            return Some(v);
        }
        core::hint::spin_loop();
    }
    None
}

/// [`RandomSource`] backed by the hardware `rdrand` instruction.
///
/// Boot aborts (per the component's "hardware prerequisites missing" error
/// class) rather than silently degrading to a weaker source, because KASLR
/// and the range randomiser both depend on this entropy being genuinely
/// unpredictable.
pub struct HardwareRng;

impl RandomSource for HardwareRng {
    fn next_u64(&mut self) -> u64 {
        rdrand_u64().unwrap_or_else(|| {
            panic!("RDRAND exhausted retries without producing a value");
        })
    }
}
