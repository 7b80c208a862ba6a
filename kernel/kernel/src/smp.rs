//! # SMP bring-up via the Local APIC (§4.7)
//!
//! Brings up application processors (APs) discovered in the MADT. The BSP
//! is assumed to report APIC ID 0, and the IDs to boot form a contiguous
//! range starting at 1 (§4.7's "assume the BSP reports APIC ID 0 ..."). Each
//! CPU boots only its own two children in a binary tree (`id*2+1`,
//! `id*2+2`), so the whole fleet wakes in `O(log n)` IPI rounds instead of
//! the BSP serially waking every AP.
//!
//! The 16-bit real-mode boot stub itself (`ap_boot_start`/`ap_boot_end`) is
//! an assembly trampoline outside this crate's scope (§1: "assembly
//! trampolines are referenced as interface contracts only"); this module
//! only relocates its bytes to physical page 0 and maps that page
//! executable in the trampoline's own page-table snapshot.

use crate::apic::Lapic;
use kernel_acpi::madt::ShouldBootSet;
use kernel_vmem::addresses::{PhysicalAddress, Size4K, VirtualAddress};
use kernel_vmem::{AddressSpace, PhysFrameAlloc, PhysMapper, VirtualMemoryPageBits};
use log::info;

/// Physical page the 16-bit AP boot stub is relocated to. Must be `< 0x1000`
/// in size so it fits entirely within page 0, reachable by real-mode `CS:IP`
/// immediately after INIT+SIPI.
pub const TRAMPOLINE_CODE_PA: u64 = 0x0000;

/// Physical page holding the page-table snapshot the APs initially load
/// into CR3 while running the trampoline.
pub const TRAMPOLINE_CR3_PA: u64 = 0x1000;

unsafe extern "C" {
    /// Start of the relocatable 16-bit AP boot stub (assembly, external).
    static ap_boot_start: u8;
    /// End of the relocatable 16-bit AP boot stub (assembly, external).
    static ap_boot_end: u8;
}

/// INIT IPI vector, sent first per §4.7.
const INIT_IPI: u32 = 0x0000_0500;
/// STARTUP (SIPI) IPI vector, sent after INIT. Bits `[7:0]` encode the start
/// page (`TRAMPOLINE_CODE_PA >> 12`), here `0x00`.
const STARTUP_IPI: u32 = 0x0000_0600;

/// Copy the relocatable AP boot stub into physical page 0.
///
/// # Safety
/// `mapper` must provide a writable mapping of `TRAMPOLINE_CODE_PA`; no
/// other CPU may be executing out of page 0 concurrently.
pub unsafe fn relocate_trampoline(mapper: &impl PhysMapper) {
    let start = &raw const ap_boot_start as usize;
    let end = &raw const ap_boot_end as usize;
    let len = end - start;
    assert!(len < 0x1000, "AP boot stub must fit in one page, got {len} bytes");

    info!("SMP: relocating {len} bytes of AP boot stub to physical page 0");
    let dst = unsafe { mapper.phys_to_mut::<[u8; 0x1000]>(PhysicalAddress::new(TRAMPOLINE_CODE_PA)) };
    let src = unsafe { core::slice::from_raw_parts(start as *const u8, len) };
    dst[..len].copy_from_slice(src);
}

/// Copy the BSP's current top-level page table into physical page 1, to
/// serve as the APs' initial CR3 (§4.7).
///
/// # Safety
/// `mapper` must provide readable access to `current_cr3` and writable
/// access to `TRAMPOLINE_CR3_PA`, and both must be exactly one 4 KiB page.
pub unsafe fn snapshot_page_table(mapper: &impl PhysMapper, current_cr3: PhysicalAddress) {
    info!("SMP: snapshotting page table {current_cr3:?} to physical page 1 for AP bring-up");
    let src = unsafe { mapper.phys_to_mut::<[u8; 4096]>(current_cr3) };
    let src_copy = *src;
    let dst = unsafe { mapper.phys_to_mut::<[u8; 4096]>(PhysicalAddress::new(TRAMPOLINE_CR3_PA)) };
    *dst = src_copy;
}

/// Identity-map physical page 0 read-execute-global inside the trampoline's
/// own page table (rooted at `TRAMPOLINE_CR3_PA`), so the relocated stub is
/// executable the instant an AP loads that CR3.
///
/// # Safety
/// `mapper`/`alloc` must operate on the same physical memory the trampoline
/// page table (physical page 1) was snapshotted into.
pub unsafe fn map_trampoline_identity<M: PhysMapper>(mapper: &M, alloc: &mut impl PhysFrameAlloc) {
    let root = PhysicalAddress::new(TRAMPOLINE_CR3_PA).page::<Size4K>();
    let aspace = AddressSpace::from_root(mapper, root);

    let nonleaf = VirtualMemoryPageBits {
        present: true,
        writable: true,
        ..VirtualMemoryPageBits::default()
    };
    let leaf = VirtualMemoryPageBits {
        present: true,
        writable: false,
        global: true,
        no_execute: false,
        ..VirtualMemoryPageBits::default()
    };

    aspace
        .map_one::<_, Size4K>(
            alloc,
            VirtualAddress::new(TRAMPOLINE_CODE_PA),
            PhysicalAddress::new(TRAMPOLINE_CODE_PA),
            nonleaf,
            leaf,
        )
        .expect("map trampoline page 0 identity RX");
}

/// The two IDs this CPU is responsible for waking, per the binary boot tree.
#[must_use]
pub const fn children_of(apic_id: u32) -> (u32, u32) {
    (apic_id * 2 + 1, apic_id * 2 + 2)
}

/// Send INIT followed by STARTUP to `apic_id`, waking it out of the
/// halted state into the trampoline (§4.7).
///
/// # Safety
/// Must run on the BSP (or an already-booted AP acting as its parent in the
/// boot tree) with a correctly enabled [`Lapic`]; `apic_id` must currently
/// be halted and waiting for IPI.
pub unsafe fn send_init_sipi(lapic: &Lapic, apic_id: u32) {
    info!("SMP: waking AP {apic_id} (INIT, then SIPI)");
    unsafe {
        lapic.send_ipi(apic_id, INIT_IPI);
        lapic.send_ipi(apic_id, STARTUP_IPI);
    }
}

/// Boot this CPU's two children in the boot tree, skipping any id the MADT
/// walk did not mark as should-boot (§4.7/S6).
///
/// # Safety
/// See [`send_init_sipi`].
pub unsafe fn boot_children(lapic: &Lapic, should_boot: &ShouldBootSet, self_apic_id: u32) {
    let (a, b) = children_of(self_apic_id);
    for child in [a, b] {
        if child <= u32::from(u8::MAX) && should_boot.contains(child as u8) {
            unsafe { send_init_sipi(lapic, child) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_tree_matches_scenario_s6_shape() {
        assert_eq!(children_of(0), (1, 2));
        assert_eq!(children_of(1), (3, 4));
        assert_eq!(children_of(2), (5, 6));
    }

    #[test]
    fn should_boot_set_gates_which_children_are_woken() {
        let mut set = ShouldBootSet::new();
        set.set(1);
        set.set(2);
        set.set(3);
        set.set(4);
        // id 5 intentionally absent, per S6.
        assert!(set.contains(1) && set.contains(4));
        assert!(!set.contains(5));
        assert!(!set.contains(0));
    }
}
