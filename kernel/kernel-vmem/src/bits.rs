use crate::page_table::pd::{Pde, Pde2M};
use crate::page_table::pdpt::{Pdpte, Pdpte1G};
use crate::page_table::pml4::Pml4Entry;
use crate::page_table::pt::PtEntry4k;
use utils_accessors_derive::Setters;

/// Unified, ergonomic view over x86-64 paging entries (all levels / forms).
///
/// This type deliberately does **not** use bit-packing. Instead, it models the
/// *semantic superset* of fields across:
///
/// - L4: [`Pml4Entry`] (non-leaf only)
/// - L3: [`Pdpte`] (non-leaf) / [`Pdpte1G`] (1 GiB leaf)
/// - L2: [`Pde`] (non-leaf) / [`Pde2M`]  (2 MiB leaf)
/// - L1: [`PtEntry4k`]  (4 KiB leaf)
///
/// Use the provided `from_*` and `to_*` helpers to map between this view and
/// the actual bitfield entries. Alignment and level-specific constraints are
/// validated in `to_*` conversions (debug assertions).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Setters)]
#[allow(clippy::struct_excessive_bools)]
pub struct VirtualMemoryPageBits {
    /// **Present** (P): valid entry if `true`.
    pub present: bool,

    /// **Writable** (RW): allows writes if `true`.
    pub writable: bool,

    /// **User/Supervisor** (US): user-mode access if `true`.
    pub user: bool,

    /// **Page Write-Through** (PWT): write-through policy (PAT bit0).
    pub write_through: bool,

    /// **Page Cache Disable** (PCD): disable caching (PAT bit1).
    pub cache_disable: bool,

    /// **Accessed** (A): set by CPU on first access. Not a permission bit.
    pub accessed: bool,

    /// **Dirty** (D): set by CPU on first write.
    ///
    /// Meaningful for **leaf** entries only. Ignored in non-leaf mappings.
    pub dirty: bool,

    /// **Global** (G): TLB not flushed on CR3 reload (leaf only).
    pub global: bool,

    /// **Execute Disable** / NX: disallow instruction fetch if `true`.
    ///
    /// Requires `EFER.NXE` support. Applies across the walk (permission
    /// intersection).
    pub no_execute: bool,

    /// **Protection key** (PKU) or OS-use (bits 59..62).
    ///
    /// Only meaningful if PKU is supported; otherwise free for OS use.
    /// Value is masked to 4 bits on `to_*`.
    pub protection_key: u8,

    /// **OS-available (low)**: bits 9..11 (masked to 3 bits in `to_*`).
    pub os_available_low: u8,

    /// **OS-available (high)**: bits 52..58 (masked to 7 bits in `to_*`).
    pub os_available_high: u8,

    /// PAT selector **bit #2**:
    ///
    /// - **4 KiB leaf**: this is PTE bit7 (PAT small).
    /// - **2 MiB leaf**: this is PDE bit12 (PAT large).
    /// - **1 GiB leaf**: this is PDPTE bit12 (PAT large).
    /// - **Non-leaf**: **ignored** and forced to `false` in `to_*`.
    ///
    /// Combined with `write_through`(bit3) and `cache_disable`(bit4) to form the
    /// 3-bit PAT index: `[pat_bit2 : PCD : PWT]`.
    pub pat_bit2: bool,
}

impl VirtualMemoryPageBits {
    /// Enable write-combining (WC) via PAT registers.
    #[inline]
    #[must_use]
    pub const fn with_write_combining(self) -> Self {
        self.with_write_through(false)
            .with_cache_disable(true)
            .with_pat_bit2(true)
    }

    /// Populate from an L4 [`Pml4Entry`] (non-leaf).
    #[must_use]
    pub const fn from_pml4e(e: &Pml4Entry) -> Self {
        Self {
            present: e.present(),
            writable: e.writable(),
            user: e.user(),
            write_through: e.write_through(),
            cache_disable: e.cache_disable(),
            accessed: e.accessed(),
            dirty: false,  // ignored at non-leaf
            global: false, // ignored at non-leaf
            no_execute: e.no_execute(),
            protection_key: e.protection_key(),
            os_available_low: e.os_available_low() & 0b111,
            os_available_high: e.os_available_high() & 0x7F,
            pat_bit2: false, // not applicable for non-leaf
        }
    }

    /// Populate from an L3 [`Pdpte`] (non-leaf).
    #[must_use]
    pub const fn from_pdpte(e: &Pdpte) -> Self {
        Self {
            present: e.present(),
            writable: e.writable(),
            user: e.user(),
            write_through: e.write_through(),
            cache_disable: e.cache_disable(),
            accessed: e.accessed(),
            dirty: false,
            global: false,
            no_execute: e.no_execute(),
            protection_key: e.protection_key(),
            os_available_low: e.os_available_low() & 0b111,
            os_available_high: e.os_available_high() & 0x7F,
            pat_bit2: false,
        }
    }

    /// Populate from an L3 [`Pdpte1G`] (1 GiB leaf).
    #[must_use]
    pub const fn from_pdpte_1g(e: &Pdpte1G) -> Self {
        Self {
            present: e.present(),
            writable: e.writable(),
            user: e.user(),
            write_through: e.write_through(),
            cache_disable: e.cache_disable(),
            accessed: e.accessed(),
            dirty: e.dirty(),
            global: e.global(),
            no_execute: e.no_execute(),
            protection_key: e.protection_key(),
            os_available_low: e.os_available_low() & 0b111,
            os_available_high: e.os_available_high() & 0x7F,
            pat_bit2: e.pat_large(),
        }
    }

    /// Populate from an L2 [`Pde`] (non-leaf).
    #[must_use]
    pub const fn from_pde(e: &Pde) -> Self {
        Self {
            present: e.present(),
            writable: e.writable(),
            user: e.user(),
            write_through: e.write_through(),
            cache_disable: e.cache_disable(),
            accessed: e.accessed(),
            dirty: false,
            global: false,
            no_execute: e.no_execute(),
            protection_key: e.protection_key(),
            os_available_low: e.os_available_low() & 0b111,
            os_available_high: e.os_available_high() & 0x7F,
            pat_bit2: false,
        }
    }

    /// Populate from an L2 [`Pde2M`] (2 MiB leaf).
    #[must_use]
    pub const fn from_pde_2m(e: &Pde2M) -> Self {
        Self {
            present: e.present(),
            writable: e.writable(),
            user: e.user(),
            write_through: e.write_through(),
            cache_disable: e.cache_disable(),
            accessed: e.accessed(),
            dirty: e.dirty(),
            global: e.global(),
            no_execute: e.no_execute(),
            protection_key: e.protection_key(),
            os_available_low: e.os_available_low() & 0b111,
            os_available_high: e.os_available_high() & 0x7F,
            pat_bit2: e.pat_large(),
        }
    }

    /// Populate from an L1 [`PtEntry4k`] (4 KiB leaf).
    #[must_use]
    pub const fn from_pte_4k(e: &PtEntry4k) -> Self {
        Self {
            present: e.present(),
            writable: e.writable(),
            user: e.user(),
            write_through: e.write_through(),
            cache_disable: e.cache_disable(),
            accessed: e.accessed(),
            dirty: e.dirty(),
            global: e.global(),
            no_execute: e.no_execute(),
            protection_key: e.protection_key(),
            os_available_low: e.os_available_low() & 0b111,
            os_available_high: e.os_available_high() & 0x7F,
            pat_bit2: e.pat_small(),
        }
    }
}

impl VirtualMemoryPageBits {
    /// Encode the permission/flag bits into a non-leaf [`Pml4Entry`].
    ///
    /// The physical address of the next-level table is set separately via
    /// [`Pml4Entry::with_physical_address`]; `dirty`, `global`, `pat_bit2` are
    /// not representable at this level and are dropped.
    #[must_use]
    pub const fn to_pml4e(&self) -> Pml4Entry {
        Pml4Entry::new()
            .with_present(self.present)
            .with_writable(self.writable)
            .with_user(self.user)
            .with_write_through(self.write_through)
            .with_cache_disable(self.cache_disable)
            .with_accessed(self.accessed)
            .with_no_execute(self.no_execute)
            .with_os_available_low(self.os_available_low & 0b111)
            .with_os_available_high(self.os_available_high & 0x7F)
            .with_protection_key(self.protection_key & 0x0F)
    }

    /// Encode the permission/flag bits into a non-leaf [`Pdpte`].
    #[must_use]
    pub const fn to_pdpte(&self) -> Pdpte {
        Pdpte::new()
            .with_present(self.present)
            .with_writable(self.writable)
            .with_user(self.user)
            .with_write_through(self.write_through)
            .with_cache_disable(self.cache_disable)
            .with_accessed(self.accessed)
            .with_no_execute(self.no_execute)
            .with_os_available_low(self.os_available_low & 0b111)
            .with_os_available_high(self.os_available_high & 0x7F)
            .with_protection_key(self.protection_key & 0x0F)
    }

    /// Encode the permission/flag bits into a 1 GiB leaf [`Pdpte1G`].
    #[must_use]
    pub const fn to_pdpte_1g(&self) -> Pdpte1G {
        Pdpte1G::new()
            .with_present(self.present)
            .with_writable(self.writable)
            .with_user(self.user)
            .with_write_through(self.write_through)
            .with_cache_disable(self.cache_disable)
            .with_accessed(self.accessed)
            .with_dirty(self.dirty)
            .with_global(self.global)
            .with_no_execute(self.no_execute)
            .with_os_available_low(self.os_available_low & 0b111)
            .with_os_available_high(self.os_available_high & 0x7F)
            .with_protection_key(self.protection_key & 0x0F)
            .with_pat_large(self.pat_bit2)
    }

    /// Encode the permission/flag bits into a non-leaf [`Pde`].
    #[must_use]
    pub const fn to_pde(&self) -> Pde {
        Pde::new()
            .with_present(self.present)
            .with_writable(self.writable)
            .with_user(self.user)
            .with_write_through(self.write_through)
            .with_cache_disable(self.cache_disable)
            .with_accessed(self.accessed)
            .with_no_execute(self.no_execute)
            .with_os_available_low(self.os_available_low & 0b111)
            .with_os_available_high(self.os_available_high & 0x7F)
            .with_protection_key(self.protection_key & 0x0F)
    }

    /// Encode the permission/flag bits into a 2 MiB leaf [`Pde2M`].
    #[must_use]
    pub const fn to_pde_2m(&self) -> Pde2M {
        Pde2M::new()
            .with_present(self.present)
            .with_writable(self.writable)
            .with_user(self.user)
            .with_write_through(self.write_through)
            .with_cache_disable(self.cache_disable)
            .with_accessed(self.accessed)
            .with_dirty(self.dirty)
            .with_global(self.global)
            .with_no_execute(self.no_execute)
            .with_os_available_low(self.os_available_low & 0b111)
            .with_os_available_high(self.os_available_high & 0x7F)
            .with_protection_key(self.protection_key & 0x0F)
            .with_pat_large(self.pat_bit2)
    }

    /// Encode the permission/flag bits into a 4 KiB leaf [`PtEntry4k`].
    #[must_use]
    pub const fn to_pte_4k(&self) -> PtEntry4k {
        PtEntry4k::new()
            .with_present(self.present)
            .with_writable(self.writable)
            .with_user(self.user)
            .with_write_through(self.write_through)
            .with_cache_disable(self.cache_disable)
            .with_accessed(self.accessed)
            .with_dirty(self.dirty)
            .with_global(self.global)
            .with_no_execute(self.no_execute)
            .with_os_available_low(self.os_available_low & 0b111)
            .with_os_available_high(self.os_available_high & 0x7F)
            .with_protection_key(self.protection_key & 0x0F)
            .with_pat_small(self.pat_bit2)
    }

    /// Compose the permission bits of a parent table entry from its two children,
    /// per the composition rule: writable is the OR of children's needs, NX is
    /// the AND of children's needs (the parent must be at least as permissive as
    /// the more permissive child, and only forbids execution if every child does).
    #[must_use]
    pub const fn compose(a: Self, b: Self) -> Self {
        Self {
            present: true,
            writable: a.writable || b.writable,
            user: a.user || b.user,
            write_through: a.write_through && b.write_through,
            cache_disable: a.cache_disable && b.cache_disable,
            accessed: false,
            dirty: false,
            global: false,
            no_execute: a.no_execute && b.no_execute,
            protection_key: 0,
            os_available_low: 0,
            os_available_high: 0,
            pat_bit2: false,
        }
    }
}

impl From<Pml4Entry> for VirtualMemoryPageBits {
    #[inline]
    fn from(e: Pml4Entry) -> Self {
        Self::from_pml4e(&e)
    }
}

impl From<Pdpte> for VirtualMemoryPageBits {
    #[inline]
    fn from(e: Pdpte) -> Self {
        Self::from_pdpte(&e)
    }
}

impl From<Pdpte1G> for VirtualMemoryPageBits {
    #[inline]
    fn from(e: Pdpte1G) -> Self {
        Self::from_pdpte_1g(&e)
    }
}

impl From<Pde> for VirtualMemoryPageBits {
    #[inline]
    fn from(e: Pde) -> Self {
        Self::from_pde(&e)
    }
}

impl From<Pde2M> for VirtualMemoryPageBits {
    #[inline]
    fn from(e: Pde2M) -> Self {
        Self::from_pde_2m(&e)
    }
}

impl From<PtEntry4k> for VirtualMemoryPageBits {
    #[inline]
    fn from(e: PtEntry4k) -> Self {
        Self::from_pte_4k(&e)
    }
}
