//! # MADT (Multiple APIC Description Table) parsing
//!
//! Walks the variable-length entry stream that follows the fixed MADT header
//! and builds the "should boot" set of local-APIC IDs per §4.7: a type-0
//! (Local APIC) entry contributes its APIC ID iff `flags & 1` (enabled) or
//! `flags & 2` (online-capable), excluding the BSP's own APIC ID (it is
//! already running and is never IPI-booted). Types 1 (I/O APIC) and 2
//! (interrupt source override) are walked but otherwise ignored, matching
//! the scope of this bring-up sequence.

use crate::PhysMapRo;

/// APIC ID of the bootstrap processor: already running by the time this set
/// is built, so it is excluded regardless of its MADT flags.
const BSP_APIC_ID: u8 = 0;

/// Fixed portion of the MADT, following the common [`crate::sdt::SdtHeader`].
#[derive(Clone, Copy)]
#[repr(C, packed)]
struct MadtHeader {
    sdt: crate::sdt::SdtHeader,
    local_apic_addr: u32,
    flags: u32,
}

const _: () = assert!(core::mem::size_of::<MadtHeader>() == 0x2C);

/// A 256-bit set of APIC IDs, one bit per possible ID.
#[derive(Clone, Copy, Default, Eq, PartialEq)]
pub struct ShouldBootSet {
    words: [u64; 4],
}

impl ShouldBootSet {
    #[must_use]
    pub const fn new() -> Self {
        Self { words: [0; 4] }
    }

    pub const fn set(&mut self, id: u8) {
        let idx = (id >> 6) as usize;
        let bit = id & 0x3F;
        self.words[idx] |= 1u64 << bit;
    }

    #[must_use]
    pub const fn contains(&self, id: u8) -> bool {
        let idx = (id >> 6) as usize;
        let bit = id & 0x3F;
        (self.words[idx] >> bit) & 1 != 0
    }

    /// Iterate the set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0u16..256).filter_map(|id| {
            let id = id as u8;
            self.contains(id).then_some(id)
        })
    }
}

/// A parsed MADT, ready to be walked for Local-APIC entries.
pub struct Madt<'m, M: PhysMapRo> {
    mapper: &'m M,
    addr: u64,
    length: usize,
}

impl<'m, M: PhysMapRo> Madt<'m, M> {
    /// Wrap the MADT at `addr`. Does not re-checksum: the caller is expected
    /// to have located `addr` via a checksummed [`crate::sdt::RootTable`].
    #[must_use]
    pub fn at(mapper: &'m M, addr: u64) -> Option<Self> {
        if addr == 0 {
            return None;
        }
        let length = unsafe {
            let bytes = mapper.map_ro(addr, size_of::<MadtHeader>());
            let header = &*bytes.as_ptr().cast::<MadtHeader>();
            if &header.sdt.signature != b"APIC" {
                return None;
            }
            header.sdt.length as usize
        };
        Some(Self { mapper, addr, length })
    }

    /// Physical address of the Local APIC MMIO registers, used only when
    /// x2APIC is unavailable and the LAPIC must be mapped via MMIO.
    #[must_use]
    pub fn local_apic_phys_addr(&self) -> u32 {
        unsafe {
            let bytes = self.mapper.map_ro(self.addr, size_of::<MadtHeader>());
            (&*bytes.as_ptr().cast::<MadtHeader>()).local_apic_addr
        }
    }

    /// Walk the entry stream and build the should-boot bitset (S6).
    #[must_use]
    pub fn should_boot_set(&self) -> ShouldBootSet {
        let mut set = ShouldBootSet::new();
        let header_len = size_of::<MadtHeader>();
        let mut offset = header_len;

        while offset + 2 <= self.length {
            let entry = unsafe { self.mapper.map_ro(self.addr + offset as u64, 2) };
            let entry_type = entry[0];
            let entry_len = entry[1] as usize;
            if entry_len < 2 || offset + entry_len > self.length {
                break;
            }

            if entry_type == 0 {
                let body = unsafe { self.mapper.map_ro(self.addr + offset as u64, entry_len) };
                if entry_len >= 8 {
                    let apic_id = body[3];
                    let flags = u32::from_le_bytes(body[4..8].try_into().unwrap());
                    if apic_id != BSP_APIC_ID && (flags & 1 != 0 || flags & 2 != 0) {
                        set.set(apic_id);
                    }
                }
            }
            // Types 1 (I/O APIC) and 2 (interrupt source override) are
            // walked (to keep `offset` advancing correctly) but otherwise
            // ignored, per §4.7/§4.8.

            offset += entry_len;
        }

        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slice<'a>(&'a [u8]);
    impl PhysMapRo for Slice<'_> {
        unsafe fn map_ro<'a>(&self, paddr: u64, len: usize) -> &'a [u8] {
            let start = paddr as usize;
            unsafe { core::slice::from_raw_parts(self.0[start..start + len].as_ptr(), len) }
        }
    }

    fn local_apic_entry(buf: &mut [u8], offset: usize, apic_id: u8, flags: u32) -> usize {
        buf[offset] = 0; // type 0: local APIC
        buf[offset + 1] = 8; // length
        buf[offset + 3] = apic_id;
        buf[offset + 4..offset + 8].copy_from_slice(&flags.to_le_bytes());
        8
    }

    #[test]
    fn should_boot_matches_scenario_s6() {
        let mut buf = [0u8; 512];
        buf[0..4].copy_from_slice(b"APIC");

        let mut offset = 0x2C;
        for id in 0u8..5 {
            offset += local_apic_entry(&mut buf, offset, id, 1);
        }
        offset += local_apic_entry(&mut buf, offset, 5, 0);

        let length = offset as u32;
        buf[4..8].copy_from_slice(&length.to_le_bytes());

        let mapper = Slice(&buf);
        let madt = Madt::at(&mapper, 0).expect("valid MADT");
        let set = madt.should_boot_set();

        for id in 1u8..=4 {
            assert!(set.contains(id), "id {id} should be in the should-boot set");
        }
        assert!(!set.contains(0), "BSP (id 0) is not booted via IPI");
        assert!(!set.contains(5), "disabled, non-online-capable entry must be excluded");

        let collected: std::vec::Vec<u8> = set.iter().collect();
        assert_eq!(collected, std::vec![1, 2, 3, 4]);
    }
}
