//! # ACPI System Description Table header and root-table enumeration
//!
//! Every ACPI table (RSDT, XSDT, MADT, FADT, ...) begins with the same
//! 36-byte [`SdtHeader`]. The RSDT/XSDT are themselves tables whose body is
//! a flat array of pointers to further SDTs — 4-byte physical addresses for
//! the RSDT, 8-byte for the XSDT (§4.8).

use crate::{PhysMapRo, sum};

/// Common header shared by every ACPI System Description Table.
#[derive(Clone, Copy)]
#[repr(C, packed)]
pub struct SdtHeader {
    pub signature: [u8; 4],
    pub length: u32,
    pub revision: u8,
    pub checksum: u8,
    pub oem_id: [u8; 6],
    pub oem_table_id: [u8; 8],
    pub oem_revision: u32,
    pub creator_id: u32,
    pub creator_revision: u32,
}

const _: () = assert!(core::mem::size_of::<SdtHeader>() == 36);

impl SdtHeader {
    #[must_use]
    pub const fn signature_str(&self) -> &str {
        match core::str::from_utf8(&self.signature) {
            Ok(s) => s,
            Err(_) => "????",
        }
    }
}

/// Which root table was located by the RSDP/XSDP.
#[derive(Clone, Copy)]
pub enum RootKind {
    /// RSDT: entries are 4-byte physical addresses.
    Rsdt,
    /// XSDT: entries are 8-byte physical addresses.
    Xsdt,
}

/// An enumerable RSDT or XSDT: the header plus the entry-pointer array that
/// follows it in physical memory.
pub struct RootTable<'m, M: PhysMapRo> {
    mapper: &'m M,
    addr: u64,
    kind: RootKind,
    entry_count: usize,
}

impl<'m, M: PhysMapRo> RootTable<'m, M> {
    /// Validate and wrap the root table at `addr`. Checksums the full table
    /// (covering header + entries) per §4.8.
    #[must_use]
    pub fn parse(mapper: &'m M, addr: u64, kind: RootKind) -> Option<Self> {
        if addr == 0 {
            return None;
        }
        unsafe {
            let header_bytes = mapper.map_ro(addr, size_of::<SdtHeader>());
            let header = &*header_bytes.as_ptr().cast::<SdtHeader>();
            let len = header.length as usize;
            if len < size_of::<SdtHeader>() {
                return None;
            }

            let full = mapper.map_ro(addr, len);
            if sum(full) != 0 {
                return None;
            }

            let entry_size = kind.entry_size();
            let entry_count = (len - size_of::<SdtHeader>()) / entry_size;

            Some(Self {
                mapper,
                addr,
                kind,
                entry_count,
            })
        }
    }

    #[must_use]
    pub const fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Physical address of the `i`-th SDT referenced by this root table.
    #[must_use]
    pub fn entry_addr(&self, i: usize) -> Option<u64> {
        if i >= self.entry_count {
            return None;
        }
        let entry_size = self.kind.entry_size();
        let offset = size_of::<SdtHeader>() + i * entry_size;
        unsafe {
            let bytes = self.mapper.map_ro(self.addr + offset as u64, entry_size);
            Some(match self.kind {
                RootKind::Rsdt => u64::from(u32::from_le_bytes(bytes[0..4].try_into().unwrap())),
                RootKind::Xsdt => u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            })
        }
    }

    /// Find the physical address of the first SDT whose signature matches
    /// `signature` (e.g. `b"APIC"` for the MADT).
    #[must_use]
    pub fn find(&self, signature: &[u8; 4]) -> Option<u64> {
        for i in 0..self.entry_count {
            let addr = self.entry_addr(i)?;
            unsafe {
                let bytes = self.mapper.map_ro(addr, size_of::<SdtHeader>());
                let header = &*bytes.as_ptr().cast::<SdtHeader>();
                if &header.signature == signature {
                    return Some(addr);
                }
            }
        }
        None
    }
}

impl RootKind {
    #[must_use]
    pub const fn entry_size(self) -> usize {
        match self {
            RootKind::Rsdt => 4,
            RootKind::Xsdt => 8,
        }
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

    fn header(signature: &[u8; 4], length: u32) -> [u8; 36] {
        let mut h = [0u8; 36];
        h[0..4].copy_from_slice(signature);
        h[4..8].copy_from_slice(&length.to_le_bytes());
        h
    }

    #[test]
    fn finds_madt_by_signature() {
        let mut buf = [0u8; 512];
        // RSDT header at 0, two 4-byte entries pointing to 100 and 200.
        let rsdt_len = 36 + 8;
        let h = header(b"RSDT", rsdt_len as u32);
        buf[0..36].copy_from_slice(&h);
        buf[36..40].copy_from_slice(&100u32.to_le_bytes());
        buf[40..44].copy_from_slice(&200u32.to_le_bytes());

        // checksum the RSDT
        let sum_before: u8 = buf[0..rsdt_len].iter().fold(0, |a, &b| a.wrapping_add(b));
        buf[9] = 0u8.wrapping_sub(sum_before.wrapping_sub(buf[9]));

        let fadt = header(b"FACP", 36);
        buf[100..136].copy_from_slice(&fadt);
        let madt = header(b"APIC", 36);
        buf[200..236].copy_from_slice(&madt);

        let mapper = Slice(&buf);
        let root = RootTable::parse(&mapper, 0, RootKind::Rsdt).expect("valid RSDT");
        assert_eq!(root.entry_count(), 2);
        assert_eq!(root.find(b"APIC"), Some(200));
        assert_eq!(root.find(b"FACP"), Some(100));
        assert_eq!(root.find(b"SSDT"), None);
    }
}
