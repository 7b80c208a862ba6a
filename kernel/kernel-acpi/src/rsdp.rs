//! # RSDP/XSDP (Root/Extended System Description Pointer)
//!
//! Locates and validates the firmware-provided root pointer per
//! §4.8: signature `"RSD PTR "`, zero-sum byte checksum over the first
//! 20 bytes (ACPI 1.0) or the full `length` bytes (ACPI 2.0+), and
//! revision-gated extraction of the RSDT (4-byte entries) or XSDT
//! (8-byte entries) address.

use crate::{PhysMapRo, sum};

/// The validated result of parsing an RSDP/XSDP: the physical addresses of
/// whichever root table(s) the revision provides.
pub struct AcpiRoots {
    pub rsdp_addr: u64,
    pub xsdt_addr: Option<u64>,
    pub rsdt_addr: Option<u64>,
}

/// ACPI 1.0 Root System Description Pointer (RSDP)
#[derive(Clone)]
#[repr(C, packed)]
struct Rsdp {
    pub(crate) signature: [u8; 8], // "RSD PTR "
    checksum: u8,                  // sum of first 20 bytes == 0
    oem_id: [u8; 6],
    pub(crate) revision: u8, // 0 for ACPI 1.0
    pub(crate) rsdt_addr: u32,
}

/// ACPI 2.0 Extended System Description Pointer (XSDP)
#[derive(Clone)]
#[repr(C, packed)]
struct Xsdp {
    signature: [u8; 8], // "RSD PTR "
    checksum: u8,       // sum of first 20 bytes == 0
    oem_id: [u8; 6],
    revision: u8, // 2 for ACPI 2.0
    _deprecated: u32,
    pub(crate) length: u32,
    pub(crate) xsdt_addr: u64,
    ext_checksum: u8, // checksum of entire table
    reserved: [u8; 3],
}

impl AcpiRoots {
    /// Validate the RSDP/XSDP from the physical address.
    ///
    /// # Safety
    /// This function validates that the provided address is non-zero (i.e., not `null`).
    /// It validates the supported ACPI 1.0/2.0 variants by revision and checksum/extended checksum.
    #[must_use]
    #[allow(clippy::similar_names)]
    pub unsafe fn parse(map: &impl PhysMapRo, rsdp_addr: u64) -> Option<Self> {
        if rsdp_addr == 0 {
            return None;
        }

        unsafe {
            let v1 = map.map_ro(rsdp_addr, size_of::<Rsdp>());
            if &v1[0..8] != b"RSD PTR " {
                return None;
            }
            if sum(&v1[0..20]) != 0 {
                return None;
            }

            let v1p = &*v1.as_ptr().cast::<Rsdp>();
            let rsdt_addr = Some(u64::from(v1p.rsdt_addr));

            if v1p.revision >= 2 {
                // Need full v2 to read length + xsdt
                let min_v2 = core::mem::size_of::<Xsdp>();
                let v2 = map.map_ro(rsdp_addr, min_v2);
                let v2p = &*v2.as_ptr().cast::<Xsdp>();
                let len = v2p.length as usize;
                let full = map.map_ro(rsdp_addr, len);
                if sum(full) != 0 {
                    return None;
                }
                return Some(Self {
                    rsdp_addr,
                    xsdt_addr: Some(v2p.xsdt_addr),
                    rsdt_addr,
                });
            }

            Some(Self {
                rsdp_addr,
                xsdt_addr: None,
                rsdt_addr,
            })
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

    fn checksummed(mut bytes: [u8; 20]) -> [u8; 20] {
        bytes[8] = 0;
        let sum: u8 = bytes.iter().fold(0u8, |a, &b| a.wrapping_add(b));
        bytes[8] = 0u8.wrapping_sub(sum);
        bytes
    }

    #[test]
    fn rejects_bad_signature() {
        let buf = [0u8; 64];
        let mapper = Slice(&buf);
        assert!(unsafe { AcpiRoots::parse(&mapper, 0) }.is_none());
    }

    #[test]
    fn parses_acpi_1_rsdp() {
        let mut bytes = [0u8; 20];
        bytes[0..8].copy_from_slice(b"RSD PTR ");
        bytes[15] = 0; // revision 0
        bytes[16..20].copy_from_slice(&0x0009_0000u32.to_le_bytes());
        let bytes = checksummed(bytes);

        let mut buf = [0u8; 64];
        buf[0..20].copy_from_slice(&bytes);
        let mapper = Slice(&buf);

        let roots = unsafe { AcpiRoots::parse(&mapper, 0) }.expect("valid v1 RSDP");
        assert_eq!(roots.rsdt_addr, Some(0x0009_0000));
        assert!(roots.xsdt_addr.is_none());
    }
}
