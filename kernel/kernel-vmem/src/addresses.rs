//! # Virtual and Physical Memory Addresses
//!
//! Re-exports the strongly-typed address primitives from
//! [`kernel_memory_addresses`] under this crate's conventional path, so that
//! page-table and address-space code can refer to `crate::addresses::*`
//! regardless of which crate ultimately owns the representation.

pub use kernel_memory_addresses::{
    MemoryAddress, MemoryAddressOffset, MemoryPage, PageSize, PhysicalAddress, PhysicalPage,
    Size1G, Size2M, Size4K, VirtualAddress, VirtualPage, canonicalize_sign_extend_47,
};
