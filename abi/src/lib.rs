//! Value types shared across the slateos kernel crates.
//!
//! Everything here is a plain `#[repr(transparent)]` wrapper so the types can
//! cross subsystem boundaries (and, later, the kernel/userland boundary)
//! without conversion.

#![no_std]
#![forbid(unsafe_code)]

pub mod addr;

/// Standard 4 KiB page size.
pub const PAGE_SIZE: u64 = 0x1000;

pub use addr::{PhysAddr, VirtAddr};
