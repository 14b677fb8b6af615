//! Physical-to-virtual translation through the kernel's direct-map window.
//!
//! This module is the single source of truth for the window offset. Boot
//! code records the offset once (0 for an identity-mapped kernel window);
//! everything that touches frame contents goes through [`PhysAddrDirectMap`].

use core::sync::atomic::{AtomicU64, Ordering};

use slateos_abi::{PhysAddr, VirtAddr};
use slateos_lib::InitFlag;

static DIRECT_MAP_OFFSET: AtomicU64 = AtomicU64::new(0);
static DIRECT_MAP_INIT: InitFlag = InitFlag::new();

/// Record the direct-map offset. Called once during boot, before the frame
/// allocator is initialized.
pub fn init(offset: u64) {
    DIRECT_MAP_OFFSET.store(offset, Ordering::Release);
    if !DIRECT_MAP_INIT.init_once() {
        panic!("direct_map: init() called twice");
    }
}

#[inline]
pub fn is_available() -> bool {
    DIRECT_MAP_INIT.is_set()
}

#[inline]
pub fn offset() -> u64 {
    debug_assert!(is_available(), "direct map not initialized");
    DIRECT_MAP_OFFSET.load(Ordering::Acquire)
}

/// Extension trait adding direct-map translation to `PhysAddr`.
pub trait PhysAddrDirectMap {
    /// Translate through the direct map. Returns `VirtAddr::NULL` for the
    /// null physical address.
    ///
    /// # Panics
    ///
    /// Panics if the direct map has not been initialized.
    fn to_virt(self) -> VirtAddr;

    /// Translate through the direct map, or `None` before initialization.
    fn try_to_virt(self) -> Option<VirtAddr>;
}

impl PhysAddrDirectMap for PhysAddr {
    #[inline]
    fn to_virt(self) -> VirtAddr {
        match self.try_to_virt() {
            Some(virt) => virt,
            None => panic!("direct_map: translation before init"),
        }
    }

    #[inline]
    fn try_to_virt(self) -> Option<VirtAddr> {
        if !is_available() {
            return None;
        }
        if self.is_null() {
            return Some(VirtAddr::NULL);
        }
        Some(VirtAddr::new(
            self.as_u64()
                .wrapping_add(DIRECT_MAP_OFFSET.load(Ordering::Acquire)),
        ))
    }
}
