//! Self-bootstrapping environment for the mm test suites.
//!
//! When the kernel booted normally the allocator is already initialized and
//! [`ensure_frame_alloc`] is a no-op. During bare bring-up (or a minimal
//! test boot) it stands up an identity direct map over a static heap so the
//! suites can run against real allocator state.

use core::cell::UnsafeCell;
use core::hint::spin_loop;

use slateos_abi::PhysAddr;
use slateos_lib::InitFlag;

use crate::direct_map;
use crate::frame_alloc::{frame_alloc_init, frame_alloc_is_initialized};
use crate::mm_constants::PAGE_SIZE_4KB;

const TEST_HEAP_FRAMES: usize = 64;
const TEST_HEAP_BYTES: usize = TEST_HEAP_FRAMES * PAGE_SIZE_4KB as usize;

#[repr(C, align(4096))]
struct TestHeap(UnsafeCell<[u8; TEST_HEAP_BYTES]>);

// SAFETY: the buffer is only ever accessed through the frame allocator,
// which hands out each frame to at most one owner at a time.
unsafe impl Sync for TestHeap {}

static TEST_HEAP: TestHeap = TestHeap(UnsafeCell::new([0; TEST_HEAP_BYTES]));
static FIXTURE_CLAIM: InitFlag = InitFlag::new();

/// Make sure some frame allocator is up before a suite touches it.
pub fn ensure_frame_alloc() {
    if frame_alloc_is_initialized() {
        return;
    }
    if FIXTURE_CLAIM.init_once() {
        if !direct_map::is_available() {
            direct_map::init(0);
        }
        let base = TEST_HEAP.0.get() as usize as u64;
        frame_alloc_init(PhysAddr::new(base), PhysAddr::new(base + TEST_HEAP_BYTES as u64));
    } else {
        while !frame_alloc_is_initialized() {
            spin_loop();
        }
    }
}
