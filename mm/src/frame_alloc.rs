//! Physical page frame allocator.
//!
//! Frames in the managed range live on a LIFO free list threaded through the
//! first word of each free frame. Alongside the list, a per-frame **share
//! count** tracks how many logical owners a frame has; copy-on-write fork
//! hands out additional references with [`page_frame_inc_share`] and the
//! fault path consults [`page_frame_share_count`]. A frame with share count
//! zero belongs to the free list; a frame with count `n >= 1` is owned by
//! `n` references and freeing it only returns it to the list once the last
//! reference is gone.
//!
//! Two locks, never nested: the free-list lock covers the list head, the
//! share lock covers the count table and the managed-range bounds. Neither
//! `alloc` nor `free` can suspend.

use slateos_abi::PhysAddr;
use slateos_lib::{IrqMutex, align_down_u64, align_up_u64, klog_info};

use crate::direct_map::PhysAddrDirectMap;
use crate::mm_constants::{MAX_PHYS_FRAMES, PAGE_SIZE_4KB};

/// Fill byte for freshly allocated frames, to expose use-before-init.
pub const FRESH_POISON: u8 = 0x05;
/// Fill byte for freed frames, to expose dangling reads.
pub const FREE_POISON: u8 = 0x01;

struct FreeList {
    /// Physical address of the first free frame; 0 when empty. The first
    /// word of each free frame stores the address of the next.
    head: u64,
    len: u64,
}

impl FreeList {
    const fn new() -> Self {
        Self { head: 0, len: 0 }
    }
}

struct ShareTable {
    /// Page-aligned bounds of the managed range; `start == end` until init.
    heap_start: u64,
    heap_end: u64,
    counts: [u32; MAX_PHYS_FRAMES],
}

impl ShareTable {
    const fn new() -> Self {
        Self {
            heap_start: 0,
            heap_end: 0,
            counts: [0; MAX_PHYS_FRAMES],
        }
    }

    /// Table index for `pa`. A misaligned or out-of-range frame is a fatal
    /// caller bug.
    fn index_of(&self, pa: PhysAddr) -> usize {
        let addr = pa.as_u64();
        if !pa.is_aligned(PAGE_SIZE_4KB) || addr < self.heap_start || addr >= self.heap_end {
            panic!("frame_alloc: invalid frame {:#x}", addr);
        }
        ((addr - self.heap_start) / PAGE_SIZE_4KB) as usize
    }

    fn total_frames(&self) -> u64 {
        (self.heap_end - self.heap_start) / PAGE_SIZE_4KB
    }
}

static FREE_LIST: IrqMutex<FreeList> = IrqMutex::new(FreeList::new());
static SHARE_TABLE: IrqMutex<ShareTable> = IrqMutex::new(ShareTable::new());
static FRAME_ALLOC_INIT: slateos_lib::InitFlag = slateos_lib::InitFlag::new();

fn fill_frame(pa: PhysAddr, byte: u8) {
    // SAFETY: the caller owns the frame exclusively and the direct map
    // covers every managed frame.
    unsafe {
        core::ptr::write_bytes(pa.to_virt().as_mut_ptr::<u8>(), byte, PAGE_SIZE_4KB as usize);
    }
}

/// Hand the range `[heap_start, heap_end)` to the allocator and free every
/// aligned frame in it. The direct map must already be initialized.
pub fn frame_alloc_init(heap_start: PhysAddr, heap_end: PhysAddr) {
    let start = align_up_u64(heap_start.as_u64(), PAGE_SIZE_4KB);
    let end = align_down_u64(heap_end.as_u64(), PAGE_SIZE_4KB);
    if start >= end {
        panic!("frame_alloc_init: empty range [{:#x}, {:#x})", start, end);
    }
    let frames = (end - start) / PAGE_SIZE_4KB;
    if frames > MAX_PHYS_FRAMES as u64 {
        panic!(
            "frame_alloc_init: range of {} frames exceeds table capacity {}",
            frames, MAX_PHYS_FRAMES
        );
    }
    if !FRAME_ALLOC_INIT.init_once() {
        panic!("frame_alloc_init: already initialized");
    }

    {
        let mut table = SHARE_TABLE.lock();
        table.heap_start = start;
        table.heap_end = end;
        table.counts.fill(0);
    }

    let mut pa = start;
    while pa < end {
        free_page_frame(PhysAddr::new(pa));
        pa += PAGE_SIZE_4KB;
    }

    klog_info!(
        "frame allocator ready: {} frames in [{:#x}, {:#x})",
        frames,
        start,
        end
    );
}

pub fn frame_alloc_is_initialized() -> bool {
    FRAME_ALLOC_INIT.is_set()
}

/// Allocate one page frame, or `None` when memory is exhausted. The frame
/// comes back with share count 1 and every byte set to [`FRESH_POISON`].
pub fn alloc_page_frame() -> Option<PhysAddr> {
    let pa = {
        let mut list = FREE_LIST.lock();
        if list.head == 0 {
            return None;
        }
        let pa = PhysAddr::new(list.head);
        // SAFETY: a listed frame's first word is the link to its successor,
        // and the list lock is held.
        let next = unsafe { pa.to_virt().as_ptr::<u64>().read() };
        list.head = next;
        list.len -= 1;
        pa
    };

    fill_frame(pa, FRESH_POISON);
    page_frame_set_share(pa, 1);
    Some(pa)
}

/// Allocate a zero-filled frame, for page tables and copy-on-write copies.
pub fn alloc_zeroed_page_frame() -> Option<PhysAddr> {
    let pa = alloc_page_frame()?;
    fill_frame(pa, 0);
    Some(pa)
}

/// Drop one reference to `pa`. While other references remain this only
/// decrements the share count; the terminal free poisons the frame with
/// [`FREE_POISON`] and pushes it back on the free list.
///
/// # Panics
///
/// Panics if `pa` is misaligned or outside the managed range.
pub fn free_page_frame(pa: PhysAddr) {
    {
        let mut table = SHARE_TABLE.lock();
        let idx = table.index_of(pa);
        if table.counts[idx] > 1 {
            table.counts[idx] -= 1;
            return;
        }
        table.counts[idx] = 0;
    }

    // Last reference gone: the frame is exclusively ours until it reappears
    // on the list. The first word becomes the intrusive link after the fill.
    fill_frame(pa, FREE_POISON);

    let mut list = FREE_LIST.lock();
    // SAFETY: the frame is off the list and unowned; the list lock is held.
    unsafe {
        pa.to_virt().as_mut_ptr::<u64>().write(list.head);
    }
    list.head = pa.as_u64();
    list.len += 1;
}

/// Current share count of `pa`.
pub fn page_frame_share_count(pa: PhysAddr) -> u32 {
    let table = SHARE_TABLE.lock();
    let idx = table.index_of(pa);
    table.counts[idx]
}

/// Add one owner to `pa` (fork sharing a COW frame).
pub fn page_frame_inc_share(pa: PhysAddr) {
    let mut table = SHARE_TABLE.lock();
    let idx = table.index_of(pa);
    table.counts[idx] = table.counts[idx].saturating_add(1);
}

/// Overwrite the share count of `pa`.
pub fn page_frame_set_share(pa: PhysAddr, count: u32) {
    let mut table = SHARE_TABLE.lock();
    let idx = table.index_of(pa);
    table.counts[idx] = count;
}

#[derive(Clone, Copy, Debug)]
pub struct FrameAllocStats {
    pub total_frames: u64,
    pub free_frames: u64,
}

pub fn frame_alloc_stats() -> FrameAllocStats {
    let total_frames = SHARE_TABLE.lock().total_frames();
    let free_frames = FREE_LIST.lock().len;
    FrameAllocStats {
        total_frames,
        free_frames,
    }
}
