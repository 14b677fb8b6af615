//! Disk block buffer cache.
//!
//! A fixed pool of [`NBUF`] slots holds cached copies of disk blocks keyed
//! by `(dev, blockno)`. The pool is partitioned over [`NBUCKET`] hash
//! buckets, each a circular doubly-linked ring with its own spinlock, so
//! lookups on different buckets never contend. Ring position encodes
//! recency: the node after a bucket's sentinel is its MRU, the node before
//! it the LRU. A miss first recycles the least recently used idle slot of
//! the home bucket, then *steals* one from another bucket, migrating it.
//!
//! Interface:
//! * [`bread`] returns the block's slot with its sleep lock held and the
//!   contents valid.
//! * [`LockedBuf::write`] writes the slot back to the device.
//! * Dropping the [`LockedBuf`] (or calling [`LockedBuf::release`]) gives
//!   the slot up and marks it most recently used.
//! * [`LockedBuf::pin`] keeps the slot resident across release, for
//!   logged-update write-out.
//!
//! Locking discipline: a slot's identity and ring links may be touched only
//! under the lock of the bucket whose ring contains it (two bucket locks
//! during a steal migration, the origin held and the victim tried). The
//! payload and the valid flag belong to the sleep-lock holder. `refcnt` is
//! atomic; it is raised from zero only under the home bucket lock, and
//! `pin` can never raise it from zero because pinning requires the sleep
//! lock, which implies an outstanding reference. While `refcnt > 0` a slot
//! stays in bucket `blockno % NBUCKET`, so release always knows where to
//! relink. The cache allocates nothing: it must work before a heap exists.

use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::mem::ManuallyDrop;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use slateos_lib::sleeplock::{SleepLock, SleepLockGuard};
use slateos_lib::{InitFlag, IrqMutex, klog_info};

use crate::blockdev::{BLOCK_SIZE, BlockDeviceError, device};

/// Number of cache slots.
pub const NBUF: usize = 30;
/// Number of hash buckets. Prime, so bucket pressure stays even for the
/// strided block-number patterns file systems produce.
pub const NBUCKET: usize = 13;

/// Slots first, then one sentinel node per bucket.
const NNODE: usize = NBUF + NBUCKET;

/// Cached block payload. Aligned so callers can overlay word-sized records.
#[repr(C, align(8))]
pub struct BlockData {
    bytes: [u8; BLOCK_SIZE],
}

impl BlockData {
    const fn new() -> Self {
        Self {
            bytes: [0; BLOCK_SIZE],
        }
    }
}

struct RingNode {
    prev: u16,
    next: u16,
    dev: u32,
    blockno: u32,
}

/// Ring metadata for every slot and sentinel, guarded by the bucket locks.
struct RingTable(UnsafeCell<[RingNode; NNODE]>);

// SAFETY: every access goes through the bucket-lock discipline documented
// on the module.
unsafe impl Sync for RingTable {}

static RING: RingTable = RingTable(UnsafeCell::new(
    [const {
        RingNode {
            prev: 0,
            next: 0,
            dev: 0,
            blockno: 0,
        }
    }; NNODE],
));

static BUCKET_LOCKS: [IrqMutex<()>; NBUCKET] = [const { IrqMutex::new(()) }; NBUCKET];

struct BufSlot {
    refcnt: AtomicU32,
    valid: AtomicBool,
    data: SleepLock<BlockData>,
}

impl BufSlot {
    const fn new() -> Self {
        Self {
            refcnt: AtomicU32::new(0),
            valid: AtomicBool::new(false),
            data: SleepLock::new(BlockData::new()),
        }
    }
}

static SLOTS: [BufSlot; NBUF] = [const { BufSlot::new() }; NBUF];
static BCACHE_INIT: InitFlag = InitFlag::new();

#[inline]
fn node(i: usize) -> *mut RingNode {
    debug_assert!(i < NNODE);
    // In-bounds pointer into the static table; dereferencing is governed by
    // the bucket-lock discipline.
    unsafe { (RING.0.get() as *mut RingNode).add(i) }
}

#[inline]
fn sentinel(bucket: usize) -> usize {
    NBUF + bucket
}

#[inline]
fn bucket_of(blockno: u32) -> usize {
    blockno as usize % NBUCKET
}

/// Unlink node `i` from its ring.
///
/// # Safety
///
/// The caller holds the lock of the bucket containing `i`.
unsafe fn ring_unlink(i: usize) {
    let prev = (*node(i)).prev as usize;
    let next = (*node(i)).next as usize;
    (*node(prev)).next = next as u16;
    (*node(next)).prev = prev as u16;
}

/// Insert node `i` at the MRU position of `bucket`.
///
/// # Safety
///
/// The caller holds `bucket`'s lock and `i` is not linked anywhere.
unsafe fn ring_push_mru(bucket: usize, i: usize) {
    let s = sentinel(bucket);
    let first = (*node(s)).next as usize;
    (*node(i)).prev = s as u16;
    (*node(i)).next = first as u16;
    (*node(first)).prev = i as u16;
    (*node(s)).next = i as u16;
}

/// Scan `bucket`'s ring LRU-first for a slot with no outstanding references.
///
/// # Safety
///
/// The caller holds `bucket`'s lock.
unsafe fn scan_victim(bucket: usize) -> Option<usize> {
    let s = sentinel(bucket);
    let mut i = (*node(s)).prev as usize;
    while i != s {
        if SLOTS[i].refcnt.load(Ordering::Acquire) == 0 {
            return Some(i);
        }
        i = (*node(i)).prev as usize;
    }
    None
}

/// Rewrite a reclaimable slot's identity for a new block and take the first
/// reference.
///
/// # Safety
///
/// The caller holds the lock of the bucket containing `i` and observed
/// `refcnt == 0` under it.
unsafe fn claim_slot(i: usize, dev: u32, blockno: u32) {
    (*node(i)).dev = dev;
    (*node(i)).blockno = blockno;
    SLOTS[i].valid.store(false, Ordering::Release);
    SLOTS[i].refcnt.store(1, Ordering::Release);
}

/// Build the bucket rings: sentinels self-looped, every slot starting in
/// bucket 0. Runs once during bring-up, before other CPUs touch the cache.
pub fn bcache_init() {
    if !BCACHE_INIT.init_once() {
        panic!("bcache_init: already initialized");
    }
    // SAFETY: single-context init; the rings are not yet shared.
    unsafe {
        for b in 0..NBUCKET {
            let s = sentinel(b);
            (*node(s)).prev = s as u16;
            (*node(s)).next = s as u16;
        }
        for i in 0..NBUF {
            ring_push_mru(0, i);
        }
    }
    klog_info!("buffer cache ready: {} slots in {} buckets", NBUF, NBUCKET);
}

pub fn bcache_is_initialized() -> bool {
    BCACHE_INIT.is_set()
}

/// Find or allocate the slot caching `(dev, blockno)` and take a reference
/// on it. The caller acquires the sleep lock after this returns.
fn bget(dev: u32, blockno: u32) -> usize {
    if !BCACHE_INIT.is_set() {
        panic!("bcache: used before bcache_init");
    }
    let h = bucket_of(blockno);
    let home = BUCKET_LOCKS[h].lock();

    // SAFETY: ring and identity accesses below are covered by `home` (and,
    // in the steal sweep, by the victim bucket's tried lock).
    unsafe {
        // Already cached in its home bucket?
        let s = sentinel(h);
        let mut i = (*node(s)).next as usize;
        while i != s {
            if (*node(i)).dev == dev && (*node(i)).blockno == blockno {
                SLOTS[i].refcnt.fetch_add(1, Ordering::AcqRel);
                drop(home);
                return i;
            }
            i = (*node(i)).next as usize;
        }

        // Miss: recycle the home bucket's least recently used idle slot.
        if let Some(i) = scan_victim(h) {
            claim_slot(i, dev, blockno);
            drop(home);
            return i;
        }

        // Steal from another bucket. Victims are visited in ascending order
        // with try_lock, so this thread never waits on a second ring lock;
        // a sweep that skipped a contended bucket retries instead of
        // declaring the pool exhausted.
        loop {
            let mut contended = false;
            for b in 0..NBUCKET {
                if b == h {
                    continue;
                }
                let Some(victim_guard) = BUCKET_LOCKS[b].try_lock() else {
                    contended = true;
                    continue;
                };
                let stolen = scan_victim(b);
                if let Some(v) = stolen {
                    ring_unlink(v);
                    ring_push_mru(h, v);
                }
                drop(victim_guard);
                if stolen.is_some() {
                    // Re-scan from the LRU end. The home lock was held
                    // throughout, so the migrated slot (or another that
                    // went idle meanwhile) turns up here.
                    if let Some(i) = scan_victim(h) {
                        claim_slot(i, dev, blockno);
                        drop(home);
                        return i;
                    }
                }
            }
            if !contended {
                panic!("bcache: out of buffers for dev {} block {}", dev, blockno);
            }
            spin_loop();
        }
    }
}

/// Return a sleep-locked buffer whose contents are the named disk block,
/// reading it from the device if the cached copy is stale.
///
/// A device error is handed back unchanged; the slot is released first and
/// stays invalid.
pub fn bread(dev: u32, blockno: u32) -> Result<LockedBuf, BlockDeviceError> {
    let slot = bget(dev, blockno);
    let guard = SLOTS[slot].data.lock();
    let mut buf = LockedBuf {
        slot,
        dev,
        blockno,
        guard: ManuallyDrop::new(guard),
    };
    if !SLOTS[slot].valid.load(Ordering::Acquire) {
        device().read_block(dev, blockno, buf.data_mut())?;
        SLOTS[slot].valid.store(true, Ordering::Release);
    }
    Ok(buf)
}

/// An acquired cache slot. Holding one proves the slot's sleep lock is
/// held, so the payload accessors and [`write`](Self::write) need no
/// further checks. Dropping it releases the slot.
pub struct LockedBuf {
    slot: usize,
    dev: u32,
    blockno: u32,
    guard: ManuallyDrop<SleepLockGuard<'static, BlockData>>,
}

impl LockedBuf {
    pub fn dev(&self) -> u32 {
        self.dev
    }

    pub fn blockno(&self) -> u32 {
        self.blockno
    }

    pub fn data(&self) -> &[u8; BLOCK_SIZE] {
        &self.guard.bytes
    }

    pub fn data_mut(&mut self) -> &mut [u8; BLOCK_SIZE] {
        &mut self.guard.bytes
    }

    /// Write the buffer's contents back to the device. Issues exactly one
    /// device transfer.
    pub fn write(&mut self) -> Result<(), BlockDeviceError> {
        device().write_block(self.dev, self.blockno, &self.guard.bytes)
    }

    /// Take an extra reference that outlives the coming release, so the
    /// slot cannot be recycled until [`BufPin::unpin`]. Used by the logging
    /// layer between commit and write-out.
    pub fn pin(&self) -> BufPin {
        SLOTS[self.slot].refcnt.fetch_add(1, Ordering::AcqRel);
        BufPin { slot: self.slot }
    }

    /// Give the buffer up. Equivalent to dropping it; provided for call
    /// sites where the release is the point.
    pub fn release(self) {}
}

impl Drop for LockedBuf {
    fn drop(&mut self) {
        // The sleep lock goes first, the reference after: a slot observed
        // with refcnt == 0 therefore always has a free sleep lock.
        // SAFETY: the guard is dropped exactly once, here.
        unsafe { ManuallyDrop::drop(&mut self.guard) };

        let h = bucket_of(self.blockno);
        let _bucket = BUCKET_LOCKS[h].lock();
        if SLOTS[self.slot].refcnt.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Last reference gone: this slot is now the bucket's most
            // recently used reclaimable.
            // SAFETY: bucket lock held; while refcnt was > 0 the slot
            // stayed in its home bucket.
            unsafe {
                ring_unlink(self.slot);
                ring_push_mru(h, self.slot);
            }
        }
    }
}

/// An out-of-band reference holding a slot resident. Dropping (or
/// [`unpin`](Self::unpin)-ing) it makes the slot reclaimable again; the
/// slot keeps its ring position either way.
pub struct BufPin {
    slot: usize,
}

impl BufPin {
    pub fn unpin(self) {}
}

impl Drop for BufPin {
    fn drop(&mut self) {
        SLOTS[self.slot].refcnt.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Walk every bucket ring under its lock, checking that the links are
/// consistent from both directions and that the slots partition exactly
/// across the buckets. Debug and test aid; not part of the hot path.
pub fn bcache_audit_rings() -> bool {
    let mut slots_seen = 0usize;
    for b in 0..NBUCKET {
        let _guard = BUCKET_LOCKS[b].lock();
        let s = sentinel(b);
        // SAFETY: bucket lock held for this ring.
        unsafe {
            let mut i = (*node(s)).next as usize;
            let mut hops = 0;
            while i != s {
                let next = (*node(i)).next as usize;
                let prev = (*node(i)).prev as usize;
                if (*node(next)).prev as usize != i || (*node(prev)).next as usize != i {
                    return false;
                }
                if i >= NBUF {
                    // A foreign sentinel inside this ring.
                    return false;
                }
                slots_seen += 1;
                hops += 1;
                if hops > NNODE {
                    return false;
                }
                i = next;
            }
        }
    }
    slots_seen == NBUF
}
