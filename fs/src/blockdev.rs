//! Block-device boundary of the buffer cache.
//!
//! The cache consumes a single synchronous transfer capability. The disk
//! driver registers itself here during bring-up; [`MemoryBlockDevice`] is a
//! RAM-backed implementation used as a ramdisk and by the test suites.

use core::sync::atomic::{AtomicU32, Ordering};

use slateos_lib::IrqMutex;
use spin::Once;

/// Size in bytes of one disk block.
pub const BLOCK_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockDeviceError {
    /// The block number lies outside the device.
    OutOfRange,
    /// The transfer failed.
    Io,
}

/// Synchronous block transfer. Implementations may suspend the caller
/// (interrupt-driven completion); the cache invokes them while holding only
/// the target slot's sleep lock, never a spinlock.
pub trait BlockDevice: Send + Sync {
    fn read_block(
        &self,
        dev: u32,
        blockno: u32,
        out: &mut [u8; BLOCK_SIZE],
    ) -> Result<(), BlockDeviceError>;

    fn write_block(
        &self,
        dev: u32,
        blockno: u32,
        data: &[u8; BLOCK_SIZE],
    ) -> Result<(), BlockDeviceError>;
}

static BLOCK_DEVICE: Once<&'static dyn BlockDevice> = Once::new();

/// Install the disk driver. A second registration is ignored.
pub fn blockdev_register(device: &'static dyn BlockDevice) {
    BLOCK_DEVICE.call_once(|| device);
}

pub fn blockdev_is_registered() -> bool {
    BLOCK_DEVICE.get().is_some()
}

/// The registered device. Using the cache without one is a boot-order bug.
pub(crate) fn device() -> &'static dyn BlockDevice {
    match BLOCK_DEVICE.get() {
        Some(device) => *device,
        None => panic!("blockdev: no block device registered"),
    }
}

/// Capacity of [`MemoryBlockDevice`].
pub const MEMORY_DEVICE_BLOCKS: usize = 128;

/// RAM-backed block device. Serves every `dev` number from the same backing
/// store (mirroring a single-disk machine) and counts transfers so tests
/// can observe cache behavior.
pub struct MemoryBlockDevice {
    blocks: IrqMutex<[[u8; BLOCK_SIZE]; MEMORY_DEVICE_BLOCKS]>,
    reads: AtomicU32,
    writes: AtomicU32,
}

impl MemoryBlockDevice {
    pub const fn new() -> Self {
        Self {
            blocks: IrqMutex::new([[0; BLOCK_SIZE]; MEMORY_DEVICE_BLOCKS]),
            reads: AtomicU32::new(0),
            writes: AtomicU32::new(0),
        }
    }

    pub fn read_count(&self) -> u32 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Overwrite a block's backing bytes directly, bypassing any cache.
    pub fn fill_block(&self, blockno: u32, byte: u8) {
        let mut blocks = self.blocks.lock();
        blocks[blockno as usize % MEMORY_DEVICE_BLOCKS].fill(byte);
    }

    /// Read one backing byte directly, bypassing any cache.
    pub fn block_byte(&self, blockno: u32, offset: usize) -> u8 {
        let blocks = self.blocks.lock();
        blocks[blockno as usize % MEMORY_DEVICE_BLOCKS][offset % BLOCK_SIZE]
    }
}

impl Default for MemoryBlockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockDevice for MemoryBlockDevice {
    fn read_block(
        &self,
        _dev: u32,
        blockno: u32,
        out: &mut [u8; BLOCK_SIZE],
    ) -> Result<(), BlockDeviceError> {
        if blockno as usize >= MEMORY_DEVICE_BLOCKS {
            return Err(BlockDeviceError::OutOfRange);
        }
        out.copy_from_slice(&self.blocks.lock()[blockno as usize]);
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_block(
        &self,
        _dev: u32,
        blockno: u32,
        data: &[u8; BLOCK_SIZE],
    ) -> Result<(), BlockDeviceError> {
        if blockno as usize >= MEMORY_DEVICE_BLOCKS {
            return Err(BlockDeviceError::OutOfRange);
        }
        self.blocks.lock()[blockno as usize].copy_from_slice(data);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
