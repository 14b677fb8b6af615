#![no_std]
#![allow(unsafe_op_in_unsafe_fn)]

pub mod bcache;
pub mod blockdev;
pub mod tests;

pub use bcache::{BufPin, LockedBuf, NBUCKET, NBUF, bcache_audit_rings, bcache_init, bread};
pub use blockdev::{
    BLOCK_SIZE, BlockDevice, BlockDeviceError, MemoryBlockDevice, blockdev_is_registered,
    blockdev_register,
};
