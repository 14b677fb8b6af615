#![no_std]
#![allow(unsafe_op_in_unsafe_fn)]

pub mod alignment;
pub mod cpu;
pub mod init_flag;
pub mod kernel_services;
pub mod klog;
pub mod ports;
pub mod sleeplock;
pub mod spinlock;
pub mod testing;
pub mod waitqueue;

pub mod tsc {
    /// Read the CPU timestamp counter.
    #[inline(always)]
    pub fn rdtsc() -> u64 {
        // SAFETY: RDTSC has no memory effects and is always executable in
        // ring 0.
        unsafe { core::arch::x86_64::_rdtsc() }
    }
}

#[doc(hidden)]
pub use paste;

pub use alignment::{align_down_u64, align_down_usize, align_up_u64, align_up_usize};
pub use init_flag::InitFlag;
pub use kernel_services::{TaskHandle, TaskRuntime, task_runtime, task_runtime_register};
pub use klog::{KlogLevel, klog_get_level, klog_register_backend, klog_set_level};
pub use ports::COM1;
pub use sleeplock::{SleepLock, SleepLockGuard};
pub use spinlock::{IrqMutex, IrqMutexGuard};
pub use waitqueue::WaitQueue;
