//! Blocking mutex for long-held resources.
//!
//! A [`SleepLock`] suspends contending tasks instead of spinning, so it may
//! be held across device I/O. It must never be acquired while holding an
//! [`IrqMutex`]; the spinlock protecting the wait state is only taken for a
//! few instructions internally.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

use crate::spinlock::IrqMutex;
use crate::waitqueue::WaitQueue;

pub struct SleepLock<T> {
    locked: IrqMutex<bool>,
    waiters: WaitQueue,
    data: UnsafeCell<T>,
}

// SAFETY: the locked flag grants exclusive access to `data`; the flag itself
// is guarded by the IrqMutex.
unsafe impl<T: Send> Send for SleepLock<T> {}
unsafe impl<T: Send> Sync for SleepLock<T> {}

pub struct SleepLockGuard<'a, T> {
    lock: &'a SleepLock<T>,
}

impl<T> SleepLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            locked: IrqMutex::new(false),
            waiters: WaitQueue::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquire the lock, suspending the caller while another task holds it.
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            self.waiters.wait_event(|| !*self.locked.lock());
        }
    }

    /// Acquire the lock only if it is free.
    pub fn try_lock(&self) -> Option<SleepLockGuard<'_, T>> {
        let mut locked = self.locked.lock();
        if *locked {
            None
        } else {
            *locked = true;
            Some(SleepLockGuard { lock: self })
        }
    }

    /// Whether the lock is currently held by some task.
    pub fn is_locked(&self) -> bool {
        *self.locked.lock()
    }
}

impl<'a, T> Deref for SleepLockGuard<'a, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for SleepLockGuard<'a, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for SleepLockGuard<'a, T> {
    fn drop(&mut self) {
        // Publish the release before waking, so a waiter's re-check under
        // the wait-queue lock observes the free lock.
        *self.lock.locked.lock() = false;
        self.lock.waiters.wake_one();
    }
}
