//! Wait queue for blocking and waking kernel tasks.
//!
//! Tasks call [`WaitQueue::wait_event`] to sleep until a condition holds;
//! producers call [`WaitQueue::wake_one`] / [`WaitQueue::wake_all`] after
//! changing the condition. Scheduler integration goes through the
//! late-bound hooks in [`crate::kernel_services`]; before a runtime is
//! registered, waiters spin on the condition, which keeps the primitive
//! usable during early boot.
//!
//! Lost-wakeup safety has two parts. The condition is re-checked under the
//! queue lock before enqueuing, so a waker that published the condition
//! before calling `wake_one` is always observed. The window between enqueue
//! and `block_current_task` is closed by the runtime contract: unblocking a
//! task that has not blocked yet must make its next block return
//! immediately.

use core::hint::spin_loop;

use crate::kernel_services::{TaskHandle, task_runtime};
use crate::spinlock::IrqMutex;

/// Maximum number of tasks that can wait on a single queue.
const WAITQUEUE_CAPACITY: usize = 32;

const NULL_HANDLE: TaskHandle = core::ptr::null_mut();

struct WaitQueueInner {
    /// Waiting task handles; null entries are free slots.
    waiters: [TaskHandle; WAITQUEUE_CAPACITY],
    count: usize,
}

// SAFETY: the handles are opaque scheduler-owned pointers, and all access is
// serialized through the IrqMutex.
unsafe impl Send for WaitQueueInner {}

impl WaitQueueInner {
    const fn new() -> Self {
        Self {
            waiters: [NULL_HANDLE; WAITQUEUE_CAPACITY],
            count: 0,
        }
    }

    fn enqueue(&mut self, task: TaskHandle) -> bool {
        for slot in self.waiters.iter_mut() {
            if slot.is_null() {
                *slot = task;
                self.count += 1;
                return true;
            }
        }
        false
    }

    fn dequeue_one(&mut self) -> Option<TaskHandle> {
        for slot in self.waiters.iter_mut() {
            if !slot.is_null() {
                let task = *slot;
                *slot = NULL_HANDLE;
                self.count -= 1;
                return Some(task);
            }
        }
        None
    }
}

pub struct WaitQueue {
    inner: IrqMutex<WaitQueueInner>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            inner: IrqMutex::new(WaitQueueInner::new()),
        }
    }

    /// Block the current task until `condition()` returns true.
    ///
    /// Without a registered task runtime this degenerates to a polite spin
    /// loop. A full queue also falls back to spinning rather than failing.
    pub fn wait_event<F: Fn() -> bool>(&self, condition: F) {
        loop {
            if condition() {
                return;
            }

            let Some(runtime) = task_runtime() else {
                spin_loop();
                continue;
            };
            let task = (runtime.current_task)();
            if task.is_null() {
                spin_loop();
                continue;
            }

            {
                let mut inner = self.inner.lock();
                // Re-check under the lock: a waker publishes the condition
                // before taking this lock in wake_one.
                if condition() {
                    return;
                }
                if !inner.enqueue(task) {
                    drop(inner);
                    spin_loop();
                    continue;
                }
            }

            (runtime.block_current_task)();
            // Woken (or spuriously); loop re-checks the condition.
        }
    }

    /// Wake one waiting task. Returns true if a task was woken.
    pub fn wake_one(&self) -> bool {
        let task = self.inner.lock().dequeue_one();
        match (task, task_runtime()) {
            (Some(task), Some(runtime)) => {
                let _ = (runtime.unblock_task)(task);
                true
            }
            _ => false,
        }
    }

    /// Wake every waiting task. Returns the number woken.
    pub fn wake_all(&self) -> usize {
        let mut woken = 0;
        while self.wake_one() {
            woken += 1;
        }
        woken
    }

    pub fn has_waiters(&self) -> bool {
        self.inner.lock().count > 0
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}
