//! Late-bound hooks into the scheduler.
//!
//! The resource-manager core must be able to block and wake tasks without
//! depending on the scheduler crate, which links against it. The kernel
//! registers its task hooks here during bring-up; until that happens,
//! blocking primitives fall back to spinning so the core works during early
//! boot and in single-context test runs.
//!
//! # Runtime contract
//!
//! `unblock_task` on a task that has been dequeued from a wait queue but has
//! not yet reached `block_current_task` must make that pending block return
//! immediately (the scheduler keeps a pending-wakeup flag per task).
//! Wait-queue correctness relies on this to close the enqueue-to-block
//! window.

use core::ffi::c_void;

use spin::Once;

/// Opaque scheduler task handle.
pub type TaskHandle = *mut c_void;

/// Scheduler entry points the blocking primitives call through.
#[derive(Clone, Copy)]
pub struct TaskRuntime {
    pub current_task: fn() -> TaskHandle,
    pub block_current_task: fn(),
    pub unblock_task: fn(TaskHandle) -> i32,
}

static TASK_RUNTIME: Once<TaskRuntime> = Once::new();

/// Install the scheduler's task hooks. A second registration is ignored.
pub fn task_runtime_register(runtime: TaskRuntime) {
    TASK_RUNTIME.call_once(|| runtime);
}

/// The registered hooks, or `None` before the scheduler is up.
#[inline]
pub fn task_runtime() -> Option<&'static TaskRuntime> {
    TASK_RUNTIME.get()
}
