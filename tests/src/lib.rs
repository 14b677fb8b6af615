//! Suite registry and aggregate runner for the in-kernel test suites.
//!
//! The kernel's test boot path calls [`register_system_suites`] once and
//! then [`run_all_suites`], typically gated behind a `run_tests` cmdline
//! flag. Suites are the `define_test_suite!` descriptors exported by the
//! crates under test.

#![no_std]

use slateos_lib::testing::{HARNESS_MAX_SUITES, TestRunSummary, TestSuiteDesc, TestSuiteResult};
use slateos_lib::{IrqMutex, klog_info};

struct Registry {
    suites: [Option<&'static TestSuiteDesc>; HARNESS_MAX_SUITES],
    count: usize,
}

static REGISTRY: IrqMutex<Registry> = IrqMutex::new(Registry {
    suites: [None; HARNESS_MAX_SUITES],
    count: 0,
});

/// Register one suite. Re-registering the same descriptor is a no-op;
/// returns false when the table is full or the descriptor has no runner.
pub fn register_suite(desc: &'static TestSuiteDesc) -> bool {
    if desc.run.is_none() {
        return false;
    }
    let mut registry = REGISTRY.lock();
    for existing in registry.suites.iter().flatten() {
        if core::ptr::eq(*existing, desc) {
            return true;
        }
    }
    if registry.count >= HARNESS_MAX_SUITES {
        return false;
    }
    let count = registry.count;
    registry.suites[count] = Some(desc);
    registry.count += 1;
    true
}

/// Register every suite the system crates define.
pub fn register_system_suites() {
    register_suite(&slateos_mm::tests::FRAME_ALLOC_SUITE_DESC);
    register_suite(&slateos_fs::tests::BCACHE_SUITE_DESC);
}

/// Run every registered suite and log a summary.
pub fn run_all_suites() -> TestRunSummary {
    let (suites, count) = {
        let registry = REGISTRY.lock();
        (registry.suites, registry.count)
    };

    let mut summary = TestRunSummary::empty();
    let start = slateos_lib::tsc::rdtsc();

    for desc in suites.iter().take(count).flatten() {
        let Some(run) = desc.run else { continue };
        let mut result = TestSuiteResult::empty();
        let _ = run(&mut result);
        klog_info!(
            "suite {}: {}/{} passed ({} ms)",
            result.name,
            result.passed,
            result.total,
            result.elapsed_ms
        );
        summary.suites[summary.suite_count] = result;
        summary.suite_count += 1;
        summary.total_tests += result.total;
        summary.passed += result.passed;
        summary.failed += result.failed;
    }

    summary.elapsed_ms =
        slateos_lib::testing::measure_elapsed_ms(start, slateos_lib::tsc::rdtsc());

    if summary.all_passed() {
        klog_info!(
            "all {} tests passed across {} suites",
            summary.total_tests,
            summary.suite_count
        );
    } else {
        klog_info!(
            "{} of {} tests FAILED",
            summary.failed,
            summary.total_tests
        );
    }
    summary
}
