use crate::klog_info;
use crate::testing::TestResult;

/// Run one test function, logging its outcome.
pub fn run_single_test<F: FnOnce() -> TestResult>(name: &str, test: F) -> TestResult {
    let result = test();
    match result {
        TestResult::Pass => {}
        TestResult::Skipped => klog_info!("TEST {}: skipped", name),
        TestResult::Fail => klog_info!("TEST {}: FAILED", name),
        TestResult::Panic => klog_info!("TEST {}: PANICKED", name),
    }
    result
}
