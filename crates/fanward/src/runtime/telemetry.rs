use core_rotor::{StatusExchange, TestResult};
use fanward_io::metrics::{
    init_metrics, serve_metrics, FAN_DUTY, FAN_RPM, TESTS_FAILED, TESTS_RUN, TESTS_SKIPPED,
    TEST_VERDICT,
};
use std::sync::{atomic::AtomicBool, Arc};
use std::thread;
use std::time::Duration;
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

pub fn start_metrics_updater(
    exchange: Arc<StatusExchange>,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut last_run = 0u64;
        let mut last_failed = 0u64;
        let mut last_skipped = 0u64;
        while !stop.load(std::sync::atomic::Ordering::Relaxed) {
            let snapshot = exchange.read_status();
            FAN_RPM.set(i64::from(snapshot.rpm));
            FAN_DUTY.set(i64::from(snapshot.duty));
            TEST_VERDICT.set(verdict_code(snapshot.verdict));
            if snapshot.tests_run > last_run {
                TESTS_RUN.inc_by(snapshot.tests_run - last_run);
                last_run = snapshot.tests_run;
            }
            if snapshot.tests_failed > last_failed {
                TESTS_FAILED.inc_by(snapshot.tests_failed - last_failed);
                last_failed = snapshot.tests_failed;
            }
            if snapshot.tests_skipped > last_skipped {
                TESTS_SKIPPED.inc_by(snapshot.tests_skipped - last_skipped);
                last_skipped = snapshot.tests_skipped;
            }

            thread::sleep(Duration::from_millis(200));
        }
    })
}

fn verdict_code(verdict: TestResult) -> f64 {
    match verdict {
        TestResult::Ok => 0.0,
        TestResult::Failed => 1.0,
        TestResult::Skipped => 2.0,
    }
}
