use crate::fault::{Fault, FaultSink};
use crate::hal::{Clock, FanIo, FanStats};
use crate::sampler::TachoSampler;
use crate::sync::FanSnapshot;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Outcome of one verification cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestResult {
    Ok,
    Failed,
    Skipped,
}

/// Timing rules of the measurement cycle.
#[derive(Debug, Clone)]
pub struct FanConfig {
    /// Fan feature flag; the hardware may be absent entirely.
    pub enabled: bool,
    /// Normal drive level restored after each measurement.
    pub drive_duty: u8,
    /// Priming time under which a cycle pads itself before measuring.
    pub prime_floor_ms: u64,
    /// Total priming time a padded cycle is brought up to.
    pub prime_total_ms: u64,
    /// Sleep between capture-state polls.
    pub poll_interval_ms: u64,
    /// Maximum number of polls before the cycle is forced to fail.
    pub poll_budget: u32,
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            drive_duty: 0,
            prime_floor_ms: 250,
            prime_total_ms: 300,
            poll_interval_ms: 1,
            poll_budget: 25,
        }
    }
}

/// Orchestrates one bounded verification cycle at a time: priming, arming,
/// the deadline-bounded wait, and the verdict. Re-entrant across calls;
/// every invocation starts a fresh cycle.
pub struct FanTest<IO: FanIo, C: Clock + Clone> {
    sampler: TachoSampler<IO, C>,
    clock: C,
    config: FanConfig,
    faults: Box<dyn FaultSink>,
    verdict: TestResult,
    cycle_started_us: u64,
    stats: FanStats,
}

impl<IO: FanIo, C: Clock + Clone> FanTest<IO, C> {
    pub fn new(io: IO, clock: C, config: FanConfig, faults: Box<dyn FaultSink>) -> Self {
        let sampler = TachoSampler::new(io, clock.clone(), config.drive_duty);
        Self {
            sampler,
            clock,
            config,
            faults,
            verdict: TestResult::Failed,
            cycle_started_us: 0,
            stats: FanStats::default(),
        }
    }

    /// One-time setup: checks that the sense line can deliver edge callbacks
    /// at all, then runs a first verification cycle. Returns whether it
    /// passed.
    pub fn init(&mut self) -> bool {
        if self.config.enabled && !self.sampler.supports_edge_interrupts() {
            warn!("fan sense line cannot deliver edge interrupts");
            self.verdict = TestResult::Failed;
            self.stats.tests_run += 1;
            self.stats.tests_failed += 1;
            self.raise_failure();
            return false;
        }
        self.run_cycle()
    }

    /// Start the full-power priming phase and stamp its beginning, so the
    /// spin-up overlaps whatever other initialization the caller still has
    /// to do before `run_cycle`.
    pub fn begin_cycle(&mut self) {
        if self.config.enabled {
            self.sampler.drive_full();
            self.cycle_started_us = self.clock.now_us();
        }
    }

    /// Run one bounded measurement cycle and return whether the verdict is
    /// non-failed; `Ok` and `Skipped` both count as success for the caller.
    pub fn run_cycle(&mut self) -> bool {
        self.stats.tests_run += 1;

        if !self.config.enabled {
            self.verdict = TestResult::Skipped;
            self.stats.tests_skipped += 1;
            return true;
        }

        // Pad the priming phase: the rotor must have been spinning up for at
        // least the floor before its edges are trusted.
        let elapsed_ms = self
            .clock
            .now_us()
            .saturating_sub(self.cycle_started_us)
            / 1_000;
        if elapsed_ms < self.config.prime_floor_ms {
            self.clock
                .sleep_ms(self.config.prime_total_ms - elapsed_ms);
        }

        self.sampler.arm();

        let budget_us =
            u64::from(self.config.poll_budget) * self.config.poll_interval_ms * 1_000;
        let deadline_us = self.clock.now_us() + budget_us;
        let finished = wait_until(
            &self.clock,
            deadline_us,
            self.config.poll_interval_ms,
            || self.sampler.is_finished(),
        );

        self.sampler.finalize();

        if finished {
            self.verdict = TestResult::Ok;
            debug!("fan rpm: {}", self.sampler.rpm());
        } else {
            self.verdict = TestResult::Failed;
            self.stats.tests_failed += 1;
            self.raise_failure();
        }

        self.verdict != TestResult::Failed
    }

    /// Periodic maintenance hook; nothing to do yet, present for interface
    /// symmetry with the other self-tested subsystems.
    pub fn tick(&mut self, _elapsed_us: u64) {}

    pub fn verdict(&self) -> TestResult {
        self.verdict
    }

    /// Last measured RPM; zero after a failed cycle.
    pub fn last_rpm(&self) -> u32 {
        self.sampler.rpm()
    }

    pub fn stats(&self) -> &FanStats {
        &self.stats
    }

    pub fn drive_duty(&self) -> u8 {
        self.sampler.drive_duty()
    }

    /// Update the configured drive level and push it to the output.
    pub fn set_drive_duty(&mut self, duty: u8) {
        self.sampler.set_drive_duty(duty);
        self.sampler.apply_drive();
    }

    pub fn snapshot(&self, timestamp_us: u64) -> FanSnapshot {
        FanSnapshot {
            timestamp_us,
            rpm: self.last_rpm(),
            duty: self.drive_duty(),
            verdict: self.verdict,
            tests_run: self.stats.tests_run,
            tests_failed: self.stats.tests_failed,
            tests_skipped: self.stats.tests_skipped,
        }
    }

    fn raise_failure(&self) {
        if let Err(e) = self.faults.raise(Fault::FanTestFailed) {
            warn!("failed to report fan fault: {}", e);
        }
    }
}

/// Deadline-bounded poll: checks `done`, then sleeps `interval_ms` between
/// further checks until it holds or the clock passes `deadline_us`.
fn wait_until<C: Clock>(
    clock: &C,
    deadline_us: u64,
    interval_ms: u64,
    mut done: impl FnMut() -> bool,
) -> bool {
    loop {
        if done() {
            return true;
        }
        if clock.now_us() >= deadline_us {
            return false;
        }
        clock.sleep_ms(interval_ms);
    }
}
