use crate::selftest::TestResult;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Diagnostics snapshot of the fan subsystem, published every control tick.
#[derive(Debug, Clone, Copy)]
pub struct FanSnapshot {
    pub timestamp_us: u64,
    pub rpm: u32,
    pub duty: u8,
    pub verdict: TestResult,
    pub tests_run: u64,
    pub tests_failed: u64,
    pub tests_skipped: u64,
}

impl Default for FanSnapshot {
    fn default() -> Self {
        Self {
            timestamp_us: 0,
            rpm: 0,
            duty: 0,
            verdict: TestResult::Skipped,
            tests_run: 0,
            tests_failed: 0,
            tests_skipped: 0,
        }
    }
}

/// Drive-level request coming in from the diagnostics surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct DutyCommand {
    pub timestamp_us: u64,
    pub duty: u8,
}

struct TripleBuffer<T: Copy + Default> {
    slots: [UnsafeCell<T>; 3],
    index: AtomicUsize,
}

unsafe impl<T: Copy + Default + Send> Send for TripleBuffer<T> {}
unsafe impl<T: Copy + Default + Sync> Sync for TripleBuffer<T> {}

impl<T: Copy + Default> TripleBuffer<T> {
    fn new() -> Self {
        let slots = std::array::from_fn(|_| UnsafeCell::new(T::default()));
        Self {
            slots,
            index: AtomicUsize::new(0),
        }
    }

    fn write(&self, value: T) {
        let current = self.index.load(Ordering::Relaxed);
        let next = (current + 1) % 3;
        unsafe {
            *self.slots[next].get() = value;
        }
        self.index.store(next, Ordering::Release);
    }

    fn read(&self) -> T {
        let idx = self.index.load(Ordering::Acquire);
        unsafe { *self.slots[idx].get() }
    }
}

/// Wait-free exchange between the control thread and the diagnostics side:
/// snapshots flow out, duty commands flow in. Either side always sees the
/// latest complete value and never blocks the other.
pub struct StatusExchange {
    status: TripleBuffer<FanSnapshot>,
    duty_command: TripleBuffer<DutyCommand>,
    max_command_age_us: u64,
}

impl StatusExchange {
    pub fn new(max_command_age_us: u64) -> Self {
        Self {
            status: TripleBuffer::new(),
            duty_command: TripleBuffer::new(),
            max_command_age_us,
        }
    }

    /// Called by the control thread every tick (non-blocking).
    pub fn publish_status(&self, snapshot: FanSnapshot) {
        self.status.write(snapshot);
    }

    /// Called by the diagnostics side.
    pub fn read_status(&self) -> FanSnapshot {
        self.status.read()
    }

    /// Called by the diagnostics side.
    pub fn submit_duty(&self, command: DutyCommand) {
        self.duty_command.write(command);
    }

    /// Called by the control thread; a command that was never submitted or
    /// has gone stale yields `None`.
    pub fn get_duty(&self, current_time_us: u64) -> Option<DutyCommand> {
        let command = self.duty_command.read();
        let age = current_time_us.saturating_sub(command.timestamp_us);
        if command.timestamp_us == 0 || age > self.max_command_age_us {
            None
        } else {
            Some(command)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_snapshot_wins() {
        let exchange = StatusExchange::new(1_000_000);
        for i in 1..=5u64 {
            exchange.publish_status(FanSnapshot {
                timestamp_us: i,
                rpm: i as u32 * 100,
                ..FanSnapshot::default()
            });
        }
        let seen = exchange.read_status();
        assert_eq!(seen.timestamp_us, 5);
        assert_eq!(seen.rpm, 500);
    }

    #[test]
    fn stale_duty_commands_are_dropped() {
        let exchange = StatusExchange::new(1_000_000);
        assert!(exchange.get_duty(10).is_none());

        exchange.submit_duty(DutyCommand {
            timestamp_us: 1_000,
            duty: 150,
        });
        assert_eq!(exchange.get_duty(500_000).map(|c| c.duty), Some(150));
        assert!(exchange.get_duty(2_001_001).is_none());
    }
}
