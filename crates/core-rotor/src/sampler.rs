use crate::capture::RpmCapture;
use crate::hal::{Clock, FanIo};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Duty level used while priming and measuring.
pub const DUTY_FULL: u8 = 255;

/// Settle delay after forcing full drive, before the sense line is trusted.
const SETTLE_MS: u64 = 2;

/// Owns one measurement cycle: arms the shared capture state machine behind
/// an edge callback, then finalizes the captured stamps into an RPM sample.
///
/// The capture object is the only state shared with the callback context.
/// The sampler touches it only while the handler is detached.
pub struct TachoSampler<IO: FanIo, C: Clock> {
    io: IO,
    clock: C,
    capture: Arc<RpmCapture>,
    drive_duty: Arc<AtomicU8>,
    rpm: u32,
    finalized: bool,
}

impl<IO: FanIo, C: Clock> TachoSampler<IO, C> {
    pub fn new(io: IO, clock: C, drive_duty: u8) -> Self {
        Self {
            io,
            clock,
            capture: Arc::new(RpmCapture::new()),
            drive_duty: Arc::new(AtomicU8::new(drive_duty)),
            rpm: 0,
            finalized: true,
        }
    }

    /// Arm a new capture: rewind the state machine, force full drive for the
    /// settle window, then attach the edge handler. Blocks for the settle
    /// delay; edges occurring inside it are discarded by construction.
    pub fn arm(&mut self) {
        debug_assert!(self.finalized, "armed while a capture is in progress");

        self.capture.reset();
        self.finalized = false;

        self.io.write_drive(DUTY_FULL);
        self.clock.sleep_ms(SETTLE_MS);

        let capture = Arc::clone(&self.capture);
        self.io
            .attach_sense_handler(Box::new(move |high, now_us| capture.on_edge(high, now_us)));
    }

    /// Detach the handler, restore the configured drive level, and turn the
    /// captured stamps into an RPM sample (zero if the cycle did not
    /// complete both captures). Runs at most once per armed cycle; later
    /// calls are no-ops.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        self.io.detach_sense_handler();
        self.io.write_drive(self.drive_duty.load(Ordering::Relaxed));

        if self.capture.is_finished() {
            let (t1, t2) = self.capture.stamps();
            self.rpm = compute_rpm(t1, t2);
        } else {
            self.capture.force_finished();
            self.rpm = 0;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.capture.is_finished()
    }

    /// Last RPM sample. Meaningful only when the preceding cycle completed
    /// both captures.
    pub fn rpm(&self) -> u32 {
        self.rpm
    }

    pub fn drive_duty(&self) -> u8 {
        self.drive_duty.load(Ordering::Relaxed)
    }

    /// Update the configured drive level. An atomic store, so it is
    /// well-defined against a `finalize` restoring drive concurrently; it
    /// takes effect on the output at the next restore or `apply_drive`.
    pub fn set_drive_duty(&self, duty: u8) {
        self.drive_duty.store(duty, Ordering::Relaxed);
    }

    /// Push the configured drive level to the output immediately.
    pub fn apply_drive(&mut self) {
        self.io.write_drive(self.drive_duty.load(Ordering::Relaxed));
    }

    /// Force full drive without arming; used for the priming phase.
    pub fn drive_full(&mut self) {
        self.io.write_drive(DUTY_FULL);
    }

    pub fn supports_edge_interrupts(&self) -> bool {
        self.io.supports_edge_interrupts()
    }
}

/// RPM from the falling-to-rising half period. The first factor 2 undoes the
/// 50 % duty cycle, the second the two impulses per revolution, normalizing
/// `dt` to one full electrical period. A zero or inverted delta yields 0.
pub fn compute_rpm(t1: u64, t2: u64) -> u32 {
    let dt = t2.saturating_sub(t1) * 2 * 2;
    if dt == 0 {
        return 0;
    }
    (60_000_000 / dt) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal_sim::SimulatedFan;

    #[test]
    fn compute_rpm_normalizes_to_one_period() {
        // 8 ms low half-period -> 32 ms electrical period.
        assert_eq!(compute_rpm(1000, 9000), 1875);
    }

    #[test]
    fn compute_rpm_handles_degenerate_stamps() {
        assert_eq!(compute_rpm(9000, 9000), 0);
        assert_eq!(compute_rpm(9000, 1000), 0);
    }

    #[test]
    fn armed_cycle_measures_nominal_speed() {
        let rig = SimulatedFan::with_rpm(3000);
        let mut sampler = TachoSampler::new(rig.clone(), rig.clone(), 90);

        sampler.arm();
        for _ in 0..25 {
            if sampler.is_finished() {
                break;
            }
            rig.sleep_ms(1);
        }
        sampler.finalize();

        assert_eq!(sampler.rpm(), 3000);
        // Normal drive is restored once the cycle is over.
        assert_eq!(rig.drive_duty(), 90);
        assert!(!rig.handler_attached());
    }

    #[test]
    fn forced_finalize_yields_zero_rpm() {
        let rig = SimulatedFan::stalled();
        let mut sampler = TachoSampler::new(rig.clone(), rig.clone(), 120);

        sampler.arm();
        rig.sleep_ms(25);
        assert!(!sampler.is_finished());

        sampler.finalize();
        assert!(sampler.is_finished());
        assert_eq!(sampler.rpm(), 0);
        assert_eq!(rig.drive_duty(), 120);
    }

    #[test]
    fn finalize_is_a_noop_the_second_time() {
        let rig = SimulatedFan::with_rpm(3000);
        let mut sampler = TachoSampler::new(rig.clone(), rig.clone(), 90);

        sampler.arm();
        for _ in 0..25 {
            if sampler.is_finished() {
                break;
            }
            rig.sleep_ms(1);
        }
        sampler.finalize();
        let rpm = sampler.rpm();

        sampler.set_drive_duty(40);
        sampler.finalize();
        assert_eq!(sampler.rpm(), rpm);
        // The second call restores nothing either.
        assert_eq!(rig.drive_duty(), 90);
    }

    #[test]
    fn duty_setter_survives_finalize() {
        let rig = SimulatedFan::stalled();
        let mut sampler = TachoSampler::new(rig.clone(), rig.clone(), 50);

        sampler.arm();
        sampler.set_drive_duty(200);
        sampler.finalize();
        assert_eq!(rig.drive_duty(), 200);
    }
}
