use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Progress of a single duty-cycle-edge timing capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RpmMeasureState {
    Init = 0,
    T1 = 1,
    T2 = 2,
    Finished = 3,
}

impl RpmMeasureState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Init,
            1 => Self::T1,
            2 => Self::T2,
            _ => Self::Finished,
        }
    }
}

const INIT: u8 = RpmMeasureState::Init as u8;
const T1: u8 = RpmMeasureState::T1 as u8;
const T2: u8 = RpmMeasureState::T2 as u8;
const FINISHED: u8 = RpmMeasureState::Finished as u8;

/// Shared edge-timing state machine.
///
/// The registered edge handler is the only writer while a capture is armed;
/// the controller resets or forces the state only while no handler is
/// attached. Every handler transition is a compare-and-swap on the state
/// byte, so a stale callback can never rewind a capture that has already
/// advanced past it.
pub struct RpmCapture {
    state: AtomicU8,
    t1: AtomicU64,
    t2: AtomicU64,
}

impl RpmCapture {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(FINISHED),
            t1: AtomicU64::new(0),
            t2: AtomicU64::new(0),
        }
    }

    /// Clear both timestamps and rewind to `Init`. Caller must hold the
    /// detached side of the protocol: no handler may be attached.
    pub fn reset(&self) {
        self.t1.store(0, Ordering::Relaxed);
        self.t2.store(0, Ordering::Relaxed);
        self.state.store(INIT, Ordering::Release);
    }

    /// Handler entry point, one call per electrical transition on the sense
    /// line. Interrupt context: short, non-blocking, non-allocating.
    ///
    /// `high` is the level after the transition, `now_us` the edge timestamp.
    /// The first transition accepted is a rising edge, which anchors the
    /// measurement to a known phase; anything out of order is noise and is
    /// ignored, including any edge arriving while already `Finished`.
    pub fn on_edge(&self, high: bool, now_us: u64) {
        match (self.state.load(Ordering::Acquire), high) {
            (INIT, true) => {
                let _ = self
                    .state
                    .compare_exchange(INIT, T1, Ordering::AcqRel, Ordering::Relaxed);
            }
            (T1, false) => {
                self.t1.store(now_us, Ordering::Relaxed);
                let _ = self
                    .state
                    .compare_exchange(T1, T2, Ordering::AcqRel, Ordering::Relaxed);
            }
            (T2, true) => {
                self.t2.store(now_us, Ordering::Relaxed);
                let _ =
                    self.state
                        .compare_exchange(T2, FINISHED, Ordering::AcqRel, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn state(&self) -> RpmMeasureState {
        RpmMeasureState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_finished(&self) -> bool {
        self.state() == RpmMeasureState::Finished
    }

    /// Force the terminal state on the timeout path. Caller must hold the
    /// detached side of the protocol.
    pub fn force_finished(&self) {
        self.state.store(FINISHED, Ordering::Release);
    }

    /// Timestamps of the falling and rising captures. Meaningful only when
    /// `Finished` was reached through both transitions.
    pub fn stamps(&self) -> (u64, u64) {
        (self.t1.load(Ordering::Relaxed), self.t2.load(Ordering::Relaxed))
    }
}

impl Default for RpmCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_sequence_records_both_stamps() {
        let capture = RpmCapture::new();
        capture.reset();

        capture.on_edge(true, 500);
        assert_eq!(capture.state(), RpmMeasureState::T1);

        capture.on_edge(false, 1000);
        assert_eq!(capture.state(), RpmMeasureState::T2);

        capture.on_edge(true, 9000);
        assert_eq!(capture.state(), RpmMeasureState::Finished);
        assert_eq!(capture.stamps(), (1000, 9000));
    }

    #[test]
    fn low_level_while_init_is_ignored() {
        let capture = RpmCapture::new();
        capture.reset();

        capture.on_edge(false, 100);
        assert_eq!(capture.state(), RpmMeasureState::Init);
        assert_eq!(capture.stamps(), (0, 0));
    }

    #[test]
    fn repeated_level_while_waiting_is_ignored() {
        let capture = RpmCapture::new();
        capture.reset();

        capture.on_edge(true, 100);
        capture.on_edge(true, 200);
        assert_eq!(capture.state(), RpmMeasureState::T1);

        capture.on_edge(false, 300);
        capture.on_edge(false, 400);
        assert_eq!(capture.state(), RpmMeasureState::T2);
        assert_eq!(capture.stamps(), (300, 0));
    }

    #[test]
    fn stale_edges_after_finish_mutate_nothing() {
        let capture = RpmCapture::new();
        capture.reset();
        capture.on_edge(true, 500);
        capture.on_edge(false, 1000);
        capture.on_edge(true, 9000);

        capture.on_edge(false, 12000);
        capture.on_edge(true, 13000);
        assert_eq!(capture.state(), RpmMeasureState::Finished);
        assert_eq!(capture.stamps(), (1000, 9000));
    }

    #[test]
    fn reset_rewinds_a_finished_capture() {
        let capture = RpmCapture::new();
        capture.reset();
        capture.on_edge(true, 500);
        capture.on_edge(false, 1000);
        capture.on_edge(true, 9000);

        capture.reset();
        assert_eq!(capture.state(), RpmMeasureState::Init);
        assert_eq!(capture.stamps(), (0, 0));
    }
}
