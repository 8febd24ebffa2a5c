use crate::hal::{Clock, EdgeHandler, FanIo};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Simulated fan on a bench.
///
/// Implements both `FanIo` and `Clock` so one rig serves a whole measurement
/// cycle. The tach signal is a 50 % duty square wave with two impulses per
/// revolution; every sleep advances the rig and delivers due edges to the
/// attached handler with exact edge timestamps.
///
/// Clones share the rig. The default timing mode is virtual: sleeps advance
/// simulated time instantly, which makes cycle tests deterministic and fast.
/// `realtime()` switches to wall-clock timing for running the daemon against
/// the rig.
#[derive(Clone)]
pub struct SimulatedFan {
    inner: Arc<Mutex<SimInner>>,
}

enum Timing {
    Virtual,
    Real(Instant),
}

struct SimInner {
    timing: Timing,
    now_us: u64,
    /// Full electrical period of the tach signal; 0 models a seized rotor.
    period_us: u64,
    sense_high: bool,
    next_edge_us: u64,
    duty: u8,
    edge_capable: bool,
    handler: Option<EdgeHandler>,
    handler_gen: u64,
    handler_attached_at_us: Option<u64>,
}

impl SimInner {
    fn spinning(&self) -> bool {
        self.duty > 0 && self.period_us > 0
    }

    /// Pop the next edge due at or before `target_us`, updating the
    /// waveform; `None` once the rig is caught up.
    fn pop_due_edge(&mut self, target_us: u64) -> Option<(bool, u64)> {
        if !self.spinning() || self.next_edge_us > target_us {
            return None;
        }
        self.now_us = self.next_edge_us;
        self.sense_high = !self.sense_high;
        self.next_edge_us += self.period_us / 2;
        Some((self.sense_high, self.now_us))
    }
}

impl SimulatedFan {
    /// Rig whose rotor settles at `nominal_rpm` as soon as it is driven.
    /// Two impulses per revolution give an electrical period of
    /// `30_000_000 / rpm` microseconds.
    pub fn with_rpm(nominal_rpm: u32) -> Self {
        let period_us = if nominal_rpm == 0 {
            0
        } else {
            30_000_000 / u64::from(nominal_rpm)
        };
        Self {
            inner: Arc::new(Mutex::new(SimInner {
                timing: Timing::Virtual,
                now_us: 0,
                period_us,
                sense_high: false,
                next_edge_us: 0,
                duty: 0,
                edge_capable: true,
                handler: None,
                handler_gen: 0,
                handler_attached_at_us: None,
            })),
        }
    }

    /// Rig whose rotor never turns: drive is accepted, no edge ever fires.
    pub fn stalled() -> Self {
        Self::with_rpm(0)
    }

    /// Switch to wall-clock timing; sleeps really sleep and edges are
    /// delivered when time catches up with their schedule.
    pub fn realtime(self) -> Self {
        self.inner.lock().unwrap().timing = Timing::Real(Instant::now());
        self
    }

    /// Test knob: report the sense line as unable to deliver edge callbacks.
    pub fn disable_edge_interrupts(&self) {
        self.inner.lock().unwrap().edge_capable = false;
    }

    pub fn drive_duty(&self) -> u8 {
        self.inner.lock().unwrap().duty
    }

    pub fn handler_attached(&self) -> bool {
        self.inner.lock().unwrap().handler.is_some()
    }

    /// Rig time at which the current handler was attached, if any was.
    pub fn handler_attached_at_us(&self) -> Option<u64> {
        self.inner.lock().unwrap().handler_attached_at_us
    }

    /// Deliver every edge scheduled at or before `target_us`, then land the
    /// rig clock there. The handler runs outside the rig lock.
    fn advance_to(&self, target_us: u64) {
        loop {
            let due = {
                let mut inner = self.inner.lock().unwrap();
                match inner.pop_due_edge(target_us) {
                    Some((level, at_us)) => {
                        let gen = inner.handler_gen;
                        inner.handler.take().map(|handler| (level, at_us, handler, gen))
                    }
                    None => {
                        if inner.now_us < target_us {
                            inner.now_us = target_us;
                        }
                        break;
                    }
                }
            };
            if let Some((level, at_us, mut handler, gen)) = due {
                handler(level, at_us);
                let mut inner = self.inner.lock().unwrap();
                // Drop the handler instead of resurrecting it if it was
                // detached or replaced while running.
                if inner.handler_gen == gen && inner.handler.is_none() {
                    inner.handler = Some(handler);
                }
            }
        }
    }

    fn wall_clock_us(&self) -> Option<u64> {
        let inner = self.inner.lock().unwrap();
        match inner.timing {
            Timing::Virtual => None,
            Timing::Real(start) => Some(start.elapsed().as_micros() as u64),
        }
    }

    fn catch_up(&self) {
        if let Some(real_now) = self.wall_clock_us() {
            self.advance_to(real_now);
        }
    }
}

impl FanIo for SimulatedFan {
    fn read_sense(&self) -> bool {
        self.catch_up();
        self.inner.lock().unwrap().sense_high
    }

    fn write_drive(&mut self, duty: u8) {
        self.catch_up();
        let mut inner = self.inner.lock().unwrap();
        let was_spinning = inner.spinning();
        inner.duty = duty;
        if !was_spinning && inner.spinning() {
            inner.next_edge_us = inner.now_us + inner.period_us / 2;
        }
    }

    fn supports_edge_interrupts(&self) -> bool {
        self.inner.lock().unwrap().edge_capable
    }

    fn attach_sense_handler(&mut self, handler: EdgeHandler) {
        self.catch_up();
        let mut inner = self.inner.lock().unwrap();
        inner.handler = Some(handler);
        inner.handler_gen += 1;
        inner.handler_attached_at_us = Some(inner.now_us);
    }

    fn detach_sense_handler(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        inner.handler = None;
        inner.handler_gen += 1;
    }
}

impl Clock for SimulatedFan {
    fn now_us(&self) -> u64 {
        self.catch_up();
        self.inner.lock().unwrap().now_us
    }

    fn sleep_ms(&self, ms: u64) {
        match self.wall_clock_us() {
            None => {
                let target = self.inner.lock().unwrap().now_us + ms * 1_000;
                self.advance_to(target);
            }
            Some(_) => {
                std::thread::sleep(Duration::from_millis(ms));
                self.catch_up();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_edges(rig: &SimulatedFan) -> Arc<Mutex<Vec<(bool, u64)>>> {
        let edges = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&edges);
        let mut io = rig.clone();
        io.attach_sense_handler(Box::new(move |level, at_us| {
            sink.lock().unwrap().push((level, at_us));
        }));
        edges
    }

    #[test]
    fn square_wave_alternates_at_half_period() {
        let rig = SimulatedFan::with_rpm(3000); // period 10 ms
        let edges = collect_edges(&rig);

        rig.clone().write_drive(255);
        rig.sleep_ms(20);

        let seen = edges.lock().unwrap().clone();
        assert_eq!(seen, vec![(true, 5_000), (false, 10_000), (true, 15_000), (false, 20_000)]);
        assert!(!rig.read_sense());
    }

    #[test]
    fn no_edges_without_drive() {
        let rig = SimulatedFan::with_rpm(3000);
        let edges = collect_edges(&rig);

        rig.sleep_ms(50);
        assert!(edges.lock().unwrap().is_empty());
        assert_eq!(rig.now_us(), 50_000);
    }

    #[test]
    fn stalled_rotor_stays_silent_under_drive() {
        let rig = SimulatedFan::stalled();
        let edges = collect_edges(&rig);

        rig.clone().write_drive(255);
        rig.sleep_ms(100);
        assert!(edges.lock().unwrap().is_empty());
    }

    #[test]
    fn detach_inside_handler_sticks() {
        let rig = SimulatedFan::with_rpm(3000);
        let fired = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&fired);
        let mut io = rig.clone();
        let detach_rig = rig.clone();
        io.attach_sense_handler(Box::new(move |_, _| {
            *counter.lock().unwrap() += 1;
            detach_rig.clone().detach_sense_handler();
        }));

        io.write_drive(255);
        rig.sleep_ms(30);
        assert_eq!(*fired.lock().unwrap(), 1);
        assert!(!rig.handler_attached());
    }
}
