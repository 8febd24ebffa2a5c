/// Callback invoked once per electrical transition on the tachometer sense
/// line, with the level after the transition and the edge timestamp in
/// microseconds.
pub type EdgeHandler = Box<dyn FnMut(bool, u64) + Send>;

/// Fan I/O as provided by the platform: a PWM-style drive output and a
/// tachometer sense input with optional edge-triggered callbacks.
pub trait FanIo: Send {
    /// Current level of the sense line.
    fn read_sense(&self) -> bool;
    /// Drive the fan output at a duty level, 0 (off) to 255 (fully on).
    fn write_drive(&mut self, duty: u8);
    /// Whether the sense line can deliver edge-triggered callbacks.
    fn supports_edge_interrupts(&self) -> bool;
    /// Register a handler for both rising and falling transitions.
    fn attach_sense_handler(&mut self, handler: EdgeHandler);
    fn detach_sense_handler(&mut self);
}

/// Monotonic microsecond clock plus the blocking millisecond sleep the
/// measurement cycle is allowed to use.
pub trait Clock: Send {
    fn now_us(&self) -> u64;
    fn sleep_ms(&self, ms: u64);
}

/// Per-subsystem verification counters exposed for telemetry.
#[derive(Clone, Default, Debug)]
pub struct FanStats {
    pub tests_run: u64,
    pub tests_failed: u64,
    pub tests_skipped: u64,
}
