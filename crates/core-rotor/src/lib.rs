pub mod capture;
pub mod fault;
pub mod hal;
#[cfg(feature = "simulation")]
pub mod hal_sim;
pub mod sampler;
pub mod selftest;
pub mod sync;
pub mod tags;
pub mod timebase;

pub use capture::{RpmCapture, RpmMeasureState};
pub use fault::{Fault, FaultError, FaultSink};
pub use hal::{Clock, EdgeHandler, FanIo, FanStats};
#[cfg(feature = "simulation")]
pub use hal_sim::SimulatedFan;
pub use sampler::TachoSampler;
pub use selftest::{FanConfig, FanTest, TestResult};
pub use sync::{DutyCommand, FanSnapshot, StatusExchange};
pub use timebase::TimeBase;
