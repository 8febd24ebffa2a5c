use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Named conditions this subsystem can raise toward the centralized error
/// surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fault {
    /// The measurement cycle did not capture both edges within its budget.
    FanTestFailed,
}

impl Fault {
    pub fn as_str(&self) -> &'static str {
        match self {
            Fault::FanTestFailed => "fan_test_failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum FaultError {
    #[error("fault report write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Centralized error-reporting collaborator. The controller raises exactly
/// one fault per failed cycle; reporting failures are logged by the caller
/// and never folded into a test verdict.
pub trait FaultSink: Send {
    fn raise(&self, fault: Fault) -> Result<(), FaultError>;
}
