use core_rotor::TestResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    pub const fn v1() -> Self {
        Self { major: 1, minor: 0 }
    }

    pub fn is_supported(&self) -> bool {
        self.major == 1
    }
}

/// One line of the outbound status stream.
#[derive(Debug, Serialize)]
pub struct StatusMsg {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub protocol_version: ProtocolVersion,
    pub sequence: u64,
    pub timestamp_us: u64,
    pub unix_us: u64,
    pub fan_rpm: u32,
    pub fan_duty: u8,
    pub verdict: TestResult,
    pub tests_run: u64,
    pub tests_failed: u64,
    pub tests_skipped: u64,
}

/// Drive-level request from a diagnostics client (the control panel slider
/// speaks this).
#[derive(Debug, Deserialize)]
pub struct SetDutyMsg {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
    #[serde(default)]
    pub sequence: u64,
    pub duty: u8,
}

#[derive(Debug, Deserialize)]
pub struct HelloMsg {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug)]
pub enum IncomingMessage {
    Hello(HelloMsg),
    SetDuty(SetDutyMsg),
}

impl IncomingMessage {
    pub fn parse(line: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(line).ok()?;
        let msg_type = value.get("type")?.as_str()?;
        match msg_type {
            "set_duty" => serde_json::from_value(value)
                .ok()
                .map(IncomingMessage::SetDuty),
            "hello" => serde_json::from_value(value)
                .ok()
                .map(IncomingMessage::Hello),
            _ => None,
        }
    }
}
