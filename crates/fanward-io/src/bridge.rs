use crate::metrics::{BRIDGE_CONNECTED, DUTY_COMMANDS, DUTY_REJECTED};
use crate::protocol::{HelloMsg, IncomingMessage, StatusMsg};
use core_rotor::{DutyCommand, StatusExchange, TimeBase};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{atomic::AtomicBool, Arc};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub struct BridgeConfig {
    pub bind_addr: String,
    pub publish_interval: Duration,
    pub require_handshake: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7700".to_string(),
            publish_interval: Duration::from_millis(100),
            require_handshake: false,
        }
    }
}

#[derive(Debug)]
struct InboundState {
    last_sequence: Option<u64>,
    handshake_seen: bool,
    client_id: Option<String>,
}

impl InboundState {
    fn new() -> Self {
        Self {
            last_sequence: None,
            handshake_seen: false,
            client_id: None,
        }
    }

    fn reset(&mut self) {
        self.last_sequence = None;
        self.handshake_seen = false;
        self.client_id = None;
    }

    fn accept_sequence(&mut self, sequence: u64) -> bool {
        if sequence == 0 {
            warn!("Duty command sequence missing or zero");
            return false;
        }
        if let Some(last) = self.last_sequence {
            if sequence <= last {
                warn!(
                    sequence,
                    last_sequence = last,
                    "Out-of-order duty command sequence"
                );
                return false;
            }
        }
        self.last_sequence = Some(sequence);
        true
    }

    fn note_handshake(&mut self, hello: &HelloMsg) {
        self.handshake_seen = true;
        self.client_id = hello.client_id.clone();
    }
}

/// Single-client diagnostics bridge: publishes the fan status as
/// line-delimited JSON at a fixed interval and accepts `set_duty` commands.
/// The control-panel slider is the expected client.
pub fn run_bridge(
    exchange: Arc<StatusExchange>,
    timebase: TimeBase,
    config: BridgeConfig,
    stop: Arc<AtomicBool>,
) {
    let listener = match TcpListener::bind(&config.bind_addr) {
        Ok(l) => l,
        Err(e) => {
            error!(addr = %config.bind_addr, error = %e, "Failed to bind bridge");
            return;
        }
    };
    if let Err(e) = listener.set_nonblocking(true) {
        error!(error = %e, "Failed to set bridge listener nonblocking");
        return;
    }

    info!(addr = %config.bind_addr, "Bridge listening");

    let mut client: Option<TcpStream> = None;
    let mut recv_buf: Vec<u8> = Vec::with_capacity(4096);
    let mut send_buf: Vec<u8> = Vec::new();
    let mut send_offset: usize = 0;
    let mut last_publish = Instant::now();
    let mut status_sequence: u64 = 0;
    let mut inbound_state = InboundState::new();

    loop {
        if stop.load(std::sync::atomic::Ordering::Relaxed) {
            break;
        }
        if client.is_none() {
            match listener.accept() {
                Ok((stream, addr)) => {
                    info!(client_addr = %addr, "Bridge client connected");
                    if let Err(e) = stream.set_nonblocking(true) {
                        warn!(error = %e, "Failed to set client nonblocking");
                    } else {
                        client = Some(stream);
                        BRIDGE_CONNECTED.set(1.0);
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(err) => {
                    warn!("Bridge accept error: {}", err);
                }
            }
        }

        let mut drop_client = false;
        if let Some(stream) = client.as_mut() {
            // Receive data
            let mut temp = [0u8; 1024];
            match stream.read(&mut temp) {
                Ok(0) => {
                    info!("Bridge client disconnected");
                    drop_client = true;
                    BRIDGE_CONNECTED.set(0.0);
                }
                Ok(n) => {
                    recv_buf.extend_from_slice(&temp[..n]);
                    while let Some(pos) = recv_buf.iter().position(|b| *b == b'\n') {
                        let line = recv_buf.drain(..=pos).collect::<Vec<u8>>();
                        if let Ok(text) = std::str::from_utf8(&line) {
                            let trimmed = text.trim();
                            if trimmed.is_empty() {
                                continue;
                            }
                            if let Some(msg) = IncomingMessage::parse(trimmed) {
                                handle_incoming(
                                    msg,
                                    &exchange,
                                    &timebase,
                                    config.require_handshake,
                                    &mut inbound_state,
                                );
                            }
                        }
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(err) => {
                    warn!(error = %err, "Bridge read error");
                    drop_client = true;
                    BRIDGE_CONNECTED.set(0.0);
                }
            }

            // Publish status
            if send_buf.is_empty() && last_publish.elapsed() >= config.publish_interval {
                status_sequence = status_sequence.wrapping_add(1);
                let snapshot = exchange.read_status();
                let msg = StatusMsg {
                    msg_type: "status",
                    protocol_version: crate::protocol::ProtocolVersion::v1(),
                    sequence: status_sequence,
                    timestamp_us: snapshot.timestamp_us,
                    unix_us: timebase.unix_us(),
                    fan_rpm: snapshot.rpm,
                    fan_duty: snapshot.duty,
                    verdict: snapshot.verdict,
                    tests_run: snapshot.tests_run,
                    tests_failed: snapshot.tests_failed,
                    tests_skipped: snapshot.tests_skipped,
                };
                if let Ok(line) = serde_json::to_string(&msg) {
                    send_buf = line.into_bytes();
                    send_buf.push(b'\n');
                    send_offset = 0;
                }
                last_publish = Instant::now();
            }

            if !send_buf.is_empty() {
                match stream.write(&send_buf[send_offset..]) {
                    Ok(0) => {
                        info!("Bridge client disconnected");
                        drop_client = true;
                        BRIDGE_CONNECTED.set(0.0);
                    }
                    Ok(n) => {
                        send_offset += n;
                        if send_offset >= send_buf.len() {
                            send_buf.clear();
                            send_offset = 0;
                        }
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(err) => {
                        warn!(error = %err, "Bridge write error");
                        drop_client = true;
                        BRIDGE_CONNECTED.set(0.0);
                    }
                }
            }
        }

        if drop_client {
            client = None;
            recv_buf.clear();
            send_buf.clear();
            send_offset = 0;
            inbound_state.reset();
        }

        std::thread::sleep(Duration::from_millis(5));
    }
}

fn handle_incoming(
    msg: IncomingMessage,
    exchange: &StatusExchange,
    timebase: &TimeBase,
    require_handshake: bool,
    inbound_state: &mut InboundState,
) {
    match msg {
        IncomingMessage::Hello(hello) => {
            if !hello.protocol_version.is_supported() {
                warn!(
                    major = hello.protocol_version.major,
                    minor = hello.protocol_version.minor,
                    "Unsupported protocol version"
                );
                return;
            }
            inbound_state.note_handshake(&hello);
            info!(
                client_id = ?hello.client_id,
                capabilities = ?hello.capabilities,
                "Bridge handshake received"
            );
        }
        IncomingMessage::SetDuty(cmd) => {
            if !cmd.protocol_version.is_supported() {
                warn!(
                    major = cmd.protocol_version.major,
                    minor = cmd.protocol_version.minor,
                    "Unsupported protocol version"
                );
                DUTY_REJECTED.inc();
                return;
            }

            if require_handshake && !inbound_state.handshake_seen {
                warn!("Duty command received before handshake");
                DUTY_REJECTED.inc();
                return;
            }

            if !inbound_state.accept_sequence(cmd.sequence) {
                DUTY_REJECTED.inc();
                return;
            }

            debug!(duty = cmd.duty, "Duty command received");
            DUTY_COMMANDS.inc();

            exchange.submit_duty(DutyCommand {
                timestamp_us: timebase.now_us(),
                duty: cmd.duty,
            });
        }
    }
}
