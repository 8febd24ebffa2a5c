use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command};
use std::thread;
use std::time::Duration;

struct FanwardProcess {
    child: Child,
    addr: String,
}

impl FanwardProcess {
    fn start(extra_args: &[&str]) -> Self {
        // Prefer the test-built binary when available to avoid extra cargo builds.
        let bin_path = std::env::var("CARGO_BIN_EXE_fanward").unwrap_or_else(|_| {
            let candidates = [
                "../../target/release/fanward",
                "target/release/fanward",
                "./target/release/fanward",
                "../../target/debug/fanward",
                "target/debug/fanward",
                "./target/debug/fanward",
            ];
            for candidate in candidates {
                if std::path::Path::new(candidate).exists() {
                    return candidate.to_string();
                }
            }
            panic!(
                "Failed to locate fanward binary. Expected CARGO_BIN_EXE_fanward or a build in target/{{release,debug}}/fanward."
            );
        });

        let listener = TcpListener::bind("127.0.0.1:0")
            .expect("Failed to bind ephemeral port for integration test");
        let addr = listener
            .local_addr()
            .expect("Failed to resolve bound address");
        let bind_addr = format!("127.0.0.1:{}", addr.port());
        drop(listener);

        let mut args = vec!["--bind", bind_addr.as_str()];
        args.extend_from_slice(extra_args);
        let child = Command::new(&bin_path)
            .args(&args)
            .spawn()
            .expect("Failed to start fanward");

        // Loop until port is open (up to 5s)
        let start = std::time::Instant::now();
        while start.elapsed().as_secs() < 5 {
            if TcpStream::connect(&bind_addr).is_ok() {
                break;
            }
            thread::sleep(Duration::from_millis(100));
        }

        // Give the self-test time to finish (priming alone is 300 ms)
        thread::sleep(Duration::from_millis(800));
        Self {
            child,
            addr: bind_addr,
        }
    }

    fn addr(&self) -> &str {
        &self.addr
    }
}

impl Drop for FanwardProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}

/// Read status lines until `pred` matches one, bounded by a line budget.
fn read_until(
    reader: &mut BufReader<TcpStream>,
    pred: impl Fn(&serde_json::Value) -> bool,
) -> Option<serde_json::Value> {
    for _ in 0..50 {
        let mut line = String::new();
        if reader.read_line(&mut line).is_err() {
            return None;
        }
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) {
            if pred(&value) {
                return Some(value);
            }
        }
    }
    None
}

#[test]
fn test_status_stream_reports_passing_verification() {
    let daemon = FanwardProcess::start(&["--duty", "120", "--fan-rpm", "3000"]);

    let stream = TcpStream::connect(daemon.addr()).expect("Failed to connect to fanward");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut reader = BufReader::new(stream);

    let status = read_until(&mut reader, |v| {
        v["type"] == "status" && v["verdict"] == "ok"
    })
    .expect("expected a passing status line");

    assert_eq!(status["fan_rpm"], 3000);
    assert_eq!(status["fan_duty"], 120);
    assert!(status["tests_run"].as_u64().unwrap_or(0) >= 1);
    assert_eq!(status["tests_failed"], 0);
}

#[test]
fn test_stalled_fan_reports_failure() {
    let daemon = FanwardProcess::start(&["--simulate-stall"]);

    let stream = TcpStream::connect(daemon.addr()).expect("Failed to connect to fanward");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut reader = BufReader::new(stream);

    let status = read_until(&mut reader, |v| {
        v["type"] == "status" && v["verdict"] == "failed"
    })
    .expect("expected a failed status line");

    assert_eq!(status["fan_rpm"], 0);
    assert!(status["tests_failed"].as_u64().unwrap_or(0) >= 1);
}

#[test]
fn test_duty_command_is_applied() {
    let daemon = FanwardProcess::start(&["--duty", "100", "--fan-rpm", "3000"]);

    let mut stream = TcpStream::connect(daemon.addr()).expect("Failed to connect to fanward");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    // Wait until the daemon is publishing real status.
    read_until(&mut reader, |v| v["type"] == "status").expect("expected a status line");

    let command = serde_json::json!({
        "type": "set_duty",
        "protocol_version": { "major": 1, "minor": 0 },
        "sequence": 1,
        "duty": 200
    });
    writeln!(stream, "{}", command).unwrap();

    let status = read_until(&mut reader, |v| v["fan_duty"] == 200)
        .expect("expected the duty command to be applied");
    assert_eq!(status["fan_duty"], 200);
}

#[test]
fn test_disabled_fan_skips_verification() {
    let daemon = FanwardProcess::start(&["--disable-fan"]);

    let stream = TcpStream::connect(daemon.addr()).expect("Failed to connect to fanward");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut reader = BufReader::new(stream);

    let status = read_until(&mut reader, |v| {
        v["type"] == "status" && v["verdict"] == "skipped"
    })
    .expect("expected a skipped status line");

    assert_eq!(status["fan_rpm"], 0);
    assert_eq!(status["tests_failed"], 0);
}
