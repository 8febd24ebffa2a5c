use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub run_seconds: Option<u64>,
    pub bind_addr: String,
    pub bridge_enabled: bool,
    pub json_logs: bool,
    pub log_file: Option<PathBuf>,
    pub metrics_addr: Option<String>,
    pub event_log: Option<PathBuf>,
    pub fan_enabled: bool,
    pub duty: u8,
    pub fan_rpm: u32,
    pub simulate_stall: bool,
    pub retest_secs: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            run_seconds: None,
            bind_addr: "127.0.0.1:7700".to_string(),
            bridge_enabled: true,
            json_logs: false,
            log_file: None,
            metrics_addr: None,
            event_log: None,
            fan_enabled: true,
            duty: 0,
            fan_rpm: 3000,
            simulate_stall: false,
            retest_secs: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Self {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--run-seconds" => {
                    if i + 1 < args.len() {
                        cfg.run_seconds = args[i + 1].parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--bind" => {
                    if i + 1 < args.len() {
                        cfg.bind_addr = args[i + 1].clone();
                        i += 1;
                    }
                }
                "--no-bridge" => {
                    cfg.bridge_enabled = false;
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--log-file" => {
                    if i + 1 < args.len() {
                        cfg.log_file = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--metrics-addr" => {
                    if i + 1 < args.len() {
                        cfg.metrics_addr = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--event-log" => {
                    if i + 1 < args.len() {
                        cfg.event_log = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--disable-fan" => {
                    cfg.fan_enabled = false;
                }
                "--duty" => {
                    if i + 1 < args.len() {
                        cfg.duty = args[i + 1].parse().unwrap_or(0);
                        i += 1;
                    }
                }
                "--fan-rpm" => {
                    if i + 1 < args.len() {
                        cfg.fan_rpm = args[i + 1].parse().unwrap_or(3000);
                        i += 1;
                    }
                }
                "--simulate-stall" => {
                    cfg.simulate_stall = true;
                }
                "--retest-secs" => {
                    if i + 1 < args.len() {
                        cfg.retest_secs = args[i + 1].parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        cfg
    }

    pub fn print_help() {
        println!(
            r#"fanward - Fan-speed verification runtime

USAGE:
    fanward [OPTIONS]

OPTIONS:
    --duty <LEVEL>          Normal fan drive duty, 0-255 [default: 0]
    --disable-fan           Disable the fan feature entirely (verdict: skipped)
    --fan-rpm <RPM>         Nominal speed of the simulated fan [default: 3000]
    --simulate-stall        Simulate a seized rotor (verification fails)
    --retest-secs <SECS>    Re-run the verification cycle on an interval
    --bind <ADDR>           Diagnostics bridge bind address [default: 127.0.0.1:7700]
    --no-bridge             Disable the diagnostics bridge
    --run-seconds <SECS>    Run for a fixed duration then exit
    --json-logs             Output logs in JSON format (for log aggregation)
    --log-file <PATH>       Also write logs to a file
    --metrics-addr <ADDR>   Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --event-log <PATH>      Enable event logging to specified JSONL file
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,fanward=trace)

EXAMPLES:
    # Run with metrics and a persistent event log
    fanward --duty 120 --metrics-addr 0.0.0.0:9090 --event-log /var/log/fanward/events.jsonl

    # Exercise the failure path
    fanward --simulate-stall --run-seconds 5

    # Short verification run without the bridge
    fanward --run-seconds 10 --no-bridge
"#
        );
    }
}
