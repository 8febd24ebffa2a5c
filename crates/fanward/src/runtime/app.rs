use crate::infra::events::{EventKind, EventLogFault, EventLogger};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry;
use core_rotor::{
    FanConfig, FanStats, FanTest, FaultSink, SimulatedFan, StatusExchange, TestResult, TimeBase,
};
use fanward_io::bridge::{run_bridge, BridgeConfig};
use std::path::PathBuf;
use std::sync::{atomic::AtomicBool, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Control loop cadence: tick, duty application and status publication.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Duty commands older than this are considered stale and ignored.
const DUTY_COMMAND_MAX_AGE: Duration = Duration::from_secs(2);

pub fn run_from_args() {
    let config = RuntimeConfig::from_env();
    if config.show_help {
        RuntimeConfig::print_help();
        return;
    }
    run(config);
}

pub fn run(config: RuntimeConfig) {
    let _log_guard = init_tracing(config.json_logs, config.log_file.as_deref());

    telemetry::init();
    let metrics_enabled = config.metrics_addr.is_some();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let timebase = TimeBase::new();
    let exchange = Arc::new(StatusExchange::new(DUTY_COMMAND_MAX_AGE.as_micros() as u64));

    let event_logger = init_event_logger(config.event_log.as_ref());
    if let Some(ref logger) = event_logger {
        let _ = logger.log_event(
            timebase.now_us(),
            timebase.unix_us(),
            EventKind::SystemStart,
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "fan_enabled": config.fan_enabled,
                "metrics_enabled": metrics_enabled,
            }),
        );
    }

    let stop = Arc::new(AtomicBool::new(false));

    info!(
        fan_enabled = config.fan_enabled,
        duty = config.duty,
        nominal_rpm = config.fan_rpm,
        stalled = config.simulate_stall,
        "Starting fan verification loop"
    );

    let exchange_ctrl = Arc::clone(&exchange);
    let stop_ctrl = Arc::clone(&stop);
    let logger_ctrl = event_logger.clone();
    let config_ctrl = config.clone();
    let ctrl_handle = thread::spawn(move || {
        control_loop(config_ctrl, timebase, exchange_ctrl, logger_ctrl, stop_ctrl)
    });

    let updater_handle =
        telemetry::start_metrics_updater(Arc::clone(&exchange), Arc::clone(&stop));

    let bridge_handle = if config.bridge_enabled {
        let exchange_bridge = Arc::clone(&exchange);
        let stop_bridge = Arc::clone(&stop);
        let bridge_config = BridgeConfig {
            bind_addr: config.bind_addr.clone(),
            ..Default::default()
        };
        info!(addr = %bridge_config.bind_addr, "Starting bridge");
        Some(thread::spawn(move || {
            run_bridge(exchange_bridge, timebase, bridge_config, stop_bridge);
        }))
    } else {
        info!("Bridge disabled");
        None
    };

    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
        thread::sleep(Duration::from_secs(seconds));
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    let stats = ctrl_handle.join().unwrap();
    let _ = updater_handle.join();
    if let Some(handle) = bridge_handle {
        let _ = handle.join();
    }

    info!(
        tests_run = stats.tests_run,
        tests_failed = stats.tests_failed,
        tests_skipped = stats.tests_skipped,
        "Run complete"
    );

    if let Some(ref logger) = event_logger {
        let _ = logger.log_event(
            timebase.now_us(),
            timebase.unix_us(),
            EventKind::SystemShutdown,
            serde_json::json!({
                "tests_run": stats.tests_run,
                "tests_failed": stats.tests_failed,
            }),
        );
    }
}

fn control_loop(
    config: RuntimeConfig,
    timebase: TimeBase,
    exchange: Arc<StatusExchange>,
    event_logger: Option<Arc<EventLogger>>,
    stop: Arc<AtomicBool>,
) -> FanStats {
    let rig = if config.simulate_stall {
        SimulatedFan::stalled()
    } else {
        SimulatedFan::with_rpm(config.fan_rpm)
    };
    let rig = rig.realtime();

    let fan_config = FanConfig {
        enabled: config.fan_enabled,
        drive_duty: config.duty,
        ..FanConfig::default()
    };
    let sink: Box<dyn FaultSink> = Box::new(EventLogFault::new(event_logger.clone(), timebase));
    let mut fan = FanTest::new(rig.clone(), rig, fan_config, sink);

    // Prime while the rest of the process is still coming up, then verify.
    fan.begin_cycle();
    fan.init();
    record_verdict(fan.verdict(), fan.last_rpm(), event_logger.as_deref(), &timebase);
    exchange.publish_status(fan.snapshot(timebase.now_us()));

    let mut last_tick_us = timebase.now_us();
    let mut last_retest = Instant::now();
    let mut last_command_us = 0u64;

    while !stop.load(std::sync::atomic::Ordering::Relaxed) {
        thread::sleep(TICK_INTERVAL);

        let now_us = timebase.now_us();
        fan.tick(now_us.saturating_sub(last_tick_us));
        last_tick_us = now_us;

        if let Some(command) = exchange.get_duty(now_us) {
            if command.timestamp_us != last_command_us {
                last_command_us = command.timestamp_us;
                if command.duty != fan.drive_duty() {
                    info!(duty = command.duty, "Applying duty command");
                    fan.set_drive_duty(command.duty);
                    if let Some(logger) = event_logger.as_deref() {
                        let _ = logger.log_event(
                            now_us,
                            timebase.unix_us(),
                            EventKind::DutyChange,
                            serde_json::json!({ "duty": command.duty }),
                        );
                    }
                }
            }
        }

        if let Some(secs) = config.retest_secs {
            if last_retest.elapsed() >= Duration::from_secs(secs) {
                fan.begin_cycle();
                fan.run_cycle();
                record_verdict(
                    fan.verdict(),
                    fan.last_rpm(),
                    event_logger.as_deref(),
                    &timebase,
                );
                last_retest = Instant::now();
            }
        }

        exchange.publish_status(fan.snapshot(timebase.now_us()));
    }

    fan.stats().clone()
}

fn record_verdict(
    verdict: TestResult,
    rpm: u32,
    logger: Option<&EventLogger>,
    timebase: &TimeBase,
) {
    let kind = match verdict {
        TestResult::Ok => {
            info!(rpm, "Fan verification passed");
            EventKind::FanTestPassed
        }
        TestResult::Skipped => {
            info!("Fan verification skipped");
            EventKind::FanTestSkipped
        }
        // The failure already went through the fault sink.
        TestResult::Failed => return,
    };
    if let Some(logger) = logger {
        let _ = logger.log_event(
            timebase.now_us(),
            timebase.unix_us(),
            kind,
            serde_json::json!({ "rpm": rpm }),
        );
    }
}

fn init_event_logger(event_path: Option<&PathBuf>) -> Option<Arc<EventLogger>> {
    event_path.map(|path| match EventLogger::new(path) {
        Ok(logger) => {
            info!(path = %path.display(), "Event logging enabled");
            Arc::new(logger)
        }
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Failed to initialize event logger");
            panic!("Event logging requested but failed to initialize: {}", e);
        }
    })
}
