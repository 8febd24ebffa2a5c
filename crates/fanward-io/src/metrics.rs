//! Prometheus metrics for the fan verification runtime.

use core_rotor::tags;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Fan State Metrics
// ============================================================================

/// Last measured fan speed in RPM (zero after a failed cycle)
pub static FAN_RPM: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new(
        tags::FAN_RPM.metric,
        "Last measured fan speed in RPM (zero after a failed cycle)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Configured fan drive duty level (0-255)
pub static FAN_DUTY: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new(
        tags::FAN_DUTY.metric,
        "Configured fan drive duty level (0-255)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Last verification verdict (0=ok, 1=failed, 2=skipped)
pub static TEST_VERDICT: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        tags::TEST_VERDICT.metric,
        "Last verification verdict (0=ok, 1=failed, 2=skipped)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Verification Cycle Metrics
// ============================================================================

/// Total verification cycles run
pub static TESTS_RUN: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(tags::TESTS_RUN.metric, "Total verification cycles run").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Verification cycles that failed to capture both edges in budget
pub static TESTS_FAILED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        tags::TESTS_FAILED.metric,
        "Verification cycles that failed to capture both edges in budget",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Verification cycles skipped because the fan feature is disabled
pub static TESTS_SKIPPED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        tags::TESTS_SKIPPED.metric,
        "Verification cycles skipped because the fan feature is disabled",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Bridge Metrics
// ============================================================================

/// Bridge client connection status (1 = connected, 0 = disconnected)
pub static BRIDGE_CONNECTED: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        "fanward_bridge_connected",
        "Bridge client connection status (1=connected, 0=disconnected)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Duty commands accepted from the bridge
pub static DUTY_COMMANDS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "fanward_duty_commands_total",
        "Duty commands accepted from the bridge",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Duty commands rejected (version, handshake or sequence)
pub static DUTY_REJECTED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "fanward_duty_rejected_total",
        "Duty commands rejected due to version, handshake or sequence checks",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            let path = request.url();

            match path {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let metric_families = REGISTRY.gather();
                    let mut buffer = Vec::new();

                    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        let _ = request.respond(
                            Response::from_string("Internal Server Error").with_status_code(500),
                        );
                        continue;
                    }

                    let response = Response::from_data(buffer).with_header(
                        tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/plain; version=0.0.4"[..],
                        )
                        .unwrap(),
                    );
                    let _ = request.respond(response);
                }
                "/health" => {
                    let _ = request.respond(Response::from_string("OK"));
                }
                "/ready" => {
                    // Ready once at least one verification cycle has run
                    if TESTS_RUN.get() > 0 {
                        let _ = request.respond(Response::from_string("Ready"));
                    } else {
                        let _ = request
                            .respond(Response::from_string("Not Ready").with_status_code(503));
                    }
                }
                _ => {
                    let _ =
                        request.respond(Response::from_string("Not Found").with_status_code(404));
                }
            }
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    // Touch each metric to force initialization
    let _ = FAN_RPM.get();
    let _ = FAN_DUTY.get();
    let _ = TEST_VERDICT.get();
    let _ = TESTS_RUN.get();
    let _ = TESTS_FAILED.get();
    let _ = TESTS_SKIPPED.get();
    let _ = BRIDGE_CONNECTED.get();
    let _ = DUTY_COMMANDS.get();
    let _ = DUTY_REJECTED.get();
}
