use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber with optional JSON output and an
/// optional file copy of the logs. The returned guard must be held for the
/// lifetime of the process so the file writer flushes on shutdown.
pub fn init_tracing(json_output: bool, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fanward=debug,fanward_io=debug,core_rotor=debug"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let name = path.file_name().map(|n| n.to_os_string());
            let appender = tracing_appender::rolling::never(
                dir.unwrap_or_else(|| Path::new(".")),
                name.unwrap_or_else(|| "fanward.log".into()),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let base = tracing_subscriber::registry().with(filter).with(file_layer);

    if json_output {
        base.with(fmt::layer().json()).init();
    } else {
        base.with(fmt::layer().pretty()).init();
    }

    guard
}
