pub mod config;
pub mod middleware;
pub mod paths;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use config::LogConfig;
pub use middleware::{access_log_middleware, request_id_middleware, RequestId};

/// Events emitted under this target go to the access log file and nowhere
/// else; everything else lands in the application log.
const ACCESS_LOG_TARGET: &str = "access_log";

/// Keeps the non-blocking file writers alive. Dropping this flushes and
/// closes the log files, so `main` holds it for the process lifetime.
#[derive(Default)]
pub struct LogGuards {
    _writers: Vec<WorkerGuard>,
}

/// Install the subscriber stack: a compact console layer always, plus JSON
/// file layers (request access log, application log) when file logging is
/// enabled in the config.
pub fn init_logging(config: &LogConfig) -> Result<LogGuards, Box<dyn std::error::Error>> {
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact()
        .with_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.console_log_level)),
        );

    let registry = tracing_subscriber::registry().with(console);

    let mut guards = LogGuards::default();
    let file_layers: Option<Box<dyn Layer<_> + Send + Sync>> = if config.file_logging_enabled {
        let log_dir = paths::get_log_directory(config.custom_log_dir.as_deref())?;

        let (access_writer, access_guard) = tracing_appender::non_blocking(
            tracing_appender::rolling::daily(&log_dir, "access.log"),
        );
        let (app_writer, app_guard) = tracing_appender::non_blocking(
            tracing_appender::rolling::daily(&log_dir, "application.log"),
        );
        guards._writers.push(access_guard);
        guards._writers.push(app_guard);

        let access = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(access_writer)
            .with_filter(filter_fn(|meta| meta.target() == ACCESS_LOG_TARGET));
        let app = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(app_writer)
            .with_filter(EnvFilter::new(&config.file_log_level))
            .with_filter(filter_fn(|meta| meta.target() != ACCESS_LOG_TARGET));

        Some(access.and_then(app).boxed())
    } else {
        None
    };

    registry.with(file_layers).init();

    tracing::info!(
        file_logging = config.file_logging_enabled,
        "logging initialized"
    );

    Ok(guards)
}
