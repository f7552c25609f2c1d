use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub struct FileLogGuard {
    _guard: WorkerGuard,
}

pub fn file_logging_enabled() -> bool {
    std::env::var("LEXITRAIN_FILE_LOGS")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Console output goes to stderr so JSON on stdout stays parseable.
pub fn init_tracing(log_level: &str) -> Option<FileLogGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    if file_logging_enabled() {
        match lexitrain_core::data_dir().map(|dir| dir.join("logs")) {
            Ok(log_dir) => {
                if let Err(err) = std::fs::create_dir_all(&log_dir) {
                    eprintln!("failed to create log directory {}: {err}", log_dir.display());
                } else {
                    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "lexitrain.log");
                    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
                    let file_layer = fmt::layer()
                        .with_writer(file_writer)
                        .with_ansi(false)
                        .with_target(true);

                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(stderr_layer)
                        .with(file_layer)
                        .init();

                    return Some(FileLogGuard { _guard: guard });
                }
            }
            Err(err) => eprintln!("file logging disabled: {err}"),
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();

    None
}
