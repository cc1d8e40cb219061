use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn file_appender(config: &AppConfig) -> RollingFileAppender {
    match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    }
}

/// Directive string for the configured level. sqlx logs every statement at
/// info, so it is capped at warn.
fn filter_directives(log_level: &str) -> String {
    format!("{},sqlx=warn", log_level)
}

/// Install the global subscriber: a rolling file appender plus, in text
/// mode, a colored stdout layer. `RUST_LOG` overrides `log_level`.
///
/// Keep the returned guard alive for the life of the process or buffered
/// lines are lost on exit.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender(config));

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(&config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).init();
    }

    tracing::info!(
        level = %config.log_level,
        json = config.use_json,
        rotation = %config.rotation,
        "Logging initialized"
    );
    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives_parse() {
        let directives = filter_directives("debug");
        assert!(directives.starts_with("debug,"));
        assert!(EnvFilter::try_new(directives).is_ok());
    }
}
