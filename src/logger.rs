//! Logging setup.

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Parse a level name, defaulting to INFO
pub fn level_from_str(level: &str) -> Level {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" | "critical" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize the global subscriber.
///
/// `RUST_LOG` wins over `level`. Calling this again is a no-op.
pub fn init_logger(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_from_str(level).to_string()));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_str() {
        assert_eq!(level_from_str("debug"), Level::DEBUG);
        assert_eq!(level_from_str("WARNING"), Level::WARN);
        assert_eq!(level_from_str("critical"), Level::ERROR);
        assert_eq!(level_from_str("bogus"), Level::INFO);
    }

    #[test]
    fn test_init_twice() {
        init_logger("debug");
        init_logger("info");
    }
}
