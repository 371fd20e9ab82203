//! Tracing subscriber setup

use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Filter directive for the configured level
///
/// `verbose` raises this crate to debug regardless of the configured level.
#[must_use]
pub fn default_directive(config: &LoggingConfig, verbose: bool) -> String {
    if verbose {
        format!("{},geotally=debug", config.level)
    } else {
        config.level.clone()
    }
}

/// Install the global subscriber, writing to stderr
///
/// `RUST_LOG` takes precedence over the configured level. Calling this more
/// than once is a no-op.
pub fn init(config: &LoggingConfig, verbose: bool) {
    let directive = default_directive(config, verbose);
    let json = config.format == "json";

    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive));

        if json {
            tracing_subscriber::registry()
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .with(filter)
                .try_init()
                .ok();
        } else {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .with(filter)
                .try_init()
                .ok();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logging(level: &str) -> LoggingConfig {
        LoggingConfig {
            level: level.to_string(),
            format: "pretty".to_string(),
        }
    }

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(&logging("warn"), false), "warn");
        assert_eq!(
            default_directive(&logging("warn"), true),
            "warn,geotally=debug"
        );
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(&logging("info"), false);
        init(&logging("debug"), true);
    }
}
