//! Logging setup for the binary

use anyhow::{anyhow, Result};
use devbridge_core::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Filter directive covering the binary and the library crates
pub fn filter_directive(level: &str) -> String {
    format!(
        "{}={level},devbridge_sync={level},devbridge_core={level}",
        env!("CARGO_PKG_NAME")
    )
}

/// Initialize logging system
///
/// `RUST_LOG` wins over both the configured level and `--verbose`.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.format == "compact" {
        builder.compact().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| anyhow!("Failed to initialize logging: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_names_every_crate() {
        assert_eq!(
            filter_directive("debug"),
            "devbridge=debug,devbridge_sync=debug,devbridge_core=debug"
        );
    }
}
