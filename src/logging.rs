// Logging subscriber initialisation. RUST_LOG wins over the configured level.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

fn build_env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},rusqlite=warn", default_level))
    })
}

/// Compact lines on stderr so stdout stays clean for command output
pub fn init_logging(default_level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .compact()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_env_filter(build_env_filter(default_level))
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {}", e))
}
