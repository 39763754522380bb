use super::config::{LogFormat, LoggingConfig};
use tracing::Level;

/// Install the global tracing subscriber described by `config`.
/// Fails if a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let log_level = config
        .level
        .trim()
        .parse::<Level>()
        .map_err(|e| anyhow::anyhow!("invalid log level `{}`: {e}", config.level))?;
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level);

    let installed = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}
