//! Logging configuration
//!
//! Logs go to stderr so command output on stdout stays machine-readable.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingSettings;

/// Level and format after applying command-line overrides
pub fn resolve(settings: &LoggingSettings, level: Option<&str>, json: bool) -> (String, bool) {
    let level = level.unwrap_or(&settings.level).to_string();
    (level, json || settings.format.eq_ignore_ascii_case("json"))
}

/// Initialize logging with the specified level
pub fn init(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))?;
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))?;
    }

    Ok(())
}
