//! Logging setup shared by the CLI and the API server.
//!
//! Library code logs through `tracing` macros only and never prints. The
//! binaries call [`init_logging`] once at startup.
//!
//! Environment variables:
//! - `LOG_LEVEL`: trace, debug, info, warn, error
//! - `LOG_FORMAT`: text or json
//! - `LOG_FILTER`: extra filter directives (e.g. "hire_ingest=debug,tower_http=warn")

use anyhow::{anyhow, Context, Result};
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    /// One JSON object per event instead of text lines
    pub json: bool,
    /// Additional filter directives, comma separated
    pub filter_directives: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig::with_level(Level::INFO)
    }
}

impl LogConfig {
    pub fn with_level(level: Level) -> Self {
        LogConfig {
            level,
            json: false,
            filter_directives: None,
        }
    }

    /// Start from `self` and apply `LOG_*` environment overrides
    pub fn merge_env(self) -> Result<Self> {
        self.merge_lookup(|key| std::env::var(key).ok())
    }

    fn merge_lookup<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("LOG_LEVEL") {
            self.level = level
                .trim()
                .parse()
                .map_err(|_| anyhow!("Invalid log level: {}", level))?;
        }

        if let Some(format) = lookup("LOG_FORMAT") {
            self.json = match format.trim().to_lowercase().as_str() {
                "json" => true,
                "text" => false,
                _ => return Err(anyhow!("Invalid log format: {}", format)),
            };
        }

        if let Some(filter) = lookup("LOG_FILTER") {
            self.filter_directives = Some(filter);
        }

        Ok(self)
    }

    /// Build the filter: `RUST_LOG`, then the level, then extra directives
    pub fn env_filter(&self) -> Result<EnvFilter> {
        let mut filter =
            EnvFilter::from_default_env().add_directive(LevelFilter::from_level(self.level).into());

        if let Some(ref directives) = self.filter_directives {
            for directive in directives.split(',').filter(|d| !d.trim().is_empty()) {
                filter = filter.add_directive(
                    directive
                        .trim()
                        .parse()
                        .context("Failed to parse filter directive")?,
                );
            }
        }

        Ok(filter)
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = config.env_filter()?;

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .context("Failed to initialize logging")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .try_init()
            .context("Failed to initialize logging")?;
    }

    Ok(())
}
