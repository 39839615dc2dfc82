//! Runtime configuration for the CLI and the API server.
//!
//! Environment variables:
//! - `INGEST_DB_PATH`: SQLite database file
//! - `INGEST_DATA_DIR`: directory holding the source CSV files
//! - `INGEST_ERROR_LOG_DIR`: where error logs are written (defaults to the data dir)
//! - `INGEST_CHUNK_SIZE`: default chunk size for chunked loads
//! - `INGEST_MAX_CHUNK_SIZE`: largest chunk size a caller may ask for
//! - `INGEST_ON_COMMIT_FAILURE`: `abort` or `isolate`
//! - `INGEST_BIND_ADDR`: API server listen address

use crate::chunked::{ChunkOptions, CommitFailurePolicy, DEFAULT_CHUNK_SIZE};
use crate::entities::EntityKind;
use crate::error::{IngestError, Result};
use crate::error_sink::ErrorSink;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    pub database_path: PathBuf,
    pub data_dir: PathBuf,
    pub error_log_dir: PathBuf,
    pub default_chunk_size: usize,
    pub max_chunk_size: usize,
    pub on_commit_failure: CommitFailurePolicy,
    pub bind_addr: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/hires.db"),
            data_dir: PathBuf::from("data"),
            error_log_dir: PathBuf::from("data"),
            default_chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunk_size: 1000,
            on_commit_failure: CommitFailurePolicy::Abort,
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl IngestConfig {
    /// Defaults overridden by whatever `INGEST_*` variables are set
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`IngestConfig::from_env`] with an explicit variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("INGEST_DB_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(dir) = lookup("INGEST_DATA_DIR") {
            config.data_dir = PathBuf::from(&dir);
            config.error_log_dir = PathBuf::from(dir);
        }

        if let Some(dir) = lookup("INGEST_ERROR_LOG_DIR") {
            config.error_log_dir = PathBuf::from(dir);
        }

        if let Some(size) = lookup("INGEST_CHUNK_SIZE") {
            config.default_chunk_size = parse_size("INGEST_CHUNK_SIZE", &size)?;
        }

        if let Some(size) = lookup("INGEST_MAX_CHUNK_SIZE") {
            config.max_chunk_size = parse_size("INGEST_MAX_CHUNK_SIZE", &size)?;
        }

        if let Some(policy) = lookup("INGEST_ON_COMMIT_FAILURE") {
            config.on_commit_failure = policy.parse().map_err(IngestError::Config)?;
        }

        if let Some(addr) = lookup("INGEST_BIND_ADDR") {
            config.bind_addr = addr;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_chunk_size > self.max_chunk_size {
            return Err(IngestError::Config(format!(
                "default chunk size {} exceeds maximum {}",
                self.default_chunk_size, self.max_chunk_size
            )));
        }
        Ok(())
    }

    /// Source file for a kind inside the data directory
    pub fn source_path(&self, kind: EntityKind) -> PathBuf {
        self.data_dir.join(kind.default_file_name())
    }

    /// Fresh filesystem error sink for one load call
    pub fn error_sink(&self) -> ErrorSink {
        ErrorSink::new(&self.error_log_dir)
    }

    /// Chunk options for a requested size, falling back to the default
    ///
    /// Sizes outside `1..=max_chunk_size` are a configuration error.
    pub fn chunk_options(&self, requested: Option<usize>) -> Result<ChunkOptions> {
        let size = requested.unwrap_or(self.default_chunk_size);
        if size == 0 || size > self.max_chunk_size {
            return Err(IngestError::Config(format!(
                "chunk size must be between 1 and {}, got {}",
                self.max_chunk_size, size
            )));
        }
        Ok(ChunkOptions::new(size).with_policy(self.on_commit_failure))
    }
}

fn parse_size(key: &str, value: &str) -> Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(IngestError::Config(format!(
            "{} must be a positive integer, got {:?}",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = IngestConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, IngestConfig::default());
        assert_eq!(config.source_path(EntityKind::Employee), PathBuf::from("data/hired_employees.csv"));
    }

    #[test]
    fn test_data_dir_moves_error_logs_too() {
        let config = IngestConfig::from_lookup(lookup(&[("INGEST_DATA_DIR", "/srv/hires")])).unwrap();
        assert_eq!(config.error_log_dir, PathBuf::from("/srv/hires"));

        let config = IngestConfig::from_lookup(lookup(&[
            ("INGEST_DATA_DIR", "/srv/hires"),
            ("INGEST_ERROR_LOG_DIR", "/var/log/hires"),
        ]))
        .unwrap();
        assert_eq!(config.error_log_dir, PathBuf::from("/var/log/hires"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(IngestConfig::from_lookup(lookup(&[("INGEST_CHUNK_SIZE", "0")])).is_err());
        assert!(IngestConfig::from_lookup(lookup(&[("INGEST_CHUNK_SIZE", "2000")])).is_err());
        assert!(IngestConfig::from_lookup(lookup(&[("INGEST_ON_COMMIT_FAILURE", "retry")])).is_err());
    }

    #[test]
    fn test_chunk_options_bounds() {
        let config = IngestConfig::from_lookup(lookup(&[("INGEST_ON_COMMIT_FAILURE", "isolate")])).unwrap();

        let options = config.chunk_options(None).unwrap();
        assert_eq!(options.chunk_size, 100);
        assert_eq!(options.on_commit_failure, CommitFailurePolicy::Isolate);

        assert_eq!(config.chunk_options(Some(1000)).unwrap().chunk_size, 1000);
        assert!(config.chunk_options(Some(0)).is_err());
        assert!(config.chunk_options(Some(1001)).is_err());
    }
}
