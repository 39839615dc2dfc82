// 🗂️ Error Sink - malformed rows captured verbatim, one log file per flush
//
// Log file name: error_log_<context>_<YYYYMMDD_HHMMSS>.csv
// Two flushes with the same context inside the same second get a counter
// suffix (_1, _2, ...). Files are always created new, never overwritten.

use crate::error::{IngestError, Result};
use chrono::{Local, NaiveDateTime};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Upper bound on counter suffixes tried for one flush
const MAX_NAME_ATTEMPTS: usize = 1000;

// ============================================================================
// CLOCK
// ============================================================================

/// Wall-clock source for log timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Always returns the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

// ============================================================================
// FILE SINK
// ============================================================================

/// Storage medium for error logs
pub trait FileSink: Send + Sync {
    /// Write `contents` to a new file at `path`
    ///
    /// Must fail with `io::ErrorKind::AlreadyExists` if the file exists.
    fn create_new(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// Local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSink;

impl FileSink for FsSink {
    fn create_new(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(contents)?;
        file.flush()
    }
}

/// In-memory files, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    files: Arc<Mutex<BTreeMap<PathBuf, Vec<u8>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every file written so far
    pub fn files(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Contents of one file as text
    pub fn read_to_string(&self, path: &Path) -> Option<String> {
        self.files()
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

impl FileSink for MemorySink {
    fn create_new(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut files = self
            .files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if files.contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            ));
        }

        files.insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }
}

// ============================================================================
// ERROR SINK
// ============================================================================

/// Accumulates raw lines of rejected rows for one load call
pub struct ErrorSink {
    dir: PathBuf,
    rows: Vec<String>,
    file_sink: Box<dyn FileSink>,
    clock: Box<dyn Clock>,
}

impl ErrorSink {
    /// Sink writing to `dir` on the local filesystem, stamped with local time
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_parts(dir, FsSink, LocalClock)
    }

    pub fn with_parts(
        dir: impl Into<PathBuf>,
        file_sink: impl FileSink + 'static,
        clock: impl Clock + 'static,
    ) -> Self {
        ErrorSink {
            dir: dir.into(),
            rows: Vec::new(),
            file_sink: Box::new(file_sink),
            clock: Box::new(clock),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keep a raw line for the next flush
    pub fn record(&mut self, raw_line: impl Into<String>) {
        self.rows.push(raw_line.into());
    }

    /// Lines recorded since the last flush, in record order
    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Drop everything recorded without writing a log
    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Write accumulated lines to a new log file and clear them
    ///
    /// # Returns
    /// * `Ok(None)` - Nothing recorded, no file created
    /// * `Ok(Some(path))` - Path of the log that was written
    pub fn flush(&mut self, context: &str) -> Result<Option<PathBuf>> {
        if self.rows.is_empty() {
            debug!(context, "No rejected rows, skipping error log");
            return Ok(None);
        }

        let stamp = self.clock.now().format("%Y%m%d_%H%M%S");
        let base = format!("error_log_{}_{}", context, stamp);

        let mut contents = String::with_capacity(self.rows.iter().map(|r| r.len() + 1).sum());
        for row in &self.rows {
            contents.push_str(row);
            contents.push('\n');
        }

        let mut last_path = self.dir.join(format!("{}.csv", base));
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = if attempt == 0 {
                self.dir.join(format!("{}.csv", base))
            } else {
                self.dir.join(format!("{}_{}.csv", base, attempt))
            };

            match self.file_sink.create_new(&path, contents.as_bytes()) {
                Ok(()) => {
                    info!(
                        context,
                        path = %path.display(),
                        rows = self.rows.len(),
                        "Wrote error log"
                    );
                    self.rows.clear();
                    return Ok(Some(path));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "Error log name taken, trying next suffix");
                    last_path = path;
                }
                Err(source) => return Err(IngestError::ErrorLogWrite { path, source }),
            }
        }

        Err(IngestError::ErrorLogWrite {
            path: last_path,
            source: io::Error::new(
                io::ErrorKind::AlreadyExists,
                "no free error log name left for this second",
            ),
        })
    }
}

impl std::fmt::Debug for ErrorSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorSink")
            .field("dir", &self.dir)
            .field("rows", &self.rows.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(12, 5, 7)
            .unwrap()
    }

    #[test]
    fn test_flush_empty_creates_nothing() {
        let files = MemorySink::new();
        let mut sink = ErrorSink::with_parts("data", files.clone(), FixedClock(noon()));

        assert_eq!(sink.flush("departments").unwrap(), None);
        assert!(files.files().is_empty());
    }

    #[test]
    fn test_flush_writes_verbatim_lines_and_clears() {
        let files = MemorySink::new();
        let mut sink = ErrorSink::with_parts("data", files.clone(), FixedClock(noon()));

        sink.record(",Bad");
        sink.record("x,  spaced  ");
        let path = sink.flush("departments").unwrap().unwrap();

        assert_eq!(path, Path::new("data/error_log_departments_20240309_120507.csv"));
        assert_eq!(files.read_to_string(&path).unwrap(), ",Bad\nx,  spaced  \n");
        assert!(sink.is_empty());
    }

    #[test]
    fn test_same_second_flushes_do_not_collide() {
        let files = MemorySink::new();
        let mut sink = ErrorSink::with_parts("logs", files.clone(), FixedClock(noon()));

        sink.record("a");
        let first = sink.flush("jobs").unwrap().unwrap();
        sink.record("b");
        let second = sink.flush("jobs").unwrap().unwrap();

        assert_ne!(first, second);
        assert_eq!(second, Path::new("logs/error_log_jobs_20240309_120507_1.csv"));
        assert_eq!(files.files().len(), 2);
    }

    #[test]
    fn test_fs_sink_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("log.csv");

        FsSink.create_new(&path, b"first\n").unwrap();
        let err = FsSink.create_new(&path, b"second\n").unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\n");
    }

    #[test]
    fn test_clear_discards_rows() {
        let files = MemorySink::new();
        let mut sink = ErrorSink::with_parts("data", files.clone(), FixedClock(noon()));

        sink.record("1,,");
        sink.clear();

        assert_eq!(sink.flush("employees").unwrap(), None);
        assert!(files.files().is_empty());
    }
}
