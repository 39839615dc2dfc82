// 🧱 Chunked Ingestion Controller - one transaction per chunk
//
// The source is streamed in consecutive chunks of `chunk_size` rows. Each
// chunk is validated and committed on its own; there is no transaction
// spanning chunks, so chunks committed before a failure stay committed.
// Rejected rows of the whole run go to a single error log at the end.

use crate::db::{EntityStore, LoadRun};
use crate::entities::EntityKind;
use crate::error::{IngestError, Result};
use crate::error_sink::ErrorSink;
use crate::loader::partition;
use crate::source::{SourceReader, SourceRow};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, error, info, instrument, warn};

/// Error lines returned inline; the rest is only in the log file
pub const ERROR_SAMPLE_LIMIT: usize = 10;

pub const DEFAULT_CHUNK_SIZE: usize = 100;

// ============================================================================
// OPTIONS
// ============================================================================

/// What happens when committing a chunk fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitFailurePolicy {
    /// Stop the run and return the error. Earlier chunks stay committed.
    #[default]
    Abort,

    /// Count the chunk's rows as failed, log them, and go on with the next chunk
    Isolate,
}

impl FromStr for CommitFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(CommitFailurePolicy::Abort),
            "isolate" | "continue" => Ok(CommitFailurePolicy::Isolate),
            other => Err(format!("Invalid commit failure policy: {}", other)),
        }
    }
}

impl fmt::Display for CommitFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitFailurePolicy::Abort => write!(f, "abort"),
            CommitFailurePolicy::Isolate => write!(f, "isolate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    pub chunk_size: usize,
    pub on_commit_failure: CommitFailurePolicy,
}

impl ChunkOptions {
    pub fn new(chunk_size: usize) -> Self {
        ChunkOptions {
            chunk_size,
            on_commit_failure: CommitFailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CommitFailurePolicy) -> Self {
        self.on_commit_failure = policy;
        self
    }
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

// ============================================================================
// SUMMARY
// ============================================================================

/// Running totals of a chunked load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkedSummary {
    pub run_id: String,
    pub kind: EntityKind,
    pub inserted: usize,
    pub failed: usize,

    /// First failed raw lines, in file order
    #[serde(rename = "errors")]
    pub error_sample: Vec<String>,

    /// Chunks processed
    pub chunks: usize,

    /// Chunks whose commit failed (only with `CommitFailurePolicy::Isolate`)
    pub failed_chunks: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_log: Option<PathBuf>,
}

impl ChunkedSummary {
    fn new(run_id: String, kind: EntityKind) -> Self {
        ChunkedSummary {
            run_id,
            kind,
            inserted: 0,
            failed: 0,
            error_sample: Vec::new(),
            chunks: 0,
            failed_chunks: 0,
            error_log: None,
        }
    }

    /// Chunks whose transaction was committed
    pub fn committed_chunks(&self) -> usize {
        self.chunks - self.failed_chunks
    }

    fn reject(&mut self, sink: &mut ErrorSink, row: &SourceRow) {
        self.failed += 1;
        if self.error_sample.len() < ERROR_SAMPLE_LIMIT {
            self.error_sample.push(row.raw.clone());
        }
        sink.record(row.raw.as_str());
    }
}

/// Error log context for a chunked run, e.g. `employees_full_batch_100`
pub fn batch_context(kind: EntityKind, chunk_size: usize) -> String {
    format!("{}_full_batch_{}", kind.plural(), chunk_size)
}

// ============================================================================
// LOAD
// ============================================================================

/// Load `path` as `kind` in chunks of `options.chunk_size` rows
#[instrument(
    skip_all,
    fields(kind = %kind, path = %path.display(), chunk_size = options.chunk_size)
)]
pub fn load_chunked<S: EntityStore + ?Sized>(
    store: &mut S,
    sink: &mut ErrorSink,
    path: &Path,
    kind: EntityKind,
    options: ChunkOptions,
) -> Result<ChunkedSummary> {
    let chunk_size = options.chunk_size;
    if chunk_size == 0 {
        return Err(IngestError::InvalidChunkSize(chunk_size));
    }

    let mut reader = SourceReader::open(path)?;
    let mut run = LoadRun::new(kind, format!("chunked:{}", chunk_size), path);
    let mut summary = ChunkedSummary::new(run.run_id.clone(), kind);

    loop {
        let rows = match reader.next_chunk(chunk_size) {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, chunk = summary.chunks, "Source read failed mid-run");
                sink.clear();
                return Err(e);
            }
        };
        if rows.is_empty() {
            break;
        }

        let chunk = summary.chunks;
        let batch = partition(&rows, kind);

        match store.merge_and_commit(&batch.entities) {
            Ok(_) => {
                summary.inserted += batch.entities.len();
                for row in &batch.rejected {
                    summary.reject(sink, row);
                }
                debug!(
                    chunk,
                    rows = rows.len(),
                    inserted = batch.entities.len(),
                    failed = batch.rejected.len(),
                    "Chunk committed"
                );
            }
            Err(e)
                if options.on_commit_failure == CommitFailurePolicy::Isolate
                    && e.is_storage_failure() =>
            {
                warn!(chunk, error = %e, rows = rows.len(), "Chunk commit failed, continuing");
                summary.failed_chunks += 1;
                for row in &rows {
                    summary.reject(sink, row);
                }
            }
            Err(e) => {
                error!(
                    chunk,
                    error = %e,
                    committed = summary.chunks,
                    "Chunk commit failed, run aborted"
                );
                sink.clear();
                return Err(e);
            }
        }

        summary.chunks += 1;
    }

    summary.error_log = sink.flush(&batch_context(kind, chunk_size))?;

    run.source_checksum = reader.checksum();
    run.inserted = summary.inserted;
    run.failed = summary.failed;
    run.error_log = summary.error_log.as_ref().map(|p| p.display().to_string());
    run.finished_at = Utc::now();
    store.record_run(&run)?;

    info!(
        run_id = %run.run_id,
        inserted = summary.inserted,
        failed = summary.failed,
        chunks = summary.chunks,
        failed_chunks = summary.failed_chunks,
        "Chunked load complete"
    );

    Ok(summary)
}

/// Chunked load of the hired employees file with the default failure policy
pub fn load_employees_chunked<S: EntityStore + ?Sized>(
    store: &mut S,
    sink: &mut ErrorSink,
    path: &Path,
    chunk_size: usize,
) -> Result<ChunkedSummary> {
    load_chunked(store, sink, path, EntityKind::Employee, ChunkOptions::new(chunk_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_employees, open_in_memory, verify_count};
    use crate::entities::{Department, Entity, Job};
    use crate::error_sink::{FixedClock, MemorySink};
    use chrono::NaiveDate;
    use rusqlite::Connection;
    use std::fs;

    /// Records batch sizes instead of writing anywhere
    #[derive(Default)]
    struct RecordingStore {
        commits: Vec<usize>,
        runs: Vec<LoadRun>,
    }

    impl EntityStore for RecordingStore {
        fn merge_and_commit(&mut self, entities: &[Entity]) -> Result<usize> {
            self.commits.push(entities.len());
            Ok(entities.len())
        }

        fn record_run(&mut self, run: &LoadRun) -> Result<()> {
            self.runs.push(run.clone());
            Ok(())
        }
    }

    fn sink(files: &MemorySink) -> ErrorSink {
        let now = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        ErrorSink::with_parts("logs", files.clone(), FixedClock(now))
    }

    fn employee_line(id: usize, department_id: i64) -> String {
        format!("{},Person {},2021-03-{:02}T10:00:00Z,{},1\n", id, id, id % 28 + 1, department_id)
    }

    fn seeded_conn() -> Connection {
        let mut conn = open_in_memory().unwrap();
        conn.merge_and_commit(&[
            Department::new(1, "Eng").into(),
            Job::new(1, "Developer").into(),
        ])
        .unwrap();
        conn
    }

    #[test]
    fn test_250_rows_in_chunks_of_100() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hired_employees.csv");
        fs::write(&path, (1..=250).map(|i| employee_line(i, 1)).collect::<String>()).unwrap();

        let files = MemorySink::new();
        let mut store = RecordingStore::default();
        let summary = load_employees_chunked(&mut store, &mut sink(&files), &path, 100).unwrap();

        assert_eq!(store.commits, vec![100, 100, 50]);
        assert_eq!(summary.inserted, 250);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.chunks, 3);
        assert_eq!(summary.committed_chunks(), 3);
        assert_eq!(store.runs.len(), 1);
        assert_eq!(store.runs[0].mode, "chunked:100");
    }

    #[test]
    fn test_even_split_last_chunk_is_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hired_employees.csv");
        fs::write(&path, (1..=20).map(|i| employee_line(i, 1)).collect::<String>()).unwrap();

        let files = MemorySink::new();
        let mut store = RecordingStore::default();
        load_employees_chunked(&mut store, &mut sink(&files), &path, 5).unwrap();

        assert_eq!(store.commits, vec![5, 5, 5, 5]);
    }

    #[test]
    fn test_error_sample_is_capped_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hired_employees.csv");
        let contents: String = (1..=30)
            .map(|i| {
                if i % 2 == 0 {
                    format!("{},Person {},not-a-date,1,1\n", i, i)
                } else {
                    employee_line(i, 1)
                }
            })
            .collect();
        fs::write(&path, &contents).unwrap();

        let files = MemorySink::new();
        let mut store = RecordingStore::default();
        let summary = load_employees_chunked(&mut store, &mut sink(&files), &path, 7).unwrap();

        assert_eq!(summary.inserted, 15);
        assert_eq!(summary.failed, 15);
        assert_eq!(summary.error_sample.len(), ERROR_SAMPLE_LIMIT);
        assert_eq!(summary.error_sample[0], "2,Person 2,not-a-date,1,1");

        let log_path = summary.error_log.clone().unwrap();
        assert_eq!(
            log_path,
            Path::new("logs/error_log_employees_full_batch_7_20240501_093000.csv")
        );
        let log = files.read_to_string(&log_path).unwrap();
        let logged: Vec<&str> = log.lines().collect();
        assert_eq!(logged.len(), 15);
        assert_eq!(&logged[..ERROR_SAMPLE_LIMIT], summary.error_sample.as_slice());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let files = MemorySink::new();
        let mut store = RecordingStore::default();
        let result = load_employees_chunked(
            &mut store,
            &mut sink(&files),
            Path::new("hired_employees.csv"),
            0,
        );
        assert!(matches!(result, Err(IngestError::InvalidChunkSize(0))));
        assert!(store.commits.is_empty());
    }

    #[test]
    fn test_abort_keeps_earlier_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hired_employees.csv");
        // chunk 2 references a department that does not exist
        let contents = [employee_line(1, 1), employee_line(2, 1), employee_line(3, 9), employee_line(4, 1), employee_line(5, 1)]
            .concat();
        fs::write(&path, contents).unwrap();

        let files = MemorySink::new();
        let mut conn = seeded_conn();
        let result = load_chunked(
            &mut conn,
            &mut sink(&files),
            &path,
            EntityKind::Employee,
            ChunkOptions::new(2),
        );

        assert!(matches!(result, Err(IngestError::StorageCommit(_))));
        let ids: Vec<i64> = get_employees(&conn).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(files.files().is_empty());
    }

    #[test]
    fn test_isolate_continues_after_failed_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hired_employees.csv");
        let contents = [employee_line(1, 1), employee_line(2, 1), employee_line(3, 9), employee_line(4, 1), employee_line(5, 1)]
            .concat();
        fs::write(&path, contents).unwrap();

        let files = MemorySink::new();
        let mut conn = seeded_conn();
        let summary = load_chunked(
            &mut conn,
            &mut sink(&files),
            &path,
            EntityKind::Employee,
            ChunkOptions::new(2).with_policy(CommitFailurePolicy::Isolate),
        )
        .unwrap();

        assert_eq!(summary.chunks, 3);
        assert_eq!(summary.failed_chunks, 1);
        assert_eq!(summary.committed_chunks(), 2);
        assert_eq!(summary.inserted, 3);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.inserted + summary.failed, 5);
        assert_eq!(verify_count(&conn, EntityKind::Employee).unwrap(), 3);

        let ids: Vec<i64> = get_employees(&conn).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 5]);
        assert_eq!(summary.error_sample.len(), 2);
        assert!(summary.error_sample[0].starts_with("3,"));
        assert!(summary.error_sample[1].starts_with("4,"));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("abort".parse::<CommitFailurePolicy>().unwrap(), CommitFailurePolicy::Abort);
        assert_eq!("Isolate".parse::<CommitFailurePolicy>().unwrap(), CommitFailurePolicy::Isolate);
        assert!("retry".parse::<CommitFailurePolicy>().is_err());
    }

    #[test]
    fn test_summary_serializes_errors_field() {
        let summary = ChunkedSummary::new("run".to_string(), EntityKind::Employee);
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("errors").is_some());
        assert!(json.get("error_log").is_none());
    }
}
