// 📥 Batch Loader - one source file, one transaction
//
// Flow: read whole file -> validate each row -> commit valid rows together
//       -> write rejected raw lines to the error log -> record the run

use crate::db::{EntityStore, LoadRun};
use crate::entities::{Entity, EntityKind};
use crate::error::Result;
use crate::error_sink::ErrorSink;
use crate::source::{read_all, SourceRow};
use crate::validator::{validate, Invalid};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument, warn};

// ============================================================================
// SUMMARY
// ============================================================================

/// Outcome of a full-file load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub run_id: String,
    pub kind: EntityKind,
    pub inserted: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_log: Option<PathBuf>,
}

impl LoadSummary {
    /// Rows seen in the source (blank lines excluded)
    pub fn total(&self) -> usize {
        self.inserted + self.failed
    }
}

// ============================================================================
// PARTITIONING
// ============================================================================

/// Rows of one unit of work split by validation outcome
pub(crate) struct Partition<'a> {
    /// Entities to merge, in file order
    pub entities: Vec<Entity>,
    /// Rows that failed validation, in file order
    pub rejected: Vec<&'a SourceRow>,
}

/// Parse and validate one source row
pub fn classify(row: &SourceRow, kind: EntityKind) -> std::result::Result<Entity, Invalid> {
    let fields = row.fields()?;
    validate(&fields, kind)
}

pub(crate) fn partition(rows: &[SourceRow], kind: EntityKind) -> Partition<'_> {
    let mut entities = Vec::with_capacity(rows.len());
    let mut rejected = Vec::new();

    for row in rows {
        match classify(row, kind) {
            Ok(entity) => entities.push(entity),
            Err(reason) => {
                warn!(line = row.line_number, %reason, "Rejected row");
                rejected.push(row);
            }
        }
    }

    Partition { entities, rejected }
}

// ============================================================================
// LOAD
// ============================================================================

/// Load every row of `path` as `kind`, committing once
///
/// Rejected rows never block valid ones; they end up in an error log named
/// after the kind (`error_log_departments_<timestamp>.csv`). A failed commit
/// aborts the call and nothing is reported as inserted.
#[instrument(skip_all, fields(kind = %kind, path = %path.display()))]
pub fn load_all<S: EntityStore + ?Sized>(
    store: &mut S,
    sink: &mut ErrorSink,
    path: &Path,
    kind: EntityKind,
) -> Result<LoadSummary> {
    let mut run = LoadRun::new(kind, "full", path);

    let source = read_all(path)?;
    run.source_checksum = source.checksum.clone();

    let batch = partition(&source.rows, kind);
    for row in &batch.rejected {
        sink.record(row.raw.as_str());
    }

    if let Err(e) = store.merge_and_commit(&batch.entities) {
        error!(error = %e, rows = batch.entities.len(), "Commit failed, load aborted");
        sink.clear();
        return Err(e);
    }

    let error_log = sink.flush(kind.plural())?;

    run.inserted = batch.entities.len();
    run.failed = batch.rejected.len();
    run.error_log = error_log.as_ref().map(|p| p.display().to_string());
    run.finished_at = Utc::now();
    store.record_run(&run)?;

    info!(
        run_id = %run.run_id,
        inserted = run.inserted,
        failed = run.failed,
        "Load complete"
    );

    Ok(LoadSummary {
        run_id: run.run_id,
        kind,
        inserted: run.inserted,
        failed: run.failed,
        error_log,
    })
}

/// Load departments, jobs and employees from `data_dir`, in that order
///
/// Employees go last so their department and job references can resolve.
pub fn load_everything<S: EntityStore + ?Sized>(
    store: &mut S,
    sink: &mut ErrorSink,
    data_dir: &Path,
) -> Result<Vec<LoadSummary>> {
    EntityKind::ALL
        .iter()
        .map(|kind| load_all(store, sink, &data_dir.join(kind.default_file_name()), *kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_department, get_load_runs, open_in_memory, verify_count};
    use crate::entities::Department;
    use crate::error::IngestError;
    use crate::error_sink::{FixedClock, MemorySink};
    use chrono::NaiveDate;
    use std::fs;

    fn sink(files: &MemorySink) -> ErrorSink {
        let now = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        ErrorSink::with_parts("logs", files.clone(), FixedClock(now))
    }

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_departments_with_one_bad_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "departments.csv", "1,Eng\n,Bad\n3,Sales\n");
        let files = MemorySink::new();
        let mut conn = open_in_memory().unwrap();

        let summary = load_all(&mut conn, &mut sink(&files), &path, EntityKind::Department).unwrap();

        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total(), 3);

        let log = summary.error_log.unwrap();
        assert_eq!(log, Path::new("logs/error_log_departments_20240501_093000.csv"));
        assert_eq!(files.read_to_string(&log).unwrap(), ",Bad\n");
        assert_eq!(verify_count(&conn, EntityKind::Department).unwrap(), 2);
    }

    #[test]
    fn test_open_quote_row_is_logged_not_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "departments.csv", "1,Eng\n5,\"Doe\n");
        let files = MemorySink::new();
        let mut conn = open_in_memory().unwrap();

        let summary = load_all(&mut conn, &mut sink(&files), &path, EntityKind::Department).unwrap();

        assert_eq!((summary.inserted, summary.failed), (1, 1));
        let log = summary.error_log.unwrap();
        assert_eq!(files.read_to_string(&log).unwrap(), "5,\"Doe\n");
        assert_eq!(get_department(&conn, 5).unwrap(), None);
    }

    #[test]
    fn test_clean_file_writes_no_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "jobs.csv", "1,Recruiter\n2,Manager\n");
        let files = MemorySink::new();
        let mut conn = open_in_memory().unwrap();

        let summary = load_all(&mut conn, &mut sink(&files), &path, EntityKind::Job).unwrap();

        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.error_log, None);
        assert!(files.files().is_empty());
    }

    #[test]
    fn test_reload_overwrites_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let first = write(dir.path(), "a.csv", "1,Eng\n");
        let second = write(dir.path(), "b.csv", "1,Engineering\n");
        let files = MemorySink::new();
        let mut conn = open_in_memory().unwrap();

        load_all(&mut conn, &mut sink(&files), &first, EntityKind::Department).unwrap();
        load_all(&mut conn, &mut sink(&files), &second, EntityKind::Department).unwrap();

        assert_eq!(
            get_department(&conn, 1).unwrap(),
            Some(Department::new(1, "Engineering"))
        );
    }

    #[test]
    fn test_commit_failure_is_fatal_and_logs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        // no departments or jobs loaded: every reference is dangling
        let path = write(
            dir.path(),
            "hired_employees.csv",
            "1,Ana,2021-07-27T16:02:08Z,1,1\n2,Bob,not-a-date,1,1\n",
        );
        let files = MemorySink::new();
        let mut conn = open_in_memory().unwrap();

        let result = load_all(&mut conn, &mut sink(&files), &path, EntityKind::Employee);

        assert!(matches!(result, Err(IngestError::StorageCommit(_))));
        assert!(files.files().is_empty());
        assert_eq!(verify_count(&conn, EntityKind::Employee).unwrap(), 0);
        assert!(get_load_runs(&conn, 10).unwrap().is_empty());
    }

    #[test]
    fn test_missing_source_is_unreadable() {
        let files = MemorySink::new();
        let mut conn = open_in_memory().unwrap();

        let result = load_all(
            &mut conn,
            &mut sink(&files),
            Path::new("/nonexistent/jobs.csv"),
            EntityKind::Job,
        );

        assert!(matches!(result, Err(IngestError::SourceUnreadable { .. })));
    }

    #[test]
    fn test_load_everything_in_dependency_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "departments.csv", "1,Supply Chain\n2,Maintenance\n");
        write(dir.path(), "jobs.csv", "1,Marketing Assistant\n2,VP Sales\n");
        write(
            dir.path(),
            "hired_employees.csv",
            "1,Harold Vogt,2021-11-07T02:48:42Z,2,1\n2,Ty Hofer,2021-05-30T05:43:46Z,1,\n",
        );
        let files = MemorySink::new();
        let mut conn = open_in_memory().unwrap();

        let summaries = load_everything(&mut conn, &mut sink(&files), dir.path()).unwrap();

        let kinds: Vec<EntityKind> = summaries.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, EntityKind::ALL.to_vec());
        assert_eq!(summaries[2].inserted, 1);
        assert_eq!(summaries[2].failed, 1);

        let runs = get_load_runs(&conn, 10).unwrap();
        assert_eq!(runs.len(), 3);
        assert!(runs.iter().all(|r| r.mode == "full" && r.source_checksum.len() == 64));
    }
}
