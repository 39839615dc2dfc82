use crate::entities::{Department, Employee, Entity, EntityKind, Job};
use crate::error::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

// ============================================================================
// STORAGE SEAM
// ============================================================================

/// What the loaders need from storage
///
/// One `merge_and_commit` call is one transaction: either every entity is
/// merged by primary key, or none is.
pub trait EntityStore {
    /// Upsert every entity by primary key, then commit
    fn merge_and_commit(&mut self, entities: &[Entity]) -> Result<usize>;

    /// Persist the audit record of a finished load
    fn record_run(&mut self, run: &LoadRun) -> Result<()>;
}

impl EntityStore for Connection {
    fn merge_and_commit(&mut self, entities: &[Entity]) -> Result<usize> {
        let tx = self.transaction()?;
        for entity in entities {
            merge_entity(&tx, entity)?;
        }
        tx.commit()?;

        debug!(rows = entities.len(), "Committed batch");
        Ok(entities.len())
    }

    fn record_run(&mut self, run: &LoadRun) -> Result<()> {
        insert_load_run(self, run)
    }
}

/// Insert-or-replace one entity by primary key (no commit)
pub fn merge_entity(conn: &Connection, entity: &Entity) -> Result<()> {
    match entity {
        Entity::Department(d) => {
            conn.prepare_cached(
                "INSERT INTO departments (id, name) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            )?
            .execute(params![d.id, d.name])?;
        }
        Entity::Job(j) => {
            conn.prepare_cached(
                "INSERT INTO jobs (id, title) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET title = excluded.title",
            )?
            .execute(params![j.id, j.title])?;
        }
        Entity::Employee(e) => {
            conn.prepare_cached(
                "INSERT INTO employees (id, name, hire_date, department_id, job_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    hire_date = excluded.hire_date,
                    department_id = excluded.department_id,
                    job_id = excluded.job_id",
            )?
            .execute(params![e.id, e.name, e.hire_date, e.department_id, e.job_id])?;
        }
    }
    Ok(())
}

// ============================================================================
// LOAD RUN (audit trail)
// ============================================================================

/// One finished load call, tying its error log to the exact source contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRun {
    pub run_id: String,
    pub kind: EntityKind,
    /// "full" or "chunked:<size>"
    pub mode: String,
    pub source_path: String,
    /// SHA-256 of the source bytes that were read
    pub source_checksum: String,
    pub inserted: usize,
    pub failed: usize,
    pub error_log: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl LoadRun {
    pub fn new(kind: EntityKind, mode: impl Into<String>, source_path: &Path) -> Self {
        let now = Utc::now();
        LoadRun {
            run_id: uuid::Uuid::new_v4().to_string(),
            kind,
            mode: mode.into(),
            source_path: source_path.display().to_string(),
            source_checksum: String::new(),
            inserted: 0,
            failed: 0,
            error_log: None,
            started_at: now,
            finished_at: now,
        }
    }
}

pub fn insert_load_run(conn: &Connection, run: &LoadRun) -> Result<()> {
    conn.execute(
        "INSERT INTO load_runs (
            run_id, kind, mode, source_path, source_checksum,
            inserted, failed, error_log, started_at, finished_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            run.run_id,
            run.kind.plural(),
            run.mode,
            run.source_path,
            run.source_checksum,
            run.inserted as i64,
            run.failed as i64,
            run.error_log,
            run.started_at.to_rfc3339(),
            run.finished_at.to_rfc3339(),
        ],
    )?;

    Ok(())
}

/// Most recent load runs first
pub fn get_load_runs(conn: &Connection, limit: usize) -> Result<Vec<LoadRun>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, kind, mode, source_path, source_checksum,
                inserted, failed, error_log, started_at, finished_at
         FROM load_runs
         ORDER BY finished_at DESC, rowid DESC
         LIMIT ?1",
    )?;

    let runs = stmt
        .query_map([limit as i64], |row| {
            let kind_str: String = row.get(1)?;
            let started_str: String = row.get(8)?;
            let finished_str: String = row.get(9)?;
            let inserted: i64 = row.get(5)?;
            let failed: i64 = row.get(6)?;

            Ok(LoadRun {
                run_id: row.get(0)?,
                kind: kind_str.parse::<EntityKind>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        1,
                        rusqlite::types::Type::Text,
                        e.into(),
                    )
                })?,
                mode: row.get(2)?,
                source_path: row.get(3)?,
                source_checksum: row.get(4)?,
                inserted: inserted as usize,
                failed: failed as usize,
                error_log: row.get(7)?,
                started_at: parse_rfc3339(8, &started_str)?,
                finished_at: parse_rfc3339(9, &finished_str)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(runs)
}

fn parse_rfc3339(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery; foreign keys so employee references are checked on commit
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS jobs (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS employees (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            hire_date TEXT NOT NULL,
            department_id INTEGER NOT NULL REFERENCES departments(id),
            job_id INTEGER NOT NULL REFERENCES jobs(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS load_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            kind TEXT NOT NULL,
            mode TEXT NOT NULL,
            source_path TEXT NOT NULL,
            source_checksum TEXT NOT NULL,
            inserted INTEGER NOT NULL,
            failed INTEGER NOT NULL,
            error_log TEXT,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_employees_department ON employees(department_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_employees_job ON employees(job_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_load_runs_finished ON load_runs(finished_at)",
        [],
    )?;

    Ok(())
}

/// Open (or create) a database file with the schema in place
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                crate::error::IngestError::Config(format!(
                    "cannot create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    info!(path = %path.display(), "Database ready");
    Ok(conn)
}

/// In-memory database with the schema in place
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    setup_database(&conn)?;
    Ok(conn)
}

// ============================================================================
// QUERIES
// ============================================================================

pub fn get_departments(conn: &Connection) -> Result<Vec<Department>> {
    let mut stmt = conn.prepare("SELECT id, name FROM departments ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| Ok(Department::new(row.get(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_jobs(conn: &Connection) -> Result<Vec<Job>> {
    let mut stmt = conn.prepare("SELECT id, title FROM jobs ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| Ok(Job::new(row.get(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_employees(conn: &Connection) -> Result<Vec<Employee>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, hire_date, department_id, job_id FROM employees ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Employee::new(
                row.get(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, NaiveDateTime>(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_department(conn: &Connection, id: i64) -> Result<Option<Department>> {
    let department = conn
        .query_row("SELECT id, name FROM departments WHERE id = ?1", [id], |row| {
            Ok(Department::new(row.get(0)?, row.get::<_, String>(1)?))
        })
        .optional()?;
    Ok(department)
}

pub fn verify_count(conn: &Connection, kind: EntityKind) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", kind.plural());
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;

    Ok(count)
}
