// Hire Ingest - Core Library
// CSV ingestion of departments, jobs and hired employees into SQLite.
// Exposes all modules for use in the CLI, the API server, and tests.

pub mod chunked;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod error_sink;
pub mod loader;
pub mod logging;
pub mod source;
pub mod validator;

// Re-export commonly used types
pub use chunked::{
    batch_context, load_chunked, load_employees_chunked, ChunkOptions, ChunkedSummary,
    CommitFailurePolicy, DEFAULT_CHUNK_SIZE, ERROR_SAMPLE_LIMIT,
};
pub use config::IngestConfig;
pub use db::{
    get_department, get_departments, get_employees, get_jobs, get_load_runs, open_database,
    open_in_memory, setup_database, verify_count, EntityStore, LoadRun,
};
pub use entities::{Department, Employee, Entity, EntityKind, Job};
pub use error::{IngestError, Result};
pub use error_sink::{Clock, ErrorSink, FileSink, FixedClock, FsSink, LocalClock, MemorySink};
pub use loader::{classify, load_all, load_everything, LoadSummary};
pub use source::{read_all, SourceReader, SourceRow};
pub use validator::{validate, Invalid};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
