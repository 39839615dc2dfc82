use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hire_ingest::logging::{init_logging, LogConfig};
use hire_ingest::{
    get_load_runs, load_chunked, load_everything, open_database, CommitFailurePolicy,
    EntityKind, IngestConfig,
};
use std::path::PathBuf;
use std::process;
use tracing::{error, Level};

/// Load department, job and hire CSV files into SQLite
#[derive(Parser, Debug)]
#[command(name = "hire-ingest", version)]
struct Cli {
    /// Database file (overrides INGEST_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Directory with the source CSV files (overrides INGEST_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load departments.csv, jobs.csv and hired_employees.csv, one transaction each
    Upload,

    /// Load hired_employees.csv in chunks, one transaction per chunk
    Batch {
        /// Rows per chunk
        #[arg(short, long)]
        chunk_size: Option<usize>,

        /// Keep loading later chunks when a chunk fails to commit
        #[arg(long)]
        isolate: bool,
    },

    /// Show recent load runs
    Runs {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let log_config = LogConfig::with_level(level).merge_env().unwrap_or_else(|e| {
        eprintln!("Warning: {:#}, using default logging", e);
        LogConfig::with_level(level)
    });
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Warning: {:#}", e);
    }

    if let Err(e) = run(cli) {
        error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = IngestConfig::from_env().context("Invalid configuration")?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    if let Some(dir) = cli.data_dir {
        config.error_log_dir = dir.clone();
        config.data_dir = dir;
    }

    let mut conn = open_database(&config.database_path)?;

    match cli.command {
        Commands::Upload => {
            let mut sink = config.error_sink();
            let summaries = load_everything(&mut conn, &mut sink, &config.data_dir)?;
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }

        Commands::Batch { chunk_size, isolate } => {
            let mut options = config.chunk_options(chunk_size)?;
            if isolate {
                options = options.with_policy(CommitFailurePolicy::Isolate);
            }

            let mut sink = config.error_sink();
            let summary = load_chunked(
                &mut conn,
                &mut sink,
                &config.source_path(EntityKind::Employee),
                EntityKind::Employee,
                options,
            )?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Commands::Runs { limit } => {
            let runs = get_load_runs(&conn, limit)?;
            println!("{}", serde_json::to_string_pretty(&runs)?);
        }
    }

    Ok(())
}
