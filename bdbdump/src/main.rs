//! bdbdump - dump a Berkeley DB hash or btree file as db_load text
//!
//! Records go to standard output or to a file; logs go to standard error.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use bdbdump_engine::dump::{dump, read_dump, DumpSummary};

mod config;

use config::Config;

/// Dump a Berkeley DB hash or btree database in db_load bytevalue format
#[derive(Parser, Debug)]
#[command(name = "bdbdump")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Database file to dump
    database: PathBuf,

    /// Write the dump to a file instead of standard output
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the output file in place instead of through a temporary file
    #[arg(long)]
    no_atomic: bool,

    /// Re-read the output file and check its record count
    #[arg(long)]
    verify: bool,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

/// Options after merging flags over the config file
#[derive(Debug, PartialEq, Eq)]
struct Settings {
    log_level: Level,
    atomic: bool,
    verify: bool,
}

impl Settings {
    fn resolve(args: &Args, config: &Config) -> Self {
        let log_level = args
            .log_level
            .as_deref()
            .or(config.log_level.as_deref())
            .map(parse_level)
            .unwrap_or(Level::INFO);

        Settings {
            log_level,
            atomic: !args.no_atomic && config.output.atomic.unwrap_or(true),
            verify: args.verify || config.output.verify.unwrap_or(false),
        }
    }
}

fn parse_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Dump into `output`, optionally through a temporary file renamed on success
fn dump_to_file(database: &Path, output: &Path, atomic: bool) -> Result<DumpSummary> {
    if !atomic {
        let file = File::create(output)
            .with_context(|| format!("failed to create {}", output.display()))?;
        return Ok(dump(database, file)?);
    }

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;

    let summary = dump(database, tmp.as_file_mut())?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("failed to sync {}", tmp.path().display()))?;
    tmp.persist(output)
        .with_context(|| format!("failed to rename dump into {}", output.display()))?;

    Ok(summary)
}

/// Parse a written dump and compare it with what was emitted
fn verify_output(output: &Path, summary: &DumpSummary) -> Result<()> {
    let file = File::open(output)
        .with_context(|| format!("failed to reopen {}", output.display()))?;
    let (method, records) = read_dump(BufReader::new(file))
        .with_context(|| format!("{} is not a valid dump", output.display()))?;

    if method != summary.method {
        bail!(
            "{}: header names {} but a {} database was dumped",
            output.display(),
            method,
            summary.method
        );
    }
    if records.len() as u64 != summary.records {
        bail!(
            "{}: holds {} records but {} were dumped",
            output.display(),
            records.len(),
            summary.records
        );
    }

    info!(output = %output.display(), records = records.len(), "verified dump");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let settings = Settings::resolve(&args, &config);

    // Standard output carries the dump, so logs go to stderr
    let subscriber = FmtSubscriber::builder()
        .with_max_level(settings.log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match &args.output {
        Some(output) => {
            let summary = dump_to_file(&args.database, output, settings.atomic)?;
            if settings.verify {
                verify_output(output, &summary)?;
            }
        }
        None => {
            if settings.verify {
                warn!("--verify only applies to file output");
            }
            let stdout = io::stdout();
            dump(&args.database, stdout.lock())?;
        }
    }

    Ok(())
}
