//! TaxiStage CLI: stage, inspect and status commands.
//!
//! Commands:
//! - `stage`: download TLC trip-record files into the staging directory
//! - `inspect`: print row count, schema and first rows of a staged file
//! - `status`: list staged files and leftover partial downloads

mod logging;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use taxistage_core::{
    stage_batch, summarize, BatchSummary, DatasetKey, KeyRange, StagedFile, StagerConfig,
    StagingDir, StdoutProgress, TripCategory,
};
use tracing::{debug, info};

#[derive(Parser)]
#[command(
    name = "taxistage",
    about = "TaxiStage: stage NYC TLC trip-record Parquet files locally"
)]
struct Cli {
    /// Append log records to this file as well as stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Log at debug level (ignored when RUST_LOG is set).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download trip-record files unless already staged.
    Stage {
        /// Year of the files (use with --month).
        #[arg(long)]
        year: Option<i32>,

        /// Months to stage, e.g. 1,2,3.
        #[arg(long, value_delimiter = ',')]
        month: Vec<u32>,

        /// Inclusive span of months, e.g. 2022-11..2023-02. Alternative to --year/--month.
        #[arg(long, conflicts_with_all = ["year", "month"])]
        span: Option<String>,

        /// Trip categories: yellow, green, fhv, fhvhv.
        #[arg(long, value_delimiter = ',', default_value = "yellow")]
        category: Vec<String>,

        /// Attempts per file. Defaults to the config value.
        #[arg(long)]
        attempts: Option<u32>,

        /// Re-download even if already staged.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Files to stage in parallel.
        #[arg(long, default_value_t = 1)]
        jobs: usize,

        #[command(flatten)]
        target: TargetArgs,
    },
    /// Print row count, schema and first rows of a Parquet file.
    Inspect {
        file: PathBuf,

        /// Rows to show.
        #[arg(long, default_value_t = 5)]
        rows: usize,

        /// Emit JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List staged files and leftover partial downloads.
    Status {
        /// Compute a BLAKE3 digest of each file.
        #[arg(long, default_value_t = false)]
        checksum: bool,

        /// Emit JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,

        #[command(flatten)]
        target: TargetArgs,
    },
}

/// Where to stage from and to. Flags override the config file.
#[derive(clap::Args)]
struct TargetArgs {
    /// TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Staging directory. Defaults to ./file-staging.
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// Base URL the file names are appended to.
    #[arg(long)]
    base_url: Option<String>,
}

impl TargetArgs {
    fn resolve(&self) -> Result<StagerConfig> {
        let mut config = match &self.config {
            Some(path) => StagerConfig::from_file(path)?,
            None => StagerConfig::default(),
        };
        if let Some(dir) = &self.staging_dir {
            config.staging_dir = dir.clone();
        }
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Stage {
            year,
            month,
            span,
            category,
            attempts,
            force,
            jobs,
            target,
        } => run_stage(
            year,
            &month,
            span.as_deref(),
            &category,
            attempts,
            force,
            jobs,
            &target,
        ),
        Commands::Inspect { file, rows, json } => run_inspect(&file, rows, json),
        Commands::Status {
            checksum,
            json,
            target,
        } => run_status(&target, checksum, json),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_stage(
    year: Option<i32>,
    months: &[u32],
    span: Option<&str>,
    categories: &[String],
    attempts: Option<u32>,
    force: bool,
    jobs: usize,
    target: &TargetArgs,
) -> Result<()> {
    let keys = resolve_keys(year, months, span, categories)?;
    let mut config = target.resolve()?;
    if let Some(n) = attempts {
        config.max_attempts = n;
        config.validate()?;
    }

    let fetcher = config.build_fetcher()?;
    info!(
        keys = keys.len(),
        jobs,
        force,
        max_attempts = config.max_attempts,
        staging_dir = %config.staging_dir.display(),
        "staging batch"
    );
    let summary = stage_batch(
        &fetcher,
        &keys,
        config.max_attempts,
        jobs,
        force,
        &StdoutProgress,
    );

    let code = exit_code(&summary);
    info!(
        staged = summary.staged,
        cached = summary.cached,
        not_found = summary.not_found,
        exhausted = summary.exhausted,
        write_failed = summary.write_failed,
        unclassified = summary.unclassified,
        rejected = summary.rejected,
        exit_code = code,
        "batch finished"
    );
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Turn `--year/--month` or `--span` plus `--category` into keys.
fn resolve_keys(
    year: Option<i32>,
    months: &[u32],
    span: Option<&str>,
    categories: &[String],
) -> Result<Vec<DatasetKey>> {
    let categories = categories
        .iter()
        .map(|c| c.parse::<TripCategory>())
        .collect::<Result<Vec<_>, _>>()?;
    if categories.is_empty() {
        bail!("at least one --category is required");
    }

    if let Some(span) = span {
        let keys = KeyRange::parse_span(span, categories)?.keys();
        if keys.is_empty() {
            bail!("span '{span}' contains no months (is the start after the end?)");
        }
        return Ok(keys);
    }

    let Some(year) = year else {
        bail!("either --year with --month, or --span, is required");
    };
    if months.is_empty() {
        bail!("--month is required with --year");
    }

    let mut keys = Vec::with_capacity(months.len() * categories.len());
    for month in months {
        for category in &categories {
            keys.push(DatasetKey::new(year, *month, *category)?);
        }
    }
    Ok(keys)
}

/// 0 when everything is staged, 2 when the only failures are missing files, 1 otherwise.
fn exit_code(summary: &BatchSummary) -> i32 {
    if summary.all_staged() {
        0
    } else if summary.only_missing() {
        2
    } else {
        1
    }
}

fn run_inspect(file: &Path, rows: usize, json: bool) -> Result<()> {
    let summary = summarize(file, rows)?;
    debug!(path = %file.display(), rows = summary.rows, columns = summary.columns.len(), "read parquet file");

    if json {
        #[derive(Serialize)]
        struct InspectJson<'a> {
            path: String,
            rows: usize,
            columns: &'a [taxistage_core::inspect::ColumnInfo],
            head: Vec<Vec<String>>,
        }
        let out = InspectJson {
            path: summary.path.display().to_string(),
            rows: summary.rows,
            columns: &summary.columns,
            head: summary.head_rows(),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", summary.path.display());
    println!("rows: {}", summary.rows);
    println!("columns ({}):", summary.columns.len());
    for col in &summary.columns {
        println!("  {:<28} {}", col.name, col.dtype);
    }
    println!("{}", summary.head);
    Ok(())
}

#[derive(Serialize)]
struct StatusRow {
    key: String,
    path: String,
    size: u64,
    modified: Option<chrono::DateTime<chrono::Local>>,
    partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    blake3: Option<String>,
}

fn run_status(target: &TargetArgs, checksum: bool, json: bool) -> Result<()> {
    let config = target.resolve()?;
    let staging = StagingDir::new(&config.staging_dir);
    let files = staging
        .list()
        .with_context(|| format!("list {}", staging.root().display()))?;
    debug!(dir = %staging.root().display(), entries = files.len(), checksum, "listed staging directory");

    let rows = files
        .iter()
        .map(|f| status_row(f, checksum))
        .collect::<Result<Vec<_>>>()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No staged files in {}", staging.root().display());
        return Ok(());
    }

    println!("Staging directory: {}", staging.root().display());
    println!(
        "{:<18} {:>14} {:<20} {}",
        "KEY", "SIZE", "MODIFIED", "NOTE"
    );
    for row in &rows {
        let modified = row
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".into());
        let note = if row.partial {
            "partial download".to_string()
        } else {
            row.blake3.clone().unwrap_or_default()
        };
        println!("{:<18} {:>14} {:<20} {}", row.key, row.size, modified, note);
    }

    let total: u64 = rows.iter().filter(|r| !r.partial).map(|r| r.size).sum();
    let staged = rows.iter().filter(|r| !r.partial).count();
    println!("\n{staged} staged file(s), {total} bytes");
    Ok(())
}

fn status_row(file: &StagedFile, checksum: bool) -> Result<StatusRow> {
    let blake3 = if checksum && !file.partial {
        Some(file_digest(&file.path)?)
    } else {
        None
    };
    Ok(StatusRow {
        key: file.key.to_string(),
        path: file.path.display().to_string(),
        size: file.size,
        modified: file.modified,
        partial: file.partial,
        blake3,
    })
}

fn file_digest(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = blake3::Hasher::new();
    std::io::copy(&mut file, &mut hasher).with_context(|| format!("hash {}", path.display()))?;
    Ok(hasher.finalize().to_hex().to_string())
}
