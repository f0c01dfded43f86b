//! Command-line interface for lineage-tap.
//!
//! Provides commands for polling the engine's event log, inspecting and
//! resetting the persisted cursor, and exercising the individual field
//! derivations (names, timestamps, run ids, repository lookup).

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::SqliteInstance;
use crate::config::{self, ResolvedConfig};
use crate::core::{
    get_repository_name, make_step_job_name, make_step_job_name_strict, make_step_run_id,
    to_utc_iso_8601, CursorFile, LineageCursor, LineageSensor,
};

/// lineage-tap - Lineage events from an orchestration engine's event log
#[derive(Parser, Debug)]
#[command(name = "lineage-tap")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll the event log once and print new lineage events as JSON lines
    Tick {
        /// Records fetched per event type (overrides config)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print events without saving the advanced cursor
        #[arg(long)]
        dry_run: bool,
    },

    /// Resolve the repository a run was launched from
    Repo {
        /// Engine run ID
        run_id: String,
    },

    /// Build the lineage job name for a step
    Name {
        /// Job (pipeline) name
        job_name: String,

        /// Step key
        step_key: String,

        /// Reject names that cannot be split back into job and step
        #[arg(long)]
        strict: bool,
    },

    /// Format epoch seconds as a canonical UTC timestamp
    Time {
        /// Unix epoch seconds (fractional allowed)
        #[arg(allow_negative_numbers = true)]
        epoch_seconds: f64,
    },

    /// Generate step run IDs
    Id {
        /// How many to generate
        #[arg(short, long, default_value = "1")]
        count: usize,
    },

    /// Inspect or reset the persisted cursor
    Cursor {
        #[command(subcommand)]
        command: CursorCommands,
    },

    /// Show resolved configuration (debug)
    Config,
}

#[derive(Subcommand, Debug)]
pub enum CursorCommands {
    /// Print the persisted cursor
    Show,

    /// Discard in-flight state and restart after the given storage id
    Reset {
        /// Storage id to resume after
        #[arg(long, default_value = "0")]
        after: i64,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Tick { limit, dry_run } => tick(limit, dry_run).await,
            Commands::Repo { run_id } => show_repository(&run_id).await,
            Commands::Name {
                job_name,
                step_key,
                strict,
            } => show_name(&job_name, &step_key, strict),
            Commands::Time { epoch_seconds } => {
                println!("{}", to_utc_iso_8601(epoch_seconds)?);
                Ok(())
            }
            Commands::Id { count } => {
                for _ in 0..count {
                    println!("{}", make_step_run_id());
                }
                Ok(())
            }
            Commands::Cursor { command } => match command {
                CursorCommands::Show => show_cursor(),
                CursorCommands::Reset { after } => reset_cursor(after),
            },
            Commands::Config => show_config(),
        }
    }
}

/// Open the engine's event log, refusing to create a new one
fn open_store(cfg: &ResolvedConfig) -> Result<SqliteInstance> {
    if !cfg.event_log.exists() {
        anyhow::bail!(
            "Event log not found: {}\nSet LINEAGE_TAP_EVENT_LOG or paths.event_log in .lineage-tap/config.yaml",
            cfg.event_log.display()
        );
    }

    SqliteInstance::open(&cfg.event_log)
        .with_context(|| format!("Failed to open event log: {}", cfg.event_log.display()))
}

/// Run one sensor tick
async fn tick(limit: Option<usize>, dry_run: bool) -> Result<()> {
    let cfg = config::config()?;

    let mut settings = cfg.sensor.clone();
    if let Some(limit) = limit {
        settings.record_filter_limit = limit;
    }
    let sensor = LineageSensor::new(settings);

    let store = open_store(cfg)?;
    let cursor_file = CursorFile::new(cfg.cursor_path());
    let _lock = cursor_file.lock()?;
    let cursor = cursor_file.load_or_new(sensor.settings().after_storage_id)?;

    let report = sensor.tick(&store, cursor).await;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for event in &report.events {
        serde_json::to_writer(&mut out, event).context("Failed to serialize event")?;
        writeln!(out)?;
    }
    out.flush()?;

    if dry_run {
        eprintln!("[Dry run: cursor not saved]");
    } else {
        cursor_file.save(&report.cursor)?;
    }

    for skipped in &report.skipped {
        eprintln!("[Skipped storage id {}: {}]", skipped.storage_id, skipped.error);
    }
    eprintln!(
        "[Processed {} records ({} skipped), emitted {} events, cursor at {}]",
        report.records_processed,
        report.skipped.len(),
        report.events.len(),
        report.cursor.last_storage_id
    );

    match report.error {
        Some(e) => Err(anyhow::Error::new(e).context("Tick stopped early")),
        None => Ok(()),
    }
}

/// Print the repository for a run
async fn show_repository(run_id: &str) -> Result<()> {
    let cfg = config::config()?;
    let store = open_store(cfg)?;

    let repository = get_repository_name(&store, run_id).await?;
    println!("{}", repository);

    Ok(())
}

/// Print the lineage job name for a step
fn show_name(job_name: &str, step_key: &str, strict: bool) -> Result<()> {
    let name = if strict {
        make_step_job_name_strict(job_name, step_key)?
    } else {
        make_step_job_name(job_name, step_key)
    };
    println!("{}", name);

    Ok(())
}

/// Print the persisted cursor
fn show_cursor() -> Result<()> {
    let cfg = config::config()?;
    let cursor_file = CursorFile::new(cfg.cursor_path());

    match cursor_file.load()? {
        Some(cursor) => {
            println!("{}", serde_json::to_string_pretty(&cursor)?);
        }
        None => {
            println!("No cursor saved at {}", cursor_file.path().display());
        }
    }

    Ok(())
}

/// Overwrite the cursor with a fresh one
fn reset_cursor(after: i64) -> Result<()> {
    if after < 0 {
        anyhow::bail!("Storage id must be non-negative, got {}", after);
    }

    let cfg = config::config()?;
    let cursor_file = CursorFile::new(cfg.cursor_path());
    let _lock = cursor_file.lock()?;

    if let Some(previous) = cursor_file.load()? {
        let dropped = previous.running_step_count();
        if dropped > 0 {
            eprintln!("[Discarding {} in-flight steps]", dropped);
        }
    }

    cursor_file.save(&LineageCursor::new(after))?;
    println!("Cursor reset to storage id {}", after);

    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("lineage-tap configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:      {}", cfg.home.display());
    println!("  Event log: {}", cfg.event_log.display());
    println!("  Cursor:    {}", cfg.cursor_path().display());
    println!();
    println!("Sensor:");
    println!("  Namespace:     {}", cfg.sensor.namespace);
    println!("  Record limit:  {}", cfg.sensor.record_filter_limit);
    println!("  Start after:   {}", cfg.sensor.after_storage_id);
    println!("  Strict naming: {}", cfg.sensor.strict_naming);
    let event_types: Vec<&str> = cfg.sensor.event_types.iter().map(|t| t.as_str()).collect();
    println!("  Event types:   {}", event_types.join(", "));

    Ok(())
}
