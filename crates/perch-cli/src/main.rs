//! `perch` — schema convergence and inspection for the Perch analytics store.
//!
//! Typically invoked once at deployment, before the application serves
//! traffic:
//!
//! ```
//! perch converge --db perch.db
//! perch status --db perch.db
//! perch check
//! ```
//!
//! The database path may also come from `perch.toml` (key `db`) or the
//! `PERCH_DB` environment variable.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use perch_core::{schema, store::AnalyticsStore as _, target};
use perch_store_sqlite::SqliteStore;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "perch", about = "Schema convergence for the Perch analytics store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "perch.toml")]
  config: PathBuf,

  /// SQLite database file. Overrides the config file and PERCH_DB.
  #[arg(long, value_name = "FILE")]
  db: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Bring the database up to the target schema. Safe to re-run.
  Converge,
  /// Print the migration ledger without touching the schema.
  Status,
  /// Validate the authored migration unit list. Needs no database.
  Check,
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct FileConfig {
  db: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  match cli.command {
    Command::Check => {
      let units = target::migration_units();
      schema::validate_units(&units).context("migration unit list is invalid")?;
      println!("{} migration units validate cleanly", units.len());
      Ok(())
    }

    Command::Converge => {
      let db = resolve_db(&cli)?;
      let (_store, report) = SqliteStore::open_with_report(&db)
        .await
        .with_context(|| format!("failed to converge {}", db.display()))?;

      println!("database converged: {} tables present", report.tables);
      for version in &report.units_applied {
        println!("  applied     {version}");
      }
      for version in &report.units_already_applied {
        println!("  up to date  {version}");
      }
      Ok(())
    }

    Command::Status => {
      let db = resolve_db(&cli)?;
      let store = SqliteStore::open_readonly(&db)
        .await
        .with_context(|| format!("failed to open {}", db.display()))?;

      let entries = store
        .applied_versions()
        .await
        .context("no migration ledger found; run `perch converge` first")?;

      for entry in entries {
        println!(
          "{}  {}  {}",
          entry.version,
          entry.applied_at.to_rfc3339(),
          entry.description
        );
      }
      Ok(())
    }
  }
}

/// Database path precedence: `--db` flag, then config file / `PERCH_DB`.
fn resolve_db(cli: &Cli) -> anyhow::Result<PathBuf> {
  if let Some(db) = &cli.db {
    return Ok(db.clone());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(config::Environment::with_prefix("PERCH"))
    .build()
    .context("failed to read config")?;

  let file_cfg: FileConfig = settings
    .try_deserialize()
    .context("failed to deserialise config")?;

  file_cfg
    .db
    .map(PathBuf::from)
    .context("no database path given; use --db, PERCH_DB, or `db` in perch.toml")
}
