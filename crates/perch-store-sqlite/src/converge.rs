//! The schema convergence engine.
//!
//! [`run`] brings a database in any prior valid state — empty, partially
//! migrated, or fully current — to the target schema, one migration unit per
//! transaction. Every operation is idempotent: if its goal state already
//! holds, it is a no-op rather than an error. Because the operations are the
//! source of idempotence, the ledger is an audit trail, never a completion
//! gate — a ledger row without the unit's effects (a crashed prior run)
//! self-heals on the next pass.
//!
//! Enum types are realised as `enum_<name>` lookup tables keyed by tag, with
//! tag columns holding a foreign key into them. A tag addition is then an
//! ordinary `INSERT OR IGNORE`, where a CHECK constraint would have required
//! a destructive table rebuild.
//!
//! Concurrent runs are safe: SQLite serialises catalog changes, and the
//! loser of any race observes "already exists", which is classified benign.

use chrono::Utc;
use perch_core::schema::{
  self, ColumnDef, ColumnType, DefaultValue, EnumTypeDef, IndexDef, MigrationUnit, Op, TableDef,
};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::{
  encode::encode_dt,
  introspect::{self, ENUM_TABLE_PREFIX, LEDGER_TABLE},
  Error, Result,
};

// ─── Report ──────────────────────────────────────────────────────────────────

/// Outcome of a successful convergence run.
#[derive(Debug, Clone)]
pub struct ConvergeReport {
  /// Total user tables present after the run — the sanity signal surfaced
  /// to operators.
  pub tables:                usize,
  /// Versions whose ledger row was inserted by this run.
  pub units_applied:         Vec<String>,
  /// Versions already recorded before this run started.
  pub units_already_applied: Vec<String>,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Converge `conn` to the schema described by `units`.
///
/// Units are applied in declared order, each inside its own transaction; an
/// error rolls back the offending unit only, leaving everything committed by
/// earlier units in place. Re-running after any outcome is always safe.
pub fn run(conn: &mut Connection, units: &[MigrationUnit]) -> Result<ConvergeReport> {
  schema::validate_units(units)?;

  // Connection-level pragmas; neither can change inside a transaction.
  conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
  conn.execute_batch("PRAGMA foreign_keys = ON;")?;

  conn.execute(
    &format!(
      "CREATE TABLE IF NOT EXISTS {LEDGER_TABLE} (
         version     TEXT PRIMARY KEY,
         description TEXT NOT NULL,
         applied_at  TEXT NOT NULL
       )"
    ),
    [],
  )?;

  let mut units_applied = Vec::new();
  let mut units_already_applied = Vec::new();

  for unit in units {
    let tx = conn.transaction()?;

    for op in &unit.ops {
      apply_op(&tx, unit.version, op)?;
    }
    let newly_recorded = record_unit(&tx, unit)?;

    tx.commit()?;

    if newly_recorded {
      info!(version = unit.version, description = unit.description, "applied migration unit");
      units_applied.push(unit.version.to_owned());
    } else {
      debug!(version = unit.version, "migration unit already recorded");
      units_already_applied.push(unit.version.to_owned());
    }
  }

  let tables = introspect::table_names(conn)?.len();
  info!(tables, "schema convergence complete");

  Ok(ConvergeReport { tables, units_applied, units_already_applied })
}

fn apply_op(conn: &Connection, version: &'static str, op: &Op) -> Result<()> {
  match op {
    Op::CreateEnum(e) => {
      execute_tolerant(conn, version, op, &create_enum_sql(e))?;
      ensure_tags(conn, version, op, e.name, e.tags)
    }
    Op::EnsureEnumTags { enum_name, tags } => ensure_tags(conn, version, op, enum_name, tags),
    Op::CreateTable(t) => execute_tolerant(conn, version, op, &create_table_sql(t)),
    Op::AddColumn { table, column } => add_column(conn, version, table, column),
    Op::CreateIndex(i) => execute_tolerant(conn, version, op, &create_index_sql(i)),
  }
}

/// Execute `sql`, absorbing "already exists" failures. The `IF NOT EXISTS`
/// forms cover the common case; this classifier catches the residue — a lost
/// race against a concurrent converger between probe and DDL.
fn execute_tolerant(conn: &Connection, version: &'static str, op: &Op, sql: &str) -> Result<()> {
  match conn.execute_batch(sql) {
    Ok(()) => Ok(()),
    Err(e) if is_benign_duplicate(&e) => {
      debug!(version, op = %op.describe(), "object already exists");
      Ok(())
    }
    Err(e) => Err(Error::UnitFailed { version, op: op.describe(), source: e }),
  }
}

fn is_benign_duplicate(err: &rusqlite::Error) -> bool {
  match err {
    rusqlite::Error::SqliteFailure(_, Some(message)) => {
      message.contains("already exists") || message.contains("duplicate column name")
    }
    _ => false,
  }
}

fn ensure_tags(
  conn: &Connection,
  version: &'static str,
  op: &Op,
  enum_name: &str,
  tags: &[&str],
) -> Result<()> {
  let mut stmt = conn
    .prepare(&format!(
      "INSERT OR IGNORE INTO {ENUM_TABLE_PREFIX}{enum_name} (value) VALUES (?1)"
    ))
    .map_err(|e| Error::UnitFailed { version, op: op.describe(), source: e })?;
  for tag in tags {
    stmt
      .execute(rusqlite::params![tag])
      .map_err(|e| Error::UnitFailed { version, op: op.describe(), source: e })?;
  }
  Ok(())
}

/// Add a column if absent. A column that already exists with the target type
/// is a no-op; with any other type it is a structural conflict — the one
/// failure mode that must reach a human.
fn add_column(
  conn: &Connection,
  version: &'static str,
  table: &str,
  column: &ColumnDef,
) -> Result<()> {
  let existing = introspect::columns(conn, table)?;
  if let Some(found) = existing.iter().find(|c| c.name == column.name) {
    let expected = sql_type(column.ty);
    if !found.declared_type.eq_ignore_ascii_case(expected) {
      return Err(Error::StructuralConflict {
        version,
        table: table.to_owned(),
        column: column.name.to_owned(),
        expected,
        actual: found.declared_type.clone(),
      });
    }
    debug!(table, column = column.name, "column already present");
    return Ok(());
  }

  let sql = format!("ALTER TABLE {table} ADD COLUMN {}", render_column(column, false));
  match conn.execute_batch(&sql) {
    Ok(()) => Ok(()),
    Err(e) if is_benign_duplicate(&e) => {
      debug!(version, table, column = column.name, "lost add-column race");
      Ok(())
    }
    Err(e) => Err(Error::UnitFailed {
      version,
      op: format!("add column {table}.{}", column.name),
      source: e,
    }),
  }
}

fn record_unit(conn: &Connection, unit: &MigrationUnit) -> Result<bool> {
  let changed = conn
    .execute(
      &format!(
        "INSERT OR IGNORE INTO {LEDGER_TABLE} (version, description, applied_at)
         VALUES (?1, ?2, ?3)"
      ),
      rusqlite::params![unit.version, unit.description, encode_dt(Utc::now())],
    )
    .map_err(|e| Error::UnitFailed {
      version: unit.version,
      op:      "record ledger entry".to_owned(),
      source:  e,
    })?;
  Ok(changed > 0)
}

// ─── SQL rendering ───────────────────────────────────────────────────────────

/// SQLite storage type a column is declared with. The semantic distinctions
/// finer than this (timestamp vs text, JSON vs text) live in the codecs.
fn sql_type(ty: ColumnType) -> &'static str {
  match ty {
    ColumnType::Id
    | ColumnType::Text
    | ColumnType::Timestamp
    | ColumnType::Json
    | ColumnType::Tag(_) => "TEXT",
    ColumnType::Integer | ColumnType::Boolean => "INTEGER",
    ColumnType::Real => "REAL",
  }
}

fn create_enum_sql(e: &EnumTypeDef) -> String {
  format!(
    "CREATE TABLE IF NOT EXISTS {ENUM_TABLE_PREFIX}{} (value TEXT PRIMARY KEY)",
    e.name
  )
}

fn create_table_sql(t: &TableDef) -> String {
  let mut parts: Vec<String> = Vec::with_capacity(t.columns.len() + t.uniques.len());
  for (i, column) in t.columns.iter().enumerate() {
    parts.push(render_column(column, i == 0));
  }
  for unique in &t.uniques {
    parts.push(format!("UNIQUE ({})", unique.join(", ")));
  }
  format!(
    "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
    t.name,
    parts.join(",\n  ")
  )
}

fn render_column(c: &ColumnDef, primary_key: bool) -> String {
  let mut out = format!("{} {}", c.name, sql_type(c.ty));
  if primary_key {
    out.push_str(" PRIMARY KEY");
  } else if !c.nullable {
    out.push_str(" NOT NULL");
  }
  if let Some(default) = &c.default {
    out.push_str(" DEFAULT ");
    out.push_str(&render_default(default));
  }
  if let Some((table, column)) = c.references {
    out.push_str(&format!(" REFERENCES {table}({column})"));
  } else if let ColumnType::Tag(enum_name) = c.ty {
    out.push_str(&format!(" REFERENCES {ENUM_TABLE_PREFIX}{enum_name}(value)"));
  }
  out
}

fn render_default(d: &DefaultValue) -> String {
  match d {
    DefaultValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
    DefaultValue::Integer(i) => i.to_string(),
    DefaultValue::Real(r) => r.to_string(),
    DefaultValue::Boolean(true) => "1".to_owned(),
    DefaultValue::Boolean(false) => "0".to_owned(),
    DefaultValue::EmptyJson => "'{}'".to_owned(),
  }
}

fn create_index_sql(i: &IndexDef) -> String {
  let unique = if i.unique { "UNIQUE " } else { "" };
  let columns = i
    .columns
    .iter()
    .map(|c| {
      if c.descending {
        format!("{} DESC", c.name)
      } else {
        c.name.to_owned()
      }
    })
    .collect::<Vec<_>>()
    .join(", ");
  let mut sql = format!(
    "CREATE {unique}INDEX IF NOT EXISTS {} ON {} ({columns})",
    i.name, i.table
  );
  if let Some(filter) = i.filter {
    sql.push_str(&format!(" WHERE {filter}"));
  }
  sql
}
