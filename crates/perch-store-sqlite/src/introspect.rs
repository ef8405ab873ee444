//! Structural introspection of a live SQLite database.
//!
//! Read-only views over `sqlite_master` and the table pragmas. The
//! convergence engine uses these to probe column existence; tests diff
//! [`SchemaSnapshot`]s across runs to prove idempotence and additivity.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::Connection;

/// Prefix of the lookup tables that realise enum types.
pub const ENUM_TABLE_PREFIX: &str = "enum_";

/// Name of the migration ledger table.
pub const LEDGER_TABLE: &str = "schema_migrations";

/// One column as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
  pub name:          String,
  pub declared_type: String,
  pub notnull:       bool,
  pub default:       Option<String>,
  pub primary_key:   bool,
}

/// One foreign key as reported by `PRAGMA foreign_key_list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
  pub parent_table:  String,
  pub column:        String,
  pub parent_column: String,
}

/// All user tables, alphabetically. Includes enum lookup tables and the
/// ledger; excludes SQLite internals.
pub fn table_names(conn: &Connection) -> rusqlite::Result<Vec<String>> {
  let mut stmt = conn.prepare(
    "SELECT name FROM sqlite_master
     WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
     ORDER BY name",
  )?;
  let names = stmt
    .query_map([], |row| row.get(0))?
    .collect::<rusqlite::Result<Vec<String>>>()?;
  Ok(names)
}

pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
  let count: i64 = conn.query_row(
    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
    rusqlite::params![table],
    |row| row.get(0),
  )?;
  Ok(count > 0)
}

/// Columns of `table`, in declaration order. Empty if the table does not
/// exist — `PRAGMA table_info` does not distinguish the two cases.
pub fn columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<ColumnInfo>> {
  let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
  let cols = stmt
    .query_map([], |row| {
      Ok(ColumnInfo {
        name:          row.get("name")?,
        declared_type: row.get("type")?,
        notnull:       row.get("notnull")?,
        default:       row.get("dflt_value")?,
        primary_key:   row.get::<_, i64>("pk")? > 0,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(cols)
}

pub fn foreign_keys(conn: &Connection, table: &str) -> rusqlite::Result<Vec<ForeignKey>> {
  let mut stmt = conn.prepare(&format!("PRAGMA foreign_key_list({table})"))?;
  let fks = stmt
    .query_map([], |row| {
      Ok(ForeignKey {
        parent_table:  row.get("table")?,
        column:        row.get("from")?,
        parent_column: row.get("to")?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(fks)
}

/// All named indexes, alphabetically. SQLite's auto-indexes (backing UNIQUE
/// table constraints) are excluded — they are unnamed implementation detail.
pub fn index_names(conn: &Connection) -> rusqlite::Result<Vec<String>> {
  let mut stmt = conn.prepare(
    "SELECT name FROM sqlite_master
     WHERE type = 'index' AND name NOT LIKE 'sqlite_autoindex%'
     ORDER BY name",
  )?;
  let names = stmt
    .query_map([], |row| row.get(0))?
    .collect::<rusqlite::Result<Vec<String>>>()?;
  Ok(names)
}

/// Tag set of an enum type, sorted. Empty if the lookup table is missing.
pub fn enum_tags(conn: &Connection, enum_name: &str) -> rusqlite::Result<Vec<String>> {
  if !table_exists(conn, &format!("{ENUM_TABLE_PREFIX}{enum_name}"))? {
    return Ok(Vec::new());
  }
  let mut stmt = conn.prepare(&format!(
    "SELECT value FROM {ENUM_TABLE_PREFIX}{enum_name} ORDER BY value"
  ))?;
  let tags = stmt
    .query_map([], |row| row.get(0))?
    .collect::<rusqlite::Result<Vec<String>>>()?;
  Ok(tags)
}

/// A complete structural picture of the database: tables with their columns,
/// index names, enum tag sets, and the ledger's version list.
///
/// Two snapshots compare equal exactly when the databases are structurally
/// identical, which is the idempotence property in testable form. Ledger
/// timestamps are deliberately excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSnapshot {
  pub tables:    BTreeMap<String, Vec<ColumnInfo>>,
  pub indexes:   BTreeSet<String>,
  pub enum_tags: BTreeMap<String, Vec<String>>,
  pub ledger:    Vec<String>,
}

pub fn snapshot(conn: &Connection) -> rusqlite::Result<SchemaSnapshot> {
  let mut tables = BTreeMap::new();
  let mut enum_tags = BTreeMap::new();

  for table in table_names(conn)? {
    tables.insert(table.clone(), columns(conn, &table)?);
    if let Some(enum_name) = table.strip_prefix(ENUM_TABLE_PREFIX) {
      enum_tags.insert(enum_name.to_owned(), self::enum_tags(conn, enum_name)?);
    }
  }

  let indexes = index_names(conn)?.into_iter().collect();

  let ledger = if table_exists(conn, LEDGER_TABLE)? {
    let mut stmt =
      conn.prepare(&format!("SELECT version FROM {LEDGER_TABLE} ORDER BY version"))?;
    stmt
      .query_map([], |row| row.get(0))?
      .collect::<rusqlite::Result<Vec<String>>>()?
  } else {
    Vec::new()
  };

  Ok(SchemaSnapshot { tables, indexes, enum_tags, ledger })
}
