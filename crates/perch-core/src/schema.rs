//! Declarative schema descriptors and the migration unit list they form.
//!
//! The target schema is expressed as data — enum types, tables, columns,
//! indexes — grouped into ordered, versioned [`MigrationUnit`]s. A storage
//! backend interprets the units against a live database; this crate only
//! describes them and validates that the authored ordering respects the
//! dependency graph (enums before the tables that tag against them,
//! referenced tables before referencing tables).
//!
//! There are deliberately no destructive operations: [`Op`] has no variant
//! that drops or renames anything, so convergence is additive by
//! construction.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Column descriptors ──────────────────────────────────────────────────────

/// Semantic type of a column. Storage backends map these onto their native
/// types; the distinctions matter to codecs and to structural-conflict
/// detection, not to SQL alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
  /// UUID primary key or foreign key, stored as hyphenated lowercase text.
  Id,
  Text,
  Integer,
  Real,
  Boolean,
  /// RFC 3339 UTC timestamp, stored as text.
  Timestamp,
  /// JSON document, stored as text.
  Json,
  /// Value constrained to the tag set of the named enum type.
  Tag(&'static str),
}

/// Literal default for a column. Timestamps carry no default — the write
/// path supplies them (see the store-layer `updated_at` invariant).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
  Text(&'static str),
  Integer(i64),
  Real(f64),
  Boolean(bool),
  EmptyJson,
}

/// A single column of a table.
#[derive(Debug, Clone)]
pub struct ColumnDef {
  pub name:       &'static str,
  pub ty:         ColumnType,
  pub nullable:   bool,
  pub default:    Option<DefaultValue>,
  /// Foreign key target as `(table, column)`. Tag columns reference their
  /// enum type's tag set implicitly and do not set this.
  pub references: Option<(&'static str, &'static str)>,
}

impl ColumnDef {
  /// A NOT NULL column with no default and no foreign key.
  pub fn new(name: &'static str, ty: ColumnType) -> Self {
    Self { name, ty, nullable: false, default: None, references: None }
  }

  pub fn nullable(mut self) -> Self {
    self.nullable = true;
    self
  }

  pub fn default(mut self, default: DefaultValue) -> Self {
    self.default = Some(default);
    self
  }

  pub fn references(mut self, table: &'static str, column: &'static str) -> Self {
    self.references = Some((table, column));
    self
  }
}

// ─── Object descriptors ──────────────────────────────────────────────────────

/// A named, closed set of string tags. Tags may be added by later units but
/// never removed — rows already persisted may be using them.
#[derive(Debug, Clone)]
pub struct EnumTypeDef {
  pub name: &'static str,
  pub tags: &'static [&'static str],
}

/// A table. The first column is the primary key and must be [`ColumnType::Id`].
#[derive(Debug, Clone)]
pub struct TableDef {
  pub name:    &'static str,
  pub columns: Vec<ColumnDef>,
  /// Table-level unique column tuples, enforced from creation.
  pub uniques: Vec<&'static [&'static str]>,
}

impl TableDef {
  pub fn new(name: &'static str, columns: Vec<ColumnDef>) -> Self {
    Self { name, columns, uniques: Vec::new() }
  }

  pub fn unique(mut self, columns: &'static [&'static str]) -> Self {
    self.uniques.push(columns);
    self
  }
}

/// One column of an index key, with sort direction.
#[derive(Debug, Clone, Copy)]
pub struct IndexColumn {
  pub name:       &'static str,
  pub descending: bool,
}

impl IndexColumn {
  pub fn asc(name: &'static str) -> Self {
    Self { name, descending: false }
  }

  pub fn desc(name: &'static str) -> Self {
    Self { name, descending: true }
  }
}

/// A named index over one table. Unique indexes double as unique constraints
/// added after table creation. `filter` makes the index partial.
#[derive(Debug, Clone)]
pub struct IndexDef {
  pub name:    &'static str,
  pub table:   &'static str,
  pub columns: Vec<IndexColumn>,
  pub filter:  Option<&'static str>,
  pub unique:  bool,
}

impl IndexDef {
  pub fn new(name: &'static str, table: &'static str, columns: Vec<IndexColumn>) -> Self {
    Self { name, table, columns, filter: None, unique: false }
  }

  pub fn filter(mut self, predicate: &'static str) -> Self {
    self.filter = Some(predicate);
    self
  }

  pub fn unique(mut self) -> Self {
    self.unique = true;
    self
  }
}

// ─── Operations and units ────────────────────────────────────────────────────

/// One idempotent structural operation. Applying an `Op` whose goal state
/// already holds is a no-op, never an error.
#[derive(Debug, Clone)]
pub enum Op {
  CreateEnum(EnumTypeDef),
  /// Insert any of `tags` missing from an existing enum type.
  EnsureEnumTags {
    enum_name: &'static str,
    tags:      &'static [&'static str],
  },
  CreateTable(TableDef),
  AddColumn {
    table:  &'static str,
    column: ColumnDef,
  },
  CreateIndex(IndexDef),
}

impl Op {
  /// Short label used in logs and error reports.
  pub fn describe(&self) -> String {
    match self {
      Op::CreateEnum(e) => format!("create enum {}", e.name),
      Op::EnsureEnumTags { enum_name, .. } => format!("ensure tags on enum {enum_name}"),
      Op::CreateTable(t) => format!("create table {}", t.name),
      Op::AddColumn { table, column } => format!("add column {table}.{}", column.name),
      Op::CreateIndex(i) => format!("create index {}", i.name),
    }
  }
}

/// An atomically-applied, versioned batch of structural operations.
#[derive(Debug, Clone)]
pub struct MigrationUnit {
  pub version:     &'static str,
  pub description: &'static str,
  pub ops:         Vec<Op>,
}

/// One row of the migration ledger — the append-only record of which units
/// have been applied. Audit trail only; re-run safety comes from the
/// operations themselves being idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
  pub version:     String,
  pub description: String,
  pub applied_at:  DateTime<Utc>,
}

// ─── Authoring-time validation ───────────────────────────────────────────────

/// Check that `units` respect the dependency ordering the engine relies on.
///
/// The engine does not reorder operations at run time; the author guarantees
/// order and this function proves it: versions are unique, enum types are
/// created before anything tags against them, tables before anything
/// references or alters them, and added columns are satisfiable on tables
/// that already hold rows.
pub fn validate_units(units: &[MigrationUnit]) -> Result<()> {
  let mut versions: BTreeSet<&str> = BTreeSet::new();
  let mut enums: BTreeSet<&str> = BTreeSet::new();
  let mut tables: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

  for unit in units {
    if !versions.insert(unit.version) {
      return Err(Error::DuplicateVersion(unit.version.to_owned()));
    }

    for op in &unit.ops {
      match op {
        Op::CreateEnum(e) => {
          enums.insert(e.name);
        }

        Op::EnsureEnumTags { enum_name, .. } => {
          if !enums.contains(enum_name) {
            return Err(Error::UnknownEnumType {
              unit:      unit.version.to_owned(),
              enum_name: (*enum_name).to_owned(),
            });
          }
        }

        Op::CreateTable(t) => {
          match t.columns.first() {
            Some(pk) if pk.ty == ColumnType::Id => {}
            _ => {
              return Err(Error::MissingIdPrimaryKey {
                unit:  unit.version.to_owned(),
                table: t.name.to_owned(),
              });
            }
          }

          let mut cols: BTreeSet<&str> = BTreeSet::new();
          for col in &t.columns {
            if !cols.insert(col.name) {
              return Err(Error::DuplicateColumn {
                unit:   unit.version.to_owned(),
                table:  t.name.to_owned(),
                column: col.name.to_owned(),
              });
            }
            check_column_deps(unit.version, t.name, col, &enums, &tables)?;
          }
          tables.insert(t.name, cols);
        }

        Op::AddColumn { table, column } => {
          if !column.nullable && column.default.is_none() {
            return Err(Error::AddColumnNeedsDefault {
              unit:   unit.version.to_owned(),
              table:  (*table).to_owned(),
              column: column.name.to_owned(),
            });
          }
          check_column_deps(unit.version, table, column, &enums, &tables)?;
          let Some(cols) = tables.get_mut(table) else {
            return Err(Error::UnknownTable {
              unit:  unit.version.to_owned(),
              table: (*table).to_owned(),
            });
          };
          if !cols.insert(column.name) {
            return Err(Error::DuplicateColumn {
              unit:   unit.version.to_owned(),
              table:  (*table).to_owned(),
              column: column.name.to_owned(),
            });
          }
        }

        Op::CreateIndex(i) => {
          let Some(cols) = tables.get(i.table) else {
            return Err(Error::UnknownTable {
              unit:  unit.version.to_owned(),
              table: i.table.to_owned(),
            });
          };
          for ic in &i.columns {
            if !cols.contains(ic.name) {
              return Err(Error::UnknownIndexColumn {
                unit:   unit.version.to_owned(),
                index:  i.name.to_owned(),
                table:  i.table.to_owned(),
                column: ic.name.to_owned(),
              });
            }
          }
        }
      }
    }
  }

  Ok(())
}

fn check_column_deps(
  unit: &str,
  table: &str,
  column: &ColumnDef,
  enums: &BTreeSet<&str>,
  tables: &BTreeMap<&str, BTreeSet<&str>>,
) -> Result<()> {
  if let ColumnType::Tag(enum_name) = column.ty {
    if !enums.contains(enum_name) {
      return Err(Error::UnknownEnumType {
        unit:      unit.to_owned(),
        enum_name: enum_name.to_owned(),
      });
    }
  }

  if let Some((parent_table, parent_column)) = column.references {
    // Self-references are legal; the column set seen so far suffices since
    // the primary key leads every table definition.
    let known = tables
      .get(parent_table)
      .is_some_and(|cols| cols.contains(parent_column));
    if !known && parent_table != table {
      return Err(Error::UnknownReference {
        unit:          unit.to_owned(),
        table:         table.to_owned(),
        column:        column.name.to_owned(),
        parent_table:  parent_table.to_owned(),
        parent_column: parent_column.to_owned(),
      });
    }
  }

  Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
