//! Error types for `perch-core`.
//!
//! Every variant here is an authoring-time defect in the migration unit
//! list — the convergence engine refuses to touch a database until the
//! unit list validates cleanly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("migration version declared more than once: {0}")]
  DuplicateVersion(String),

  #[error("unit {unit}: enum type {enum_name:?} is not created by any earlier operation")]
  UnknownEnumType { unit: String, enum_name: String },

  #[error("unit {unit}: table {table:?} is not created by any earlier operation")]
  UnknownTable { unit: String, table: String },

  #[error("unit {unit}: {table}.{column} references unknown column {parent_table}.{parent_column}")]
  UnknownReference {
    unit:          String,
    table:         String,
    column:        String,
    parent_table:  String,
    parent_column: String,
  },

  #[error("unit {unit}: column {table}.{column} is declared more than once")]
  DuplicateColumn {
    unit:   String,
    table:  String,
    column: String,
  },

  #[error("unit {unit}: table {table:?} must lead with an `Id` primary-key column")]
  MissingIdPrimaryKey { unit: String, table: String },

  #[error(
    "unit {unit}: added column {table}.{column} is NOT NULL with no default; \
     existing rows could not satisfy it"
  )]
  AddColumnNeedsDefault {
    unit:   String,
    table:  String,
    column: String,
  },

  #[error("unit {unit}: index {index:?} names unknown column {table}.{column}")]
  UnknownIndexColumn {
    unit:   String,
    index:  String,
    table:  String,
    column: String,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
