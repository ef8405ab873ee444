//! Error type for `perch-store-sqlite`.
//!
//! Convergence failures follow the taxonomy the engine is built around:
//! benign duplicates are absorbed before they ever become an `Error`,
//! structural conflicts are fatal and carry enough detail for manual
//! resolution, and connectivity problems propagate as-is so the caller can
//! decide retry policy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The authored migration unit list failed validation. Nothing was
  /// applied.
  #[error("schema validation error: {0}")]
  Core(#[from] perch_core::Error),

  /// Connectivity or other transient database failure. Retry policy belongs
  /// to the caller; the engine never loops internally.
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sql error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  /// A structural operation failed for a reason other than the object
  /// already existing. The enclosing unit was rolled back.
  #[error("migration unit {version} failed at `{op}`: {source}")]
  UnitFailed {
    version: &'static str,
    op:      String,
    #[source]
    source:  rusqlite::Error,
  },

  /// An existing column's type is incompatible with the target schema.
  /// Fatal — re-running cannot succeed without human intervention.
  #[error(
    "structural conflict in unit {version}: column {table}.{column} \
     is declared {expected} but exists as {actual}"
  )]
  StructuralConflict {
    version:  &'static str,
    table:    String,
    column:   String,
    expected: &'static str,
    actual:   String,
  },

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A persisted tag is not in the enum type's declared set.
  #[error("unknown tag {tag:?} for enum type {enum_name}")]
  UnknownTag {
    enum_name: &'static str,
    tag:       String,
  },

  #[error("client not found: {0}")]
  ClientNotFound(uuid::Uuid),

  #[error("domain not found: {0}")]
  DomainNotFound(uuid::Uuid),

  #[error("keyword not found: {0}")]
  KeywordNotFound(uuid::Uuid),

  #[error("analysis not found: {0}")]
  AnalysisNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  /// Smuggle a store error through a [`tokio_rusqlite::Connection::call`]
  /// closure, which can only fail with [`tokio_rusqlite::Error`].
  pub(crate) fn into_call(self) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Other(Box::new(self))
  }

  /// Recover an error smuggled by [`Error::into_call`]; anything else is a
  /// genuine database-layer failure.
  pub(crate) fn from_call(err: tokio_rusqlite::Error) -> Self {
    match err {
      tokio_rusqlite::Error::Other(inner) => match inner.downcast::<Error>() {
        Ok(e) => *e,
        Err(inner) => Error::Database(tokio_rusqlite::Error::Other(inner)),
      },
      other => Error::Database(other),
    }
  }
}
