//! The `AnalyticsStore` trait.
//!
//! Implemented by storage backends (e.g. `perch-store-sqlite`). Application
//! code — scoring pipelines, report generators, the CLI — depends on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  analysis::{Analysis, AnalysisStatus},
  client::{Client, NewClient},
  domain::{Competitor, Domain, NewCompetitor, NewDomain},
  keyword::{Keyword, KeywordScores, NewKeyword},
  schema::LedgerEntry,
};

/// Abstraction over a Perch analytics store backend.
///
/// Every update issued through this trait sets the row's `updated_at` to the
/// moment of the write, in the same statement as the change itself. The
/// invariant lives here, in the write path, rather than in database
/// triggers, so it is visible in application code and testable without a
/// live database.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes.
pub trait AnalyticsStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Clients ───────────────────────────────────────────────────────────

  /// Create and persist a new client.
  fn add_client(
    &self,
    input: NewClient,
  ) -> impl Future<Output = Result<Client, Self::Error>> + Send + '_;

  /// Retrieve a client by UUID. Returns `None` if not found.
  fn get_client(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Client>, Self::Error>> + Send + '_;

  /// List clients, optionally including archived ones.
  fn list_clients(
    &self,
    include_archived: bool,
  ) -> impl Future<Output = Result<Vec<Client>, Self::Error>> + Send + '_;

  /// Mark a client archived. Archival is the only lifecycle transition;
  /// clients are never deleted.
  fn archive_client(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Client, Self::Error>> + Send + '_;

  // ── Domains ───────────────────────────────────────────────────────────

  fn add_domain(
    &self,
    input: NewDomain,
  ) -> impl Future<Output = Result<Domain, Self::Error>> + Send + '_;

  fn get_domain(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Domain>, Self::Error>> + Send + '_;

  fn list_domains(
    &self,
    client_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Domain>, Self::Error>> + Send + '_;

  /// Replace a domain's settings document.
  fn update_domain_settings(
    &self,
    id: Uuid,
    settings: serde_json::Value,
  ) -> impl Future<Output = Result<Domain, Self::Error>> + Send + '_;

  // ── Competitors ───────────────────────────────────────────────────────

  fn add_competitor(
    &self,
    input: NewCompetitor,
  ) -> impl Future<Output = Result<Competitor, Self::Error>> + Send + '_;

  fn list_competitors(
    &self,
    domain_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Competitor>, Self::Error>> + Send + '_;

  // ── Keywords ──────────────────────────────────────────────────────────

  fn add_keyword(
    &self,
    input: NewKeyword,
  ) -> impl Future<Output = Result<Keyword, Self::Error>> + Send + '_;

  fn list_keywords(
    &self,
    domain_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Keyword>, Self::Error>> + Send + '_;

  /// Persist scores computed by the external scoring pipeline.
  fn record_keyword_scores(
    &self,
    id: Uuid,
    scores: KeywordScores,
  ) -> impl Future<Output = Result<Keyword, Self::Error>> + Send + '_;

  // ── Analyses ──────────────────────────────────────────────────────────

  /// Begin a new analysis run in the `pending` state.
  fn start_analysis(
    &self,
    domain_id: Uuid,
  ) -> impl Future<Output = Result<Analysis, Self::Error>> + Send + '_;

  /// Advance an analysis run. Terminal statuses set `finished_at`;
  /// `error_detail` is only meaningful for `failed`.
  fn set_analysis_status(
    &self,
    id: Uuid,
    status: AnalysisStatus,
    error_detail: Option<String>,
  ) -> impl Future<Output = Result<Analysis, Self::Error>> + Send + '_;

  fn get_analysis(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Analysis>, Self::Error>> + Send + '_;

  // ── Migration ledger ──────────────────────────────────────────────────

  /// All ledger entries in version order. Read-only; external tooling may
  /// use this to answer "is version X applied?" without side effects.
  fn applied_versions(
    &self,
  ) -> impl Future<Output = Result<Vec<LedgerEntry>, Self::Error>> + Send + '_;

  /// Whether the ledger records `version` as applied.
  fn is_applied<'a>(
    &'a self,
    version: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;
}
