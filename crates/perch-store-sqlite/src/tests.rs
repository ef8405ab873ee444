//! Integration tests for the convergence engine and `SqliteStore`, against
//! in-memory databases (a temp file where reopen semantics matter).

use std::time::Duration;

use perch_core::{
  analysis::AnalysisStatus,
  client::NewClient,
  domain::{CompetitorType, NewCompetitor, NewDomain},
  keyword::{KeywordScores, NewKeyword},
  schema::{ColumnDef, ColumnType, IndexColumn, IndexDef, MigrationUnit, Op},
  store::AnalyticsStore,
  target::{self, CURRENT_VERSION},
};
use uuid::Uuid;

use crate::{
  converge::{self, ConvergeReport},
  encode,
  introspect::{self, SchemaSnapshot},
  Error, Result, SqliteStore,
};

// ─── Helpers ─────────────────────────────────────────────────────────────────

async fn raw_conn() -> tokio_rusqlite::Connection {
  tokio_rusqlite::Connection::open_in_memory()
    .await
    .expect("in-memory connection")
}

async fn run_units(
  conn: &tokio_rusqlite::Connection,
  units: Vec<MigrationUnit>,
) -> Result<ConvergeReport> {
  conn
    .call(move |c| converge::run(c, &units).map_err(Error::into_call))
    .await
    .map_err(Error::from_call)
}

async fn snapshot(conn: &tokio_rusqlite::Connection) -> SchemaSnapshot {
  conn
    .call(|c| Ok(introspect::snapshot(c)?))
    .await
    .expect("schema snapshot")
}

async fn exec(conn: &tokio_rusqlite::Connection, sql: &str) {
  let sql = sql.to_owned();
  conn
    .call(move |c| Ok(c.execute_batch(&sql)?))
    .await
    .expect("raw sql");
}

async fn one_i64(conn: &tokio_rusqlite::Connection, sql: &str) -> i64 {
  let sql = sql.to_owned();
  conn
    .call(move |c| Ok(c.query_row(&sql, [], |row| row.get(0))?))
    .await
    .expect("scalar query")
}

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory().await.expect("in-memory store")
}

// ─── Convergence: happy path ─────────────────────────────────────────────────

#[tokio::test]
async fn first_run_applies_every_unit() {
  let conn = raw_conn().await;
  let report = run_units(&conn, target::migration_units()).await.unwrap();

  let versions: Vec<&str> = report.units_applied.iter().map(String::as_str).collect();
  assert_eq!(versions, vec![
    "001_initial_schema",
    "002_analysis_pipeline",
    "003_strategy_planning",
    CURRENT_VERSION,
  ]);
  assert!(report.units_already_applied.is_empty());
  assert!(report.tables > 0);
}

#[tokio::test]
async fn converge_creates_expected_objects() {
  let conn = raw_conn().await;
  run_units(&conn, target::migration_units()).await.unwrap();

  // domains carries a foreign key to clients.
  let fks = conn
    .call(|c| Ok(introspect::foreign_keys(c, "domains")?))
    .await
    .unwrap();
  assert!(
    fks
      .iter()
      .any(|fk| fk.parent_table == "clients"
        && fk.column == "client_id"
        && fk.parent_column == "client_id")
  );

  // analysisstatus holds exactly the seven pipeline tags.
  let tags = conn
    .call(|c| Ok(introspect::enum_tags(c, "analysisstatus")?))
    .await
    .unwrap();
  let mut expected: Vec<String> = AnalysisStatus::ALL
    .iter()
    .map(|s| s.as_tag().to_owned())
    .collect();
  expected.sort_unstable();
  assert_eq!(tags, expected);

  // The final unit is recorded exactly once.
  let count = one_i64(
    &conn,
    &format!("SELECT COUNT(*) FROM schema_migrations WHERE version = '{CURRENT_VERSION}'"),
  )
  .await;
  assert_eq!(count, 1);
}

#[tokio::test]
async fn rerun_is_idempotent() {
  let conn = raw_conn().await;
  run_units(&conn, target::migration_units()).await.unwrap();
  let before = snapshot(&conn).await;

  let report = run_units(&conn, target::migration_units()).await.unwrap();
  let after = snapshot(&conn).await;

  assert_eq!(before, after);
  assert!(report.units_applied.is_empty());
  assert_eq!(report.units_already_applied.len(), 4);
}

#[tokio::test]
async fn ledger_exactly_once_after_repeated_runs() {
  let conn = raw_conn().await;
  for _ in 0..3 {
    run_units(&conn, target::migration_units()).await.unwrap();
  }

  let total = one_i64(&conn, "SELECT COUNT(*) FROM schema_migrations").await;
  let distinct = one_i64(&conn, "SELECT COUNT(DISTINCT version) FROM schema_migrations").await;
  assert_eq!(total, 4);
  assert_eq!(distinct, 4);
}

// ─── Convergence: re-entry and partial states ────────────────────────────────

#[tokio::test]
async fn reentry_from_partial_prefix_matches_full_run() {
  let units = target::migration_units();

  // Simulate a run interrupted after the first two units.
  let interrupted = raw_conn().await;
  run_units(&interrupted, units[..2].to_vec()).await.unwrap();

  // Tags present so far predate the additive sync.
  let tags = interrupted
    .call(|c| Ok(introspect::enum_tags(c, "analysisstatus")?))
    .await
    .unwrap();
  assert_eq!(tags.len(), 5);

  run_units(&interrupted, units.clone()).await.unwrap();

  let fresh = raw_conn().await;
  run_units(&fresh, units).await.unwrap();

  assert_eq!(snapshot(&interrupted).await, snapshot(&fresh).await);
}

#[tokio::test]
async fn ledger_row_without_effects_self_heals() {
  let conn = raw_conn().await;
  // A prior run recorded the unit but crashed before its operations landed.
  exec(
    &conn,
    "CREATE TABLE schema_migrations (
       version     TEXT PRIMARY KEY,
       description TEXT NOT NULL,
       applied_at  TEXT NOT NULL
     );
     INSERT INTO schema_migrations (version, description, applied_at)
     VALUES ('001_initial_schema', 'seeded by test', '2024-01-01T00:00:00+00:00');",
  )
  .await;

  let report = run_units(&conn, target::migration_units()).await.unwrap();

  // The operations applied anyway; the ledger row stayed singular.
  let snap = snapshot(&conn).await;
  assert!(snap.tables.contains_key("clients"));
  assert!(snap.tables.contains_key("domains"));
  assert!(
    report
      .units_already_applied
      .contains(&"001_initial_schema".to_owned())
  );
  let count = one_i64(
    &conn,
    "SELECT COUNT(*) FROM schema_migrations WHERE version = '001_initial_schema'",
  )
  .await;
  assert_eq!(count, 1);
}

#[tokio::test]
async fn preexisting_manual_tables_are_absorbed() {
  let conn = raw_conn().await;
  // An instance converged by hand-written DDL that matches the target.
  exec(
    &conn,
    "CREATE TABLE clients (
       client_id     TEXT PRIMARY KEY,
       name          TEXT NOT NULL,
       contact_email TEXT,
       created_at    TEXT NOT NULL,
       updated_at    TEXT NOT NULL
     )",
  )
  .await;

  run_units(&conn, target::migration_units()).await.unwrap();

  // The additive sync still lands its column on the manual table.
  let columns = conn
    .call(|c| Ok(introspect::columns(c, "clients")?))
    .await
    .unwrap();
  assert!(columns.iter().any(|c| c.name == "archived"));
}

// ─── Convergence: failure modes ──────────────────────────────────────────────

#[tokio::test]
async fn structural_conflict_rolls_back_unit() {
  let conn = raw_conn().await;
  run_units(&conn, target::migration_units()).await.unwrap();

  // Somebody altered the live schema out of band with an incompatible type.
  exec(&conn, "ALTER TABLE clients ADD COLUMN priority REAL").await;

  let mut units = target::migration_units();
  units.push(MigrationUnit {
    version:     "900_conflicting_sync",
    description: "adds a column that exists with another type",
    ops:         vec![
      Op::CreateIndex(IndexDef::new(
        "clients_email_idx",
        "clients",
        vec![IndexColumn::asc("contact_email")],
      )),
      Op::AddColumn {
        table:  "clients",
        column: ColumnDef::new("priority", ColumnType::Text).nullable(),
      },
    ],
  });

  let err = run_units(&conn, units).await.unwrap_err();
  match err {
    Error::StructuralConflict { version, table, column, expected, actual } => {
      assert_eq!(version, "900_conflicting_sync");
      assert_eq!(table, "clients");
      assert_eq!(column, "priority");
      assert_eq!(expected, "TEXT");
      assert!(actual.eq_ignore_ascii_case("REAL"));
    }
    other => panic!("expected structural conflict, got {other:?}"),
  }

  // The whole unit rolled back: its index is gone and it was never recorded.
  let snap = snapshot(&conn).await;
  assert!(!snap.indexes.contains("clients_email_idx"));
  assert!(!snap.ledger.contains(&"900_conflicting_sync".to_owned()));
}

#[tokio::test]
async fn invalid_unit_list_rejected_before_touching_database() {
  let conn = raw_conn().await;
  let units = vec![MigrationUnit {
    version:     "001_bad",
    description: "tags against an enum that is never created",
    ops:         vec![Op::CreateTable(perch_core::schema::TableDef::new(
      "things",
      vec![
        ColumnDef::new("thing_id", ColumnType::Id),
        ColumnDef::new("shade", ColumnType::Tag("color")),
      ],
    ))],
  }];

  let err = run_units(&conn, units).await.unwrap_err();
  assert!(matches!(err, Error::Core(_)));

  // Nothing was created, not even the ledger.
  assert!(snapshot(&conn).await.tables.is_empty());
}

// ─── Store: clients ──────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_client() {
  let s = store().await;

  let client = s
    .add_client(NewClient {
      name:          "Acme Outdoor".into(),
      contact_email: Some("seo@acme.example".into()),
    })
    .await
    .unwrap();
  assert!(!client.archived);

  let fetched = s.get_client(client.client_id).await.unwrap().unwrap();
  assert_eq!(fetched.client_id, client.client_id);
  assert_eq!(fetched.name, "Acme Outdoor");
  assert_eq!(fetched.contact_email.as_deref(), Some("seo@acme.example"));
}

#[tokio::test]
async fn get_client_missing_returns_none() {
  let s = store().await;
  assert!(s.get_client(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn archive_client_sets_flag_and_touches_updated_at() {
  let s = store().await;
  let client = s
    .add_client(NewClient { name: "Acme".into(), contact_email: None })
    .await
    .unwrap();

  tokio::time::sleep(Duration::from_millis(10)).await;
  let archived = s.archive_client(client.client_id).await.unwrap();

  assert!(archived.archived);
  assert_eq!(archived.created_at, client.created_at);
  assert!(archived.updated_at > client.updated_at);
}

#[tokio::test]
async fn list_clients_excludes_archived_by_default() {
  let s = store().await;
  let kept = s
    .add_client(NewClient { name: "Kept".into(), contact_email: None })
    .await
    .unwrap();
  let gone = s
    .add_client(NewClient { name: "Gone".into(), contact_email: None })
    .await
    .unwrap();
  s.archive_client(gone.client_id).await.unwrap();

  let active = s.list_clients(false).await.unwrap();
  assert_eq!(active.len(), 1);
  assert_eq!(active[0].client_id, kept.client_id);

  let all = s.list_clients(true).await.unwrap();
  assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn archive_missing_client_is_not_found() {
  let s = store().await;
  let err = s.archive_client(Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(err, Error::ClientNotFound(_)));
}

// ─── Store: domains and competitors ──────────────────────────────────────────

async fn client_and_domain(s: &SqliteStore) -> (Uuid, Uuid) {
  let client = s
    .add_client(NewClient { name: "Acme".into(), contact_email: None })
    .await
    .unwrap();
  let domain = s
    .add_domain(NewDomain { client_id: client.client_id, host: "acme.example".into() })
    .await
    .unwrap();
  (client.client_id, domain.domain_id)
}

#[tokio::test]
async fn update_domain_settings_round_trips() {
  let s = store().await;
  let (_, domain_id) = client_and_domain(&s).await;

  let settings = serde_json::json!({ "locale": "en-GB", "crawl_depth": 3 });
  tokio::time::sleep(Duration::from_millis(10)).await;
  let updated = s
    .update_domain_settings(domain_id, settings.clone())
    .await
    .unwrap();

  assert_eq!(updated.settings, settings);
  assert!(updated.updated_at > updated.created_at);

  let fetched = s.get_domain(domain_id).await.unwrap().unwrap();
  assert_eq!(fetched.settings, settings);
}

#[tokio::test]
async fn add_domain_requires_existing_client() {
  let s = store().await;
  let result = s
    .add_domain(NewDomain { client_id: Uuid::new_v4(), host: "orphan.example".into() })
    .await;
  assert!(result.is_err());
}

#[tokio::test]
async fn competitor_kind_round_trips() {
  let s = store().await;
  let (_, domain_id) = client_and_domain(&s).await;

  s.add_competitor(NewCompetitor {
    domain_id,
    host: "rival.example".into(),
    kind: CompetitorType::Aspirational,
    notes: Some("category leader".into()),
  })
  .await
  .unwrap();

  let competitors = s.list_competitors(domain_id).await.unwrap();
  assert_eq!(competitors.len(), 1);
  assert_eq!(competitors[0].kind, CompetitorType::Aspirational);
  assert_eq!(competitors[0].notes.as_deref(), Some("category leader"));
}

// ─── Store: keywords ─────────────────────────────────────────────────────────

#[tokio::test]
async fn record_keyword_scores_persists_and_touches() {
  let s = store().await;
  let (_, domain_id) = client_and_domain(&s).await;

  let keyword = s
    .add_keyword(NewKeyword {
      domain_id,
      phrase: "trail running shoes".into(),
      search_volume: Some(12_000),
    })
    .await
    .unwrap();
  assert!(keyword.opportunity_score.is_none());

  tokio::time::sleep(Duration::from_millis(10)).await;
  let scored = s
    .record_keyword_scores(
      keyword.keyword_id,
      KeywordScores { opportunity: 0.82, winnability: 0.44 },
    )
    .await
    .unwrap();

  assert_eq!(scored.opportunity_score, Some(0.82));
  assert_eq!(scored.winnability_score, Some(0.44));
  assert!(scored.updated_at > keyword.updated_at);

  let listed = s.list_keywords(domain_id).await.unwrap();
  assert_eq!(listed.len(), 1);
  assert_eq!(listed[0].winnability_score, Some(0.44));
}

#[tokio::test]
async fn score_missing_keyword_is_not_found() {
  let s = store().await;
  let err = s
    .record_keyword_scores(Uuid::new_v4(), KeywordScores { opportunity: 0.1, winnability: 0.1 })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::KeywordNotFound(_)));
}

// ─── Store: analyses ─────────────────────────────────────────────────────────

#[tokio::test]
async fn analysis_lifecycle_sets_finished_at() {
  let s = store().await;
  let (_, domain_id) = client_and_domain(&s).await;

  let analysis = s.start_analysis(domain_id).await.unwrap();
  assert_eq!(analysis.status, AnalysisStatus::Pending);
  assert!(analysis.finished_at.is_none());

  let running = s
    .set_analysis_status(analysis.analysis_id, AnalysisStatus::Collecting, None)
    .await
    .unwrap();
  assert_eq!(running.status, AnalysisStatus::Collecting);
  assert!(running.finished_at.is_none());

  let failed = s
    .set_analysis_status(
      analysis.analysis_id,
      AnalysisStatus::Failed,
      Some("crawler timeout".into()),
    )
    .await
    .unwrap();
  assert_eq!(failed.status, AnalysisStatus::Failed);
  assert!(failed.finished_at.is_some());
  assert_eq!(failed.error_detail.as_deref(), Some("crawler timeout"));
}

#[tokio::test]
async fn start_analysis_requires_existing_domain() {
  let s = store().await;
  let err = s.start_analysis(Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(err, Error::DomainNotFound(_)));
}

#[tokio::test]
async fn tag_outside_enum_set_rejected_by_schema() {
  let s = store().await;
  let (_, domain_id) = client_and_domain(&s).await;
  let domain_str = encode::encode_uuid(domain_id);

  // Bypass the store and write an illegal status tag directly.
  let result = s
    .connection()
    .call(move |c| {
      c.execute(
        "INSERT INTO analyses
           (analysis_id, domain_id, status, started_at, created_at, updated_at)
         VALUES (?1, ?2, 'bogus', ?3, ?3, ?3)",
        rusqlite::params![
          encode::encode_uuid(Uuid::new_v4()),
          domain_str,
          "2024-01-01T00:00:00+00:00",
        ],
      )?;
      Ok(())
    })
    .await;
  assert!(result.is_err());
}

#[test]
fn decode_unknown_tag_is_error() {
  let err = encode::decode_analysis_status("bogus").unwrap_err();
  assert!(matches!(
    err,
    Error::UnknownTag { enum_name: "analysisstatus", .. }
  ));

  assert_eq!(
    encode::decode_competitor_type("direct").unwrap(),
    CompetitorType::Direct
  );
}

// ─── Store: ledger and persistence ───────────────────────────────────────────

#[tokio::test]
async fn ledger_queries_via_store() {
  let s = store().await;

  assert!(s.is_applied(CURRENT_VERSION).await.unwrap());
  assert!(!s.is_applied("999_unwritten").await.unwrap());

  let entries = s.applied_versions().await.unwrap();
  assert_eq!(entries.len(), 4);
  assert_eq!(entries[0].version, "001_initial_schema");
  assert_eq!(entries[3].version, CURRENT_VERSION);
}

#[tokio::test]
async fn persistence_across_reopen() {
  let dir = tempfile::tempdir().expect("temp dir");
  let path = dir.path().join("perch.db");

  let client_id = {
    let s = SqliteStore::open(&path).await.unwrap();
    let client = s
      .add_client(NewClient { name: "Durable".into(), contact_email: None })
      .await
      .unwrap();
    client.client_id
  };

  // Reopen converges again; nothing changes, data survives.
  let reopened = SqliteStore::open(&path).await.unwrap();
  let fetched = reopened.get_client(client_id).await.unwrap().unwrap();
  assert_eq!(fetched.name, "Durable");
  assert_eq!(reopened.applied_versions().await.unwrap().len(), 4);
}
