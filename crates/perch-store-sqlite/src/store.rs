//! [`SqliteStore`] — the SQLite implementation of [`AnalyticsStore`].

use std::path::Path;

use chrono::Utc;
use perch_core::{
  analysis::{Analysis, AnalysisStatus},
  client::{Client, NewClient},
  domain::{Competitor, Domain, NewCompetitor, NewDomain},
  keyword::{Keyword, KeywordScores, NewKeyword},
  schema::LedgerEntry,
  store::AnalyticsStore,
  target,
};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  converge::{self, ConvergeReport},
  encode::{
    encode_analysis_status, encode_competitor_type, encode_dt, encode_json, encode_uuid,
    RawAnalysis, RawClient, RawCompetitor, RawDomain, RawKeyword, RawLedgerEntry,
  },
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Perch analytics store backed by a single SQLite file.
///
/// Opening a store converges the database to the target schema; the store is
/// never handed out against a stale schema. Cloning is cheap — the inner
/// connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and converge it to the target
  /// schema.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Ok(Self::open_with_report(path).await?.0)
  }

  /// Like [`SqliteStore::open`], also returning the convergence report —
  /// used by deployment tooling that surfaces what a run changed.
  pub async fn open_with_report(path: impl AsRef<Path>) -> Result<(Self, ConvergeReport)> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    let report = store.converge().await?;
    Ok((store, report))
  }

  /// Open a store read-only, without converging. Ledger queries stay
  /// side-effect free; writes will fail.
  pub async fn open_readonly(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_with_flags(
      path,
      rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
    )
    .await?;
    Ok(Self { conn })
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.converge().await?;
    Ok(store)
  }

  /// Run the convergence engine against this store's database. Safe to call
  /// any number of times; see [`converge::run`].
  pub async fn converge(&self) -> Result<ConvergeReport> {
    let units = target::migration_units();
    self
      .conn
      .call(move |conn| converge::run(conn, &units).map_err(Error::into_call))
      .await
      .map_err(Error::from_call)
  }

  pub(crate) fn connection(&self) -> &tokio_rusqlite::Connection {
    &self.conn
  }

  // ── Private fetch helpers ───────────────────────────────────────────────

  async fn fetch_keyword(&self, id: Uuid) -> Result<Option<Keyword>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawKeyword> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT keyword_id, domain_id, phrase, search_volume, difficulty,
                      opportunity_score, winnability_score, created_at, updated_at
               FROM keywords WHERE keyword_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawKeyword {
                  keyword_id:        row.get(0)?,
                  domain_id:         row.get(1)?,
                  phrase:            row.get(2)?,
                  search_volume:     row.get(3)?,
                  difficulty:        row.get(4)?,
                  opportunity_score: row.get(5)?,
                  winnability_score: row.get(6)?,
                  created_at:        row.get(7)?,
                  updated_at:        row.get(8)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawKeyword::into_keyword).transpose()
  }
}

// ─── AnalyticsStore impl ─────────────────────────────────────────────────────

impl AnalyticsStore for SqliteStore {
  type Error = Error;

  // ── Clients ───────────────────────────────────────────────────────────────

  async fn add_client(&self, input: NewClient) -> Result<Client> {
    let now = Utc::now();
    let client = Client {
      client_id:     Uuid::new_v4(),
      name:          input.name,
      contact_email: input.contact_email,
      archived:      false,
      created_at:    now,
      updated_at:    now,
    };

    let id_str = encode_uuid(client.client_id);
    let name = client.name.clone();
    let contact_email = client.contact_email.clone();
    let at_str = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO clients (client_id, name, contact_email, archived, created_at, updated_at)
           VALUES (?1, ?2, ?3, 0, ?4, ?4)",
          rusqlite::params![id_str, name, contact_email, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(client)
  }

  async fn get_client(&self, id: Uuid) -> Result<Option<Client>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawClient> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT client_id, name, contact_email, archived, created_at, updated_at
               FROM clients WHERE client_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawClient {
                  client_id:     row.get(0)?,
                  name:          row.get(1)?,
                  contact_email: row.get(2)?,
                  archived:      row.get(3)?,
                  created_at:    row.get(4)?,
                  updated_at:    row.get(5)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawClient::into_client).transpose()
  }

  async fn list_clients(&self, include_archived: bool) -> Result<Vec<Client>> {
    let raws: Vec<RawClient> = self
      .conn
      .call(move |conn| {
        let sql = if include_archived {
          "SELECT client_id, name, contact_email, archived, created_at, updated_at
           FROM clients ORDER BY name"
        } else {
          "SELECT client_id, name, contact_email, archived, created_at, updated_at
           FROM clients WHERE archived = 0 ORDER BY name"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawClient {
              client_id:     row.get(0)?,
              name:          row.get(1)?,
              contact_email: row.get(2)?,
              archived:      row.get(3)?,
              created_at:    row.get(4)?,
              updated_at:    row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawClient::into_client).collect()
  }

  async fn archive_client(&self, id: Uuid) -> Result<Client> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE clients SET archived = 1, updated_at = ?2 WHERE client_id = ?1",
          rusqlite::params![id_str, at_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::ClientNotFound(id));
    }
    self.get_client(id).await?.ok_or(Error::ClientNotFound(id))
  }

  // ── Domains ───────────────────────────────────────────────────────────────

  async fn add_domain(&self, input: NewDomain) -> Result<Domain> {
    let now = Utc::now();
    let domain = Domain {
      domain_id:  Uuid::new_v4(),
      client_id:  input.client_id,
      host:       input.host,
      settings:   serde_json::json!({}),
      created_at: now,
      updated_at: now,
    };

    let id_str = encode_uuid(domain.domain_id);
    let client_id_str = encode_uuid(domain.client_id);
    let host = domain.host.clone();
    let settings_str = encode_json(&domain.settings);
    let at_str = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO domains (domain_id, client_id, host, settings, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
          rusqlite::params![id_str, client_id_str, host, settings_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(domain)
  }

  async fn get_domain(&self, id: Uuid) -> Result<Option<Domain>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawDomain> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT domain_id, client_id, host, settings, created_at, updated_at
               FROM domains WHERE domain_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawDomain {
                  domain_id:  row.get(0)?,
                  client_id:  row.get(1)?,
                  host:       row.get(2)?,
                  settings:   row.get(3)?,
                  created_at: row.get(4)?,
                  updated_at: row.get(5)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawDomain::into_domain).transpose()
  }

  async fn list_domains(&self, client_id: Uuid) -> Result<Vec<Domain>> {
    let client_id_str = encode_uuid(client_id);

    let raws: Vec<RawDomain> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT domain_id, client_id, host, settings, created_at, updated_at
           FROM domains WHERE client_id = ?1 ORDER BY host",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![client_id_str], |row| {
            Ok(RawDomain {
              domain_id:  row.get(0)?,
              client_id:  row.get(1)?,
              host:       row.get(2)?,
              settings:   row.get(3)?,
              created_at: row.get(4)?,
              updated_at: row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDomain::into_domain).collect()
  }

  async fn update_domain_settings(
    &self,
    id: Uuid,
    settings: serde_json::Value,
  ) -> Result<Domain> {
    let id_str = encode_uuid(id);
    let settings_str = encode_json(&settings);
    let at_str = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE domains SET settings = ?2, updated_at = ?3 WHERE domain_id = ?1",
          rusqlite::params![id_str, settings_str, at_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::DomainNotFound(id));
    }
    self.get_domain(id).await?.ok_or(Error::DomainNotFound(id))
  }

  // ── Competitors ───────────────────────────────────────────────────────────

  async fn add_competitor(&self, input: NewCompetitor) -> Result<Competitor> {
    let now = Utc::now();
    let competitor = Competitor {
      competitor_id: Uuid::new_v4(),
      domain_id:     input.domain_id,
      host:          input.host,
      kind:          input.kind,
      notes:         input.notes,
      created_at:    now,
      updated_at:    now,
    };

    let id_str = encode_uuid(competitor.competitor_id);
    let domain_id_str = encode_uuid(competitor.domain_id);
    let host = competitor.host.clone();
    let kind_str = encode_competitor_type(competitor.kind).to_owned();
    let notes = competitor.notes.clone();
    let at_str = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO competitors (competitor_id, domain_id, host, kind, notes, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
          rusqlite::params![id_str, domain_id_str, host, kind_str, notes, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(competitor)
  }

  async fn list_competitors(&self, domain_id: Uuid) -> Result<Vec<Competitor>> {
    let domain_id_str = encode_uuid(domain_id);

    let raws: Vec<RawCompetitor> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT competitor_id, domain_id, host, kind, notes, created_at, updated_at
           FROM competitors WHERE domain_id = ?1 ORDER BY host",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![domain_id_str], |row| {
            Ok(RawCompetitor {
              competitor_id: row.get(0)?,
              domain_id:     row.get(1)?,
              host:          row.get(2)?,
              kind:          row.get(3)?,
              notes:         row.get(4)?,
              created_at:    row.get(5)?,
              updated_at:    row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCompetitor::into_competitor).collect()
  }

  // ── Keywords ──────────────────────────────────────────────────────────────

  async fn add_keyword(&self, input: NewKeyword) -> Result<Keyword> {
    let now = Utc::now();
    let keyword = Keyword {
      keyword_id:        Uuid::new_v4(),
      domain_id:         input.domain_id,
      phrase:            input.phrase,
      search_volume:     input.search_volume,
      difficulty:        None,
      opportunity_score: None,
      winnability_score: None,
      created_at:        now,
      updated_at:        now,
    };

    let id_str = encode_uuid(keyword.keyword_id);
    let domain_id_str = encode_uuid(keyword.domain_id);
    let phrase = keyword.phrase.clone();
    let search_volume = keyword.search_volume;
    let at_str = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO keywords (keyword_id, domain_id, phrase, search_volume, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
          rusqlite::params![id_str, domain_id_str, phrase, search_volume, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(keyword)
  }

  async fn list_keywords(&self, domain_id: Uuid) -> Result<Vec<Keyword>> {
    let domain_id_str = encode_uuid(domain_id);

    let raws: Vec<RawKeyword> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT keyword_id, domain_id, phrase, search_volume, difficulty,
                  opportunity_score, winnability_score, created_at, updated_at
           FROM keywords WHERE domain_id = ?1 ORDER BY phrase",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![domain_id_str], |row| {
            Ok(RawKeyword {
              keyword_id:        row.get(0)?,
              domain_id:         row.get(1)?,
              phrase:            row.get(2)?,
              search_volume:     row.get(3)?,
              difficulty:        row.get(4)?,
              opportunity_score: row.get(5)?,
              winnability_score: row.get(6)?,
              created_at:        row.get(7)?,
              updated_at:        row.get(8)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawKeyword::into_keyword).collect()
  }

  async fn record_keyword_scores(&self, id: Uuid, scores: KeywordScores) -> Result<Keyword> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE keywords
           SET opportunity_score = ?2, winnability_score = ?3, updated_at = ?4
           WHERE keyword_id = ?1",
          rusqlite::params![id_str, scores.opportunity, scores.winnability, at_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::KeywordNotFound(id));
    }
    self.fetch_keyword(id).await?.ok_or(Error::KeywordNotFound(id))
  }

  // ── Analyses ──────────────────────────────────────────────────────────────

  async fn start_analysis(&self, domain_id: Uuid) -> Result<Analysis> {
    if self.get_domain(domain_id).await?.is_none() {
      return Err(Error::DomainNotFound(domain_id));
    }

    let now = Utc::now();
    let analysis = Analysis {
      analysis_id:  Uuid::new_v4(),
      domain_id,
      status:       AnalysisStatus::Pending,
      started_at:   now,
      finished_at:  None,
      error_detail: None,
      created_at:   now,
      updated_at:   now,
    };

    let id_str = encode_uuid(analysis.analysis_id);
    let domain_id_str = encode_uuid(domain_id);
    let status_str = encode_analysis_status(analysis.status).to_owned();
    let at_str = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO analyses (analysis_id, domain_id, status, started_at, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?4, ?4)",
          rusqlite::params![id_str, domain_id_str, status_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(analysis)
  }

  async fn set_analysis_status(
    &self,
    id: Uuid,
    status: AnalysisStatus,
    error_detail: Option<String>,
  ) -> Result<Analysis> {
    let id_str = encode_uuid(id);
    let status_str = encode_analysis_status(status).to_owned();
    let now = Utc::now();
    let finished_str = status.is_terminal().then(|| encode_dt(now));
    let at_str = encode_dt(now);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE analyses
           SET status = ?2, finished_at = ?3, error_detail = ?4, updated_at = ?5
           WHERE analysis_id = ?1",
          rusqlite::params![id_str, status_str, finished_str, error_detail, at_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::AnalysisNotFound(id));
    }
    self.get_analysis(id).await?.ok_or(Error::AnalysisNotFound(id))
  }

  async fn get_analysis(&self, id: Uuid) -> Result<Option<Analysis>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawAnalysis> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT analysis_id, domain_id, status, started_at, finished_at,
                      error_detail, created_at, updated_at
               FROM analyses WHERE analysis_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawAnalysis {
                  analysis_id:  row.get(0)?,
                  domain_id:    row.get(1)?,
                  status:       row.get(2)?,
                  started_at:   row.get(3)?,
                  finished_at:  row.get(4)?,
                  error_detail: row.get(5)?,
                  created_at:   row.get(6)?,
                  updated_at:   row.get(7)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAnalysis::into_analysis).transpose()
  }

  // ── Migration ledger ──────────────────────────────────────────────────────

  async fn applied_versions(&self) -> Result<Vec<LedgerEntry>> {
    let raws: Vec<RawLedgerEntry> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT version, description, applied_at FROM schema_migrations ORDER BY version",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawLedgerEntry {
              version:     row.get(0)?,
              description: row.get(1)?,
              applied_at:  row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawLedgerEntry::into_entry).collect()
  }

  async fn is_applied(&self, version: &str) -> Result<bool> {
    let version = version.to_owned();

    let found: bool = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM schema_migrations WHERE version = ?1",
              rusqlite::params![version],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;

    Ok(found)
  }
}
