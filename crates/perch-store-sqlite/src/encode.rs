//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. JSON documents are stored
//! as compact JSON text. UUIDs are stored as hyphenated lowercase strings.
//! Enum tags are stored exactly as the enum type declares them.

use chrono::{DateTime, Utc};
use perch_core::{
  analysis::{Analysis, AnalysisStatus},
  client::Client,
  domain::{Competitor, CompetitorType, Domain},
  keyword::Keyword,
  schema::LedgerEntry,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc>
// ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enum tags
// ────────────────────────────────────────────────────────────────

pub fn encode_analysis_status(s: AnalysisStatus) -> &'static str { s.as_tag() }

pub fn decode_analysis_status(s: &str) -> Result<AnalysisStatus> {
  AnalysisStatus::ALL
    .into_iter()
    .find(|v| v.as_tag() == s)
    .ok_or_else(|| Error::UnknownTag { enum_name: "analysisstatus", tag: s.to_owned() })
}

pub fn encode_competitor_type(k: CompetitorType) -> &'static str { k.as_tag() }

pub fn decode_competitor_type(s: &str) -> Result<CompetitorType> {
  CompetitorType::ALL
    .into_iter()
    .find(|v| v.as_tag() == s)
    .ok_or_else(|| Error::UnknownTag { enum_name: "competitortype", tag: s.to_owned() })
}

// ─── JSON documents
// ───────────────────────────────────────────────────────────

pub fn encode_json(value: &serde_json::Value) -> String { value.to_string() }

pub fn decode_json(s: &str) -> Result<serde_json::Value> { Ok(serde_json::from_str(s)?) }

// ─── Raw row types ───────────────────────────────────────────────────────────

/// `clients` row before decoding.
pub struct RawClient {
  pub client_id:     String,
  pub name:          String,
  pub contact_email: Option<String>,
  pub archived:      bool,
  pub created_at:    String,
  pub updated_at:    String,
}

impl RawClient {
  pub fn into_client(self) -> Result<Client> {
    Ok(Client {
      client_id:     decode_uuid(&self.client_id)?,
      name:          self.name,
      contact_email: self.contact_email,
      archived:      self.archived,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

/// `domains` row before decoding.
pub struct RawDomain {
  pub domain_id:  String,
  pub client_id:  String,
  pub host:       String,
  pub settings:   String,
  pub created_at: String,
  pub updated_at: String,
}

impl RawDomain {
  pub fn into_domain(self) -> Result<Domain> {
    Ok(Domain {
      domain_id:  decode_uuid(&self.domain_id)?,
      client_id:  decode_uuid(&self.client_id)?,
      host:       self.host,
      settings:   decode_json(&self.settings)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// `competitors` row before decoding.
pub struct RawCompetitor {
  pub competitor_id: String,
  pub domain_id:     String,
  pub host:          String,
  pub kind:          String,
  pub notes:         Option<String>,
  pub created_at:    String,
  pub updated_at:    String,
}

impl RawCompetitor {
  pub fn into_competitor(self) -> Result<Competitor> {
    Ok(Competitor {
      competitor_id: decode_uuid(&self.competitor_id)?,
      domain_id:     decode_uuid(&self.domain_id)?,
      host:          self.host,
      kind:          decode_competitor_type(&self.kind)?,
      notes:         self.notes,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

/// `keywords` row before decoding.
pub struct RawKeyword {
  pub keyword_id:        String,
  pub domain_id:         String,
  pub phrase:            String,
  pub search_volume:     Option<i64>,
  pub difficulty:        Option<f64>,
  pub opportunity_score: Option<f64>,
  pub winnability_score: Option<f64>,
  pub created_at:        String,
  pub updated_at:        String,
}

impl RawKeyword {
  pub fn into_keyword(self) -> Result<Keyword> {
    Ok(Keyword {
      keyword_id:        decode_uuid(&self.keyword_id)?,
      domain_id:         decode_uuid(&self.domain_id)?,
      phrase:            self.phrase,
      search_volume:     self.search_volume,
      difficulty:        self.difficulty,
      opportunity_score: self.opportunity_score,
      winnability_score: self.winnability_score,
      created_at:        decode_dt(&self.created_at)?,
      updated_at:        decode_dt(&self.updated_at)?,
    })
  }
}

/// `analyses` row before decoding.
pub struct RawAnalysis {
  pub analysis_id:  String,
  pub domain_id:    String,
  pub status:       String,
  pub started_at:   String,
  pub finished_at:  Option<String>,
  pub error_detail: Option<String>,
  pub created_at:   String,
  pub updated_at:   String,
}

impl RawAnalysis {
  pub fn into_analysis(self) -> Result<Analysis> {
    Ok(Analysis {
      analysis_id:  decode_uuid(&self.analysis_id)?,
      domain_id:    decode_uuid(&self.domain_id)?,
      status:       decode_analysis_status(&self.status)?,
      started_at:   decode_dt(&self.started_at)?,
      finished_at:  self.finished_at.as_deref().map(decode_dt).transpose()?,
      error_detail: self.error_detail,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}

/// `schema_migrations` row before decoding.
pub struct RawLedgerEntry {
  pub version:     String,
  pub description: String,
  pub applied_at:  String,
}

impl RawLedgerEntry {
  pub fn into_entry(self) -> Result<LedgerEntry> {
    Ok(LedgerEntry {
      version:     self.version,
      description: self.description,
      applied_at:  decode_dt(&self.applied_at)?,
    })
  }
}
