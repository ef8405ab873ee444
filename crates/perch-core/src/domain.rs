//! Domains under analysis and the competitors tracked against them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A web property owned by a client, the anchor of all keyword and
/// competitive data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
  pub domain_id:  Uuid,
  pub client_id:  Uuid,
  pub host:       String,
  /// Free-form per-domain configuration (crawl cadence, locale, etc.),
  /// owned entirely by the application layer.
  pub settings:   serde_json::Value,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDomain {
  pub client_id: Uuid,
  pub host:      String,
}

/// How a competitor relates to the domain it is tracked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompetitorType {
  /// Competes for the same customers with the same offering.
  Direct,
  /// Overlaps on keywords without competing commercially.
  Indirect,
  /// Out of reach today; used as a benchmark.
  Aspirational,
}

impl CompetitorType {
  /// All variants, in the order the enum type declares its tags.
  pub const ALL: [CompetitorType; 3] = [
    CompetitorType::Direct,
    CompetitorType::Indirect,
    CompetitorType::Aspirational,
  ];

  /// The tag stored in the `competitors.kind` column.
  pub fn as_tag(self) -> &'static str {
    match self {
      CompetitorType::Direct => "direct",
      CompetitorType::Indirect => "indirect",
      CompetitorType::Aspirational => "aspirational",
    }
  }
}

/// A rival host tracked against one of a client's domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Competitor {
  pub competitor_id: Uuid,
  pub domain_id:     Uuid,
  pub host:          String,
  pub kind:          CompetitorType,
  pub notes:         Option<String>,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCompetitor {
  pub domain_id: Uuid,
  pub host:      String,
  pub kind:      CompetitorType,
  pub notes:     Option<String>,
}
