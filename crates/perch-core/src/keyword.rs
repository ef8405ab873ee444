//! Keywords and their externally computed scores.
//!
//! The store persists `opportunity_score` and `winnability_score` but never
//! computes them — the scoring pipeline is a separate collaborator that
//! writes results back through [`KeywordScores`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A search phrase tracked for one domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
  pub keyword_id:        Uuid,
  pub domain_id:         Uuid,
  pub phrase:            String,
  pub search_volume:     Option<i64>,
  pub difficulty:        Option<f64>,
  pub opportunity_score: Option<f64>,
  pub winnability_score: Option<f64>,
  pub created_at:        DateTime<Utc>,
  pub updated_at:        DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewKeyword {
  pub domain_id:     Uuid,
  pub phrase:        String,
  pub search_volume: Option<i64>,
}

/// Scores produced by the external scoring pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KeywordScores {
  pub opportunity: f64,
  pub winnability: f64,
}
