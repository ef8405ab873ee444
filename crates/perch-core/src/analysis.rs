//! Analysis runs — one pass of the collection/analysis pipeline over a
//! domain. The pipeline itself is external; the store records its progress
//! through [`AnalysisStatus`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline state of an analysis run. The wire form of each variant matches
/// a tag of the `analysisstatus` enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
  Pending,
  Collecting,
  Validating,
  Analyzing,
  Generating,
  Completed,
  Failed,
}

impl AnalysisStatus {
  /// All variants, in pipeline order.
  pub const ALL: [AnalysisStatus; 7] = [
    AnalysisStatus::Pending,
    AnalysisStatus::Collecting,
    AnalysisStatus::Validating,
    AnalysisStatus::Analyzing,
    AnalysisStatus::Generating,
    AnalysisStatus::Completed,
    AnalysisStatus::Failed,
  ];

  /// The tag stored in the `analyses.status` column.
  pub fn as_tag(self) -> &'static str {
    match self {
      AnalysisStatus::Pending => "pending",
      AnalysisStatus::Collecting => "collecting",
      AnalysisStatus::Validating => "validating",
      AnalysisStatus::Analyzing => "analyzing",
      AnalysisStatus::Generating => "generating",
      AnalysisStatus::Completed => "completed",
      AnalysisStatus::Failed => "failed",
    }
  }

  /// Whether the run is finished, successfully or not.
  pub fn is_terminal(self) -> bool {
    matches!(self, AnalysisStatus::Completed | AnalysisStatus::Failed)
  }
}

/// One run of the analysis pipeline over a domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
  pub analysis_id:  Uuid,
  pub domain_id:    Uuid,
  pub status:       AnalysisStatus,
  pub started_at:   DateTime<Utc>,
  pub finished_at:  Option<DateTime<Utc>>,
  /// Populated when `status` is `failed`.
  pub error_detail: Option<String>,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}
