//! Client — the billing/ownership root of the data model.
//!
//! Every domain under analysis belongs to exactly one client. Clients are
//! never deleted, only archived.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A customer of the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
  pub client_id:     Uuid,
  pub name:          String,
  pub contact_email: Option<String>,
  pub archived:      bool,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

/// Input for creating a client. Identity and timestamps are store-assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClient {
  pub name:          String,
  pub contact_email: Option<String>,
}
