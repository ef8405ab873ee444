//! The target schema of the Perch platform, expressed as migration units.
//!
//! Units are listed in dependency order and that order is load-bearing:
//! enum types precede the tables that tag against them, referenced tables
//! precede referencing tables. The convergence engine applies them verbatim
//! and validates the ordering with [`schema::validate_units`] before
//! touching a database.
//!
//! Units `001`–`003` reflect the schema as it grew; `004` is the additive
//! sync that brings instances predating the unified schema up to date.
//! Nothing here is ever edited retroactively — corrections ship as new
//! units.

use crate::schema::{
  self, ColumnDef, ColumnType, DefaultValue, EnumTypeDef, IndexColumn, IndexDef, MigrationUnit,
  Op, TableDef,
};

/// Version string of the final unit — the marker external tooling checks to
/// decide whether an instance is fully current.
pub const CURRENT_VERSION: &str = "004_comprehensive_schema_sync";

fn id(name: &'static str) -> ColumnDef {
  ColumnDef::new(name, ColumnType::Id)
}

fn timestamps() -> [ColumnDef; 2] {
  [
    ColumnDef::new("created_at", ColumnType::Timestamp),
    ColumnDef::new("updated_at", ColumnType::Timestamp),
  ]
}

/// The complete, ordered unit list.
pub fn migration_units() -> Vec<MigrationUnit> {
  vec![
    initial_schema(),
    analysis_pipeline(),
    strategy_planning(),
    comprehensive_schema_sync(),
  ]
}

fn initial_schema() -> MigrationUnit {
  let [created_at, updated_at] = timestamps();
  MigrationUnit {
    version:     "001_initial_schema",
    description: "clients, domains, keywords, competitors",
    ops:         vec![
      // `validating` and `generating` arrived with unit 004.
      Op::CreateEnum(EnumTypeDef {
        name: "analysisstatus",
        tags: &["pending", "collecting", "analyzing", "completed", "failed"],
      }),
      Op::CreateEnum(EnumTypeDef {
        name: "competitortype",
        tags: &["direct", "indirect", "aspirational"],
      }),
      Op::CreateTable(TableDef::new(
        "clients",
        vec![
          id("client_id"),
          ColumnDef::new("name", ColumnType::Text),
          ColumnDef::new("contact_email", ColumnType::Text).nullable(),
          created_at.clone(),
          updated_at.clone(),
        ],
      )),
      Op::CreateTable(
        TableDef::new(
          "domains",
          vec![
            id("domain_id"),
            ColumnDef::new("client_id", ColumnType::Id).references("clients", "client_id"),
            ColumnDef::new("host", ColumnType::Text),
            created_at.clone(),
            updated_at.clone(),
          ],
        )
        .unique(&["client_id", "host"]),
      ),
      Op::CreateTable(
        TableDef::new(
          "keywords",
          vec![
            id("keyword_id"),
            ColumnDef::new("domain_id", ColumnType::Id).references("domains", "domain_id"),
            ColumnDef::new("phrase", ColumnType::Text),
            ColumnDef::new("search_volume", ColumnType::Integer).nullable(),
            ColumnDef::new("difficulty", ColumnType::Real).nullable(),
            ColumnDef::new("opportunity_score", ColumnType::Real).nullable(),
            created_at.clone(),
            updated_at.clone(),
          ],
        )
        .unique(&["domain_id", "phrase"]),
      ),
      Op::CreateTable(
        TableDef::new(
          "competitors",
          vec![
            id("competitor_id"),
            ColumnDef::new("domain_id", ColumnType::Id).references("domains", "domain_id"),
            ColumnDef::new("host", ColumnType::Text),
            ColumnDef::new("kind", ColumnType::Tag("competitortype")),
            ColumnDef::new("notes", ColumnType::Text).nullable(),
            created_at,
            updated_at,
          ],
        )
        .unique(&["domain_id", "host"]),
      ),
      Op::CreateIndex(IndexDef::new(
        "domains_client_idx",
        "domains",
        vec![IndexColumn::asc("client_id")],
      )),
      Op::CreateIndex(IndexDef::new(
        "keywords_domain_idx",
        "keywords",
        vec![IndexColumn::asc("domain_id")],
      )),
      Op::CreateIndex(IndexDef::new(
        "competitors_domain_idx",
        "competitors",
        vec![IndexColumn::asc("domain_id")],
      )),
    ],
  }
}

fn analysis_pipeline() -> MigrationUnit {
  let [created_at, updated_at] = timestamps();
  MigrationUnit {
    version:     "002_analysis_pipeline",
    description: "analysis runs, SERP snapshots, keyword metric history",
    ops:         vec![
      Op::CreateTable(TableDef::new(
        "analyses",
        vec![
          id("analysis_id"),
          ColumnDef::new("domain_id", ColumnType::Id).references("domains", "domain_id"),
          ColumnDef::new("status", ColumnType::Tag("analysisstatus"))
            .default(DefaultValue::Text("pending")),
          ColumnDef::new("started_at", ColumnType::Timestamp),
          ColumnDef::new("finished_at", ColumnType::Timestamp).nullable(),
          created_at.clone(),
          updated_at.clone(),
        ],
      )),
      Op::CreateTable(TableDef::new(
        "serp_snapshots",
        vec![
          id("snapshot_id"),
          ColumnDef::new("keyword_id", ColumnType::Id).references("keywords", "keyword_id"),
          ColumnDef::new("captured_at", ColumnType::Timestamp),
          ColumnDef::new("results", ColumnType::Json).default(DefaultValue::EmptyJson),
        ],
      )),
      Op::CreateTable(TableDef::new(
        "keyword_metrics",
        vec![
          id("metric_id"),
          ColumnDef::new("keyword_id", ColumnType::Id).references("keywords", "keyword_id"),
          ColumnDef::new("measured_at", ColumnType::Timestamp),
          ColumnDef::new("search_volume", ColumnType::Integer).nullable(),
          ColumnDef::new("opportunity_score", ColumnType::Real).nullable(),
          ColumnDef::new("winnability_score", ColumnType::Real).nullable(),
          created_at,
          updated_at,
        ],
      )),
      // Hot path: the pipeline polls for unfinished runs.
      Op::CreateIndex(
        IndexDef::new("analyses_active_idx", "analyses", vec![IndexColumn::asc("status")])
          .filter("status NOT IN ('completed', 'failed')"),
      ),
      Op::CreateIndex(IndexDef::new(
        "keywords_volume_idx",
        "keywords",
        vec![IndexColumn::desc("search_volume")],
      )),
      Op::CreateIndex(IndexDef::new(
        "serp_snapshots_keyword_idx",
        "serp_snapshots",
        vec![IndexColumn::asc("keyword_id"), IndexColumn::desc("captured_at")],
      )),
      Op::CreateIndex(IndexDef::new(
        "keyword_metrics_keyword_idx",
        "keyword_metrics",
        vec![IndexColumn::asc("keyword_id"), IndexColumn::desc("measured_at")],
      )),
    ],
  }
}

fn strategy_planning() -> MigrationUnit {
  let [created_at, updated_at] = timestamps();
  MigrationUnit {
    version:     "003_strategy_planning",
    description: "strategies, threads, and topics",
    ops:         vec![
      Op::CreateTable(TableDef::new(
        "strategies",
        vec![
          id("strategy_id"),
          ColumnDef::new("domain_id", ColumnType::Id).references("domains", "domain_id"),
          ColumnDef::new("title", ColumnType::Text),
          ColumnDef::new("objective", ColumnType::Text).nullable(),
          created_at.clone(),
          updated_at.clone(),
        ],
      )),
      Op::CreateTable(
        TableDef::new(
          "strategy_threads",
          vec![
            id("thread_id"),
            ColumnDef::new("strategy_id", ColumnType::Id).references("strategies", "strategy_id"),
            ColumnDef::new("title", ColumnType::Text),
            ColumnDef::new("position", ColumnType::Integer).default(DefaultValue::Integer(0)),
            created_at.clone(),
            updated_at.clone(),
          ],
        )
        .unique(&["strategy_id", "title"]),
      ),
      Op::CreateTable(
        TableDef::new(
          "strategy_topics",
          vec![
            id("topic_id"),
            ColumnDef::new("thread_id", ColumnType::Id).references("strategy_threads", "thread_id"),
            ColumnDef::new("keyword_id", ColumnType::Id)
              .nullable()
              .references("keywords", "keyword_id"),
            ColumnDef::new("title", ColumnType::Text),
            ColumnDef::new("brief", ColumnType::Json).nullable(),
            created_at,
            updated_at,
          ],
        )
        .unique(&["thread_id", "title"]),
      ),
      Op::CreateIndex(IndexDef::new(
        "strategies_domain_idx",
        "strategies",
        vec![IndexColumn::asc("domain_id")],
      )),
      Op::CreateIndex(IndexDef::new(
        "strategy_threads_strategy_idx",
        "strategy_threads",
        vec![IndexColumn::asc("strategy_id")],
      )),
      Op::CreateIndex(IndexDef::new(
        "strategy_topics_thread_idx",
        "strategy_topics",
        vec![IndexColumn::asc("thread_id")],
      )),
    ],
  }
}

/// Additive sync for instances converged before the schema was unified.
/// Every operation is a no-op against a fully current database.
fn comprehensive_schema_sync() -> MigrationUnit {
  MigrationUnit {
    version:     CURRENT_VERSION,
    description: "additive sync: late enum tags, columns, and indexes",
    ops:         vec![
      Op::EnsureEnumTags {
        enum_name: "analysisstatus",
        tags:      &["validating", "generating"],
      },
      Op::AddColumn {
        table:  "clients",
        column: ColumnDef::new("archived", ColumnType::Boolean)
          .default(DefaultValue::Boolean(false)),
      },
      Op::AddColumn {
        table:  "domains",
        column: ColumnDef::new("settings", ColumnType::Json).default(DefaultValue::EmptyJson),
      },
      Op::AddColumn {
        table:  "keywords",
        column: ColumnDef::new("winnability_score", ColumnType::Real).nullable(),
      },
      Op::AddColumn {
        table:  "analyses",
        column: ColumnDef::new("error_detail", ColumnType::Text).nullable(),
      },
      Op::CreateIndex(IndexDef::new(
        "analyses_domain_idx",
        "analyses",
        vec![IndexColumn::asc("domain_id")],
      )),
      Op::CreateIndex(
        IndexDef::new(
          "serp_snapshots_keyword_captured_unique",
          "serp_snapshots",
          vec![IndexColumn::asc("keyword_id"), IndexColumn::asc("captured_at")],
        )
        .unique(),
      ),
      Op::CreateIndex(IndexDef::new(
        "clients_name_idx",
        "clients",
        vec![IndexColumn::asc("name")],
      )),
    ],
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;
  use crate::analysis::AnalysisStatus;
  use crate::domain::CompetitorType;

  #[test]
  fn authored_units_validate() {
    schema::validate_units(&migration_units()).expect("unit list respects dependency order");
  }

  #[test]
  fn unit_versions_in_declared_order() {
    let versions: Vec<&str> = migration_units().iter().map(|u| u.version).collect();
    assert_eq!(versions, vec![
      "001_initial_schema",
      "002_analysis_pipeline",
      "003_strategy_planning",
      CURRENT_VERSION,
    ]);
  }

  /// The union of tags across all units must match the Rust enum exactly,
  /// so codecs and the schema cannot drift apart.
  #[test]
  fn analysisstatus_tags_match_rust_enum() {
    let mut declared: Vec<&str> = vec![];
    for unit in migration_units() {
      for op in &unit.ops {
        match op {
          Op::CreateEnum(e) if e.name == "analysisstatus" => declared.extend(e.tags),
          Op::EnsureEnumTags { enum_name, tags } if *enum_name == "analysisstatus" => {
            declared.extend(*tags);
          }
          _ => {}
        }
      }
    }
    declared.sort_unstable();

    let mut from_enum: Vec<&str> =
      AnalysisStatus::ALL.iter().map(|s| s.as_tag()).collect();
    from_enum.sort_unstable();

    assert_eq!(declared, from_enum);
  }

  #[test]
  fn competitortype_tags_match_rust_enum() {
    let units = migration_units();
    let declared = units
      .iter()
      .flat_map(|u| &u.ops)
      .find_map(|op| match op {
        Op::CreateEnum(e) if e.name == "competitortype" => Some(e.tags),
        _ => None,
      })
      .expect("competitortype enum declared");

    let from_enum: Vec<&str> = CompetitorType::ALL.iter().map(|k| k.as_tag()).collect();
    assert_eq!(declared.to_vec(), from_enum);
  }
}
