//! Triage Core Library
//!
//! Team attribution and SLO scoring for bug triage reports:
//!
//! - [`directory`]: the team directory and its validation
//! - [`classify`]: component/subcomponent to owning team
//! - [`aggregate`]: bug sets, team maps and counts
//! - [`slo`]: per-team SLO evaluation
//! - [`report`]: daily triage summaries
//! - [`snapshot`]: swap-on-write holders used by reconciliation
//!
//! Everything here is synchronous and free of I/O except configuration
//! file loading; fetching data lives in `triage-sources`.

pub mod aggregate;
pub mod bug;
pub mod classify;
pub mod directory;
pub mod error;
pub mod report;
pub mod slo;
pub mod snapshot;
pub mod telemetry;

pub use aggregate::{build_assignee_map, build_team_map, AssigneeMap, BugMap, BugSet, TeamMap};
pub use bug::{Bug, Flag, UNSET_TARGET_RELEASE};
pub use classify::{classify_bug, classify_team, match_team, TeamMatch, UNKNOWN_TEAM};
pub use directory::{
    KeyedOrgConfig, LintFinding, LintKind, Milestones, OrgConfig, OrgDirectory, OrgPayload,
    ReleaseInfo, SloObligation, SubcomponentScope, TeamRule, DEFAULT_SUBCOMPONENTS_TAG,
    IGNORE_TEAM_TAG,
};
pub use error::ConfigError;
pub use report::{summarize, BugLinker, TriageSummary};
pub use slo::{evaluate, CiPassRates, Metric, MetricResult, SloReport, SloResult, TeamBugMaps};
pub use snapshot::{Snapshot, SnapshotCell};
pub use telemetry::init_tracing;

/// Convenience alias for fallible directory operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
