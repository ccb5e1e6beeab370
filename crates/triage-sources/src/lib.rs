//! Triage Sources
//!
//! External data for the triage core and the loop that keeps it fresh:
//!
//! - [`tracker`]: the issue tracker (Bugzilla, or a JSON file)
//! - [`org`]: team directory from a file or the org-data service
//! - [`ci`]: per-component CI pass rates
//! - [`slack`]: chat notifications
//! - [`reconcile`]: timed refresh into swap-on-write snapshots
//!
//! Every external system sits behind an `async_trait` trait with an
//! in-memory fake in [`fakes`].

pub mod ci;
pub mod config;
pub mod error;
pub mod fakes;
pub mod org;
pub mod reconcile;
pub mod slack;
pub mod tracker;

pub use ci::{parse_sippy_report, CiPassRateSource, SippyClient};
pub use config::{read_key_file, CiSourceConfig, OrgSourceConfig, SlackConfig, TrackerConfig};
pub use error::{SourceError, SourceResult};
pub use org::{org_source_from_config, FileOrgSource, OrgSource, ServiceOrgSource};
pub use reconcile::{ReconcileIntervals, Reconciler, ON_ENGINEERING_STATUSES};
pub use slack::{ChatNotifier, SlackClient};
pub use tracker::{
    tracker_from_config, BugQuery, BugUpdate, BugzillaClient, FileTracker, IssueTracker,
};
