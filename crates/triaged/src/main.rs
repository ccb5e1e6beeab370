//! triaged - keeps the team directory, open bugs and SLO results fresh
//!
//! Sources are configured from the environment (`TRIAGE_*`, `BUGZILLA_*`).
//! Every published SLO report is written to `--output` as JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, Level};

use triage_core::{Snapshot, SloReport};
use triage_sources::{
    org_source_from_config, tracker_from_config, BugQuery, CiPassRateSource, CiSourceConfig,
    IssueTracker, OrgSource, OrgSourceConfig, ReconcileIntervals, Reconciler, SippyClient,
    TrackerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "triaged")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bug triage reconciliation daemon", long_about = None)]
struct Args {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Write each SLO report to this file
    #[arg(short, long, env = "TRIAGE_SLO_OUTPUT")]
    output: Option<PathBuf>,

    /// Seconds between team directory refreshes
    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    directory_interval: u64,

    /// Seconds between bug refreshes
    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    bugs_interval: u64,

    /// Seconds between SLO evaluations
    #[arg(long, default_value_t = 600, value_parser = clap::value_parser!(u64).range(1..))]
    results_interval: u64,
}

impl Args {
    fn intervals(&self) -> ReconcileIntervals {
        ReconcileIntervals {
            directory: Duration::from_secs(self.directory_interval),
            bugs: Duration::from_secs(self.bugs_interval),
            results: Duration::from_secs(self.results_interval),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    triage_core::init_tracing(args.json, level);

    let org: Arc<dyn OrgSource> = Arc::from(org_source_from_config(&OrgSourceConfig::from_env())?);
    let tracker: Arc<dyn IssueTracker> = Arc::from(tracker_from_config(&TrackerConfig::from_env())?);
    let ci: Arc<dyn CiPassRateSource> = Arc::new(SippyClient::new(&CiSourceConfig::from_env())?);

    let reconciler = Reconciler::bootstrap(org, tracker, ci, BugQuery::open_bugs())
        .await
        .context("Initial load failed")?
        .with_intervals(args.intervals())?;
    let reconciler = Arc::new(reconciler);

    info!(
        teams = reconciler.directory().value.teams().len(),
        bugs = reconciler.bugs().value.len(),
        "triaged started"
    );
    serve(reconciler, args.output).await
}

/// Run the reconcile loops until ctrl-c or the first loop failure.
async fn serve(reconciler: Arc<Reconciler>, output: Option<PathBuf>) -> Result<()> {
    let mut published = reconciler.subscribe_results();
    let (handles, mut errors) = Arc::clone(&reconciler).spawn();

    let outcome = loop {
        tokio::select! {
            changed = published.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let report = reconciler.results();
                if let Some(path) = &output {
                    if let Err(err) = write_report(path, &report) {
                        error!(path = %path.display(), error = %err, "failed to write SLO report");
                    }
                }
            }
            Some(err) = errors.recv() => {
                break Err(anyhow::Error::new(err).context("Reconciliation stopped"));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break Ok(());
            }
        }
    };

    for handle in handles {
        handle.abort();
    }
    outcome
}

/// Replace `path` with the JSON form of `report`.
fn write_report(path: &Path, report: &Snapshot<SloReport>) -> Result<()> {
    let body = serde_json::to_vec_pretty(report)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, body).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    info!(generation = report.generation, path = %path.display(), "wrote SLO report");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::{Bug, CiPassRates, OrgConfig, OrgDirectory, ReleaseInfo, TeamRule};
    use triage_sources::fakes::{MemoryTracker, StaticCiSource, StaticOrgSource};

    async fn reconciler() -> Reconciler {
        let directory = OrgDirectory::load(OrgConfig {
            teams: vec![TeamRule::new("Node", &["Node"])],
            releases: vec![ReleaseInfo::new("4.7", &["4.7.0"])],
            ..Default::default()
        })
        .unwrap();
        let bug = Bug {
            id: 1,
            status: "NEW".to_string(),
            severity: "urgent".to_string(),
            component: vec!["Node".to_string()],
            ..Default::default()
        };
        Reconciler::bootstrap(
            Arc::new(StaticOrgSource::new(directory)),
            Arc::new(MemoryTracker::with_bugs(vec![bug])),
            Arc::new(StaticCiSource::new(CiPassRates::new())),
            BugQuery::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_write_report() {
        let reconciler = reconciler().await;
        reconciler.refresh_results().await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slo.json");
        write_report(&path, &reconciler.results()).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["generation"], 1);
        assert_eq!(written["value"]["Node"]["failing"], true);
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_write_report_missing_directory() {
        let reconciler = reconciler().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("slo.json");
        assert!(write_report(&path, &reconciler.results()).is_err());
    }

    #[test]
    fn test_default_intervals() {
        let args = Args::parse_from(["triaged"]);
        assert_eq!(args.intervals(), ReconcileIntervals::default());
        assert!(args.output.is_none());
    }

    #[test]
    fn test_zero_interval_rejected() {
        for flag in ["--directory-interval", "--bugs-interval", "--results-interval"] {
            assert!(Args::try_parse_from(["triaged", flag, "0"]).is_err(), "{}", flag);
        }
        let args = Args::try_parse_from(["triaged", "--bugs-interval", "1"]).unwrap();
        assert_eq!(args.intervals().bugs, Duration::from_secs(1));
    }
}
