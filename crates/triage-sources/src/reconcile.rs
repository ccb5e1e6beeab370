//! Periodic re-fetch of the directory, bugs and SLO results.
//!
//! Each kind of data lives in its own [`SnapshotCell`]. A refresh builds a
//! complete new value and swaps it in; readers holding an older snapshot
//! keep a consistent view until they load again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};
use triage_core::{
    slo, BugSet, ConfigError, OrgDirectory, Snapshot, SnapshotCell, SloReport, TeamBugMaps,
};

use crate::ci::CiPassRateSource;
use crate::error::SourceResult;
use crate::org::OrgSource;
use crate::tracker::{BugQuery, IssueTracker};

/// Statuses of bugs that count against a team's SLO.
pub const ON_ENGINEERING_STATUSES: [&str; 4] = ["NEW", "ASSIGNED", "ON_DEV", "POST"];

/// How often each refresh runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileIntervals {
    pub directory: Duration,
    pub bugs: Duration,
    pub results: Duration,
}

impl Default for ReconcileIntervals {
    fn default() -> Self {
        ReconcileIntervals {
            directory: Duration::from_secs(5 * 60),
            bugs: Duration::from_secs(5 * 60),
            results: Duration::from_secs(10 * 60),
        }
    }
}

impl ReconcileIntervals {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("directory", self.directory),
            ("bugs", self.bugs),
            ("results", self.results),
        ];
        for (field, period) in periods {
            if period.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "interval must be non-zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

pub struct Reconciler {
    org: Arc<dyn OrgSource>,
    tracker: Arc<dyn IssueTracker>,
    ci: Arc<dyn CiPassRateSource>,
    query: BugQuery,
    intervals: ReconcileIntervals,
    directory: SnapshotCell<OrgDirectory>,
    bugs: SnapshotCell<BugSet>,
    results: SnapshotCell<SloReport>,
    results_tx: watch::Sender<u64>,
}

impl Reconciler {
    /// Load the directory and bugs once. Failures here are fatal to the
    /// caller; no SLO results exist until [`Reconciler::refresh_results`]
    /// runs.
    pub async fn bootstrap(
        org: Arc<dyn OrgSource>,
        tracker: Arc<dyn IssueTracker>,
        ci: Arc<dyn CiPassRateSource>,
        query: BugQuery,
    ) -> SourceResult<Self> {
        let directory = org.load().await?;
        let bugs = tracker.search(&query).await?;
        info!(
            teams = directory.teams().len(),
            bugs = bugs.len(),
            "initial load complete"
        );
        let (results_tx, _) = watch::channel(0);
        Ok(Reconciler {
            org,
            tracker,
            ci,
            query,
            intervals: ReconcileIntervals::default(),
            directory: SnapshotCell::new(directory),
            bugs: SnapshotCell::new(bugs),
            results: SnapshotCell::default(),
            results_tx,
        })
    }

    /// Replace the refresh periods. Every period must be non-zero.
    pub fn with_intervals(mut self, intervals: ReconcileIntervals) -> SourceResult<Self> {
        intervals.validate()?;
        self.intervals = intervals;
        Ok(self)
    }

    pub fn directory(&self) -> Arc<Snapshot<OrgDirectory>> {
        self.directory.load()
    }

    pub fn bugs(&self) -> Arc<Snapshot<BugSet>> {
        self.bugs.load()
    }

    pub fn results(&self) -> Arc<Snapshot<SloReport>> {
        self.results.load()
    }

    /// Receiver notified with the generation of every published SLO report.
    pub fn subscribe_results(&self) -> watch::Receiver<u64> {
        self.results_tx.subscribe()
    }

    pub async fn refresh_directory(&self) -> SourceResult<u64> {
        let fresh = self.org.load().await?;
        let previous = self.directory.load();
        if previous.value.digest() != fresh.digest() {
            info!(teams = fresh.teams().len(), "team directory changed");
        }
        let generation = self.directory.replace(fresh);
        debug!(generation, "reconciled team directory");
        Ok(generation)
    }

    pub async fn refresh_bugs(&self) -> SourceResult<u64> {
        let fresh = self.tracker.search(&self.query).await?;
        let count = fresh.len();
        let generation = self.bugs.replace(fresh);
        info!(generation, bugs = count, "reconciled bugs");
        Ok(generation)
    }

    /// Evaluate every team against the current directory and bug snapshots.
    pub async fn refresh_results(&self) -> SourceResult<u64> {
        let directory = self.directory.load();
        let bugs = self.bugs.load();
        let version = directory.value.current_version()?;
        let current_release = format!("{}.0", version);
        let ci = self.ci.pass_rates(&version).await?;

        let on_engineering = bugs.value.filter_by_status(&ON_ENGINEERING_STATUSES);
        let maps = TeamBugMaps::build(&directory.value, &on_engineering, &current_release);
        let report = slo::evaluate(&directory.value, &maps, &ci);
        let failing = report.failing_teams().len();

        let generation = self.results.replace(report);
        self.results_tx.send_replace(generation);
        info!(generation, release = %version, failing, "evaluated team SLOs");
        Ok(generation)
    }

    /// One full directory, bugs, results cycle.
    pub async fn run_once(&self) -> SourceResult<u64> {
        self.refresh_directory().await?;
        self.refresh_bugs().await?;
        self.refresh_results().await
    }

    /// Start the three refresh loops.
    ///
    /// Directory and bug refreshes first fire one interval from now, since
    /// [`Reconciler::bootstrap`] already loaded both; results are computed
    /// immediately. A loop stops at its first error, which is sent on the
    /// returned channel.
    pub fn spawn(self: Arc<Self>) -> (Vec<JoinHandle<()>>, mpsc::Receiver<crate::SourceError>) {
        let (tx, rx) = mpsc::channel(3);
        let now = Instant::now();
        let handles = vec![
            spawn_loop(
                "directory",
                Arc::clone(&self),
                now + self.intervals.directory,
                self.intervals.directory,
                tx.clone(),
                |r| Box::pin(async move { r.refresh_directory().await }),
            ),
            spawn_loop(
                "bugs",
                Arc::clone(&self),
                now + self.intervals.bugs,
                self.intervals.bugs,
                tx.clone(),
                |r| Box::pin(async move { r.refresh_bugs().await }),
            ),
            spawn_loop(
                "results",
                Arc::clone(&self),
                now,
                self.intervals.results,
                tx,
                |r| Box::pin(async move { r.refresh_results().await }),
            ),
        ];
        (handles, rx)
    }
}

type RefreshFuture = std::pin::Pin<Box<dyn std::future::Future<Output = SourceResult<u64>> + Send>>;

fn spawn_loop<F>(
    name: &'static str,
    reconciler: Arc<Reconciler>,
    start: Instant,
    period: Duration,
    errors: mpsc::Sender<crate::SourceError>,
    refresh: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<Reconciler>) -> RefreshFuture + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = refresh(Arc::clone(&reconciler)).await {
                error!(task = name, error = %err, "reconcile failed");
                let _ = errors.send(err).await;
                return;
            }
        }
    })
}
