//! SLO evaluation: each team's bug load against its obligations.
//!
//! Metrics are evaluated in the fixed order of [`Metric::ORDERED`]. A metric
//! passes when `current <= obligation`; a team is failing when any metric
//! fails.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregate::{BugSet, TeamMap};
use crate::directory::{OrgDirectory, SloObligation, TeamRule};

/// Pass rate assumed for components the CI table does not mention.
pub const FULL_PASS_RATE: f64 = 100.0;

/// SLO metric names as they appear in configuration and results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    #[serde(rename = "urgents")]
    Urgent,
    #[serde(rename = "blockers")]
    Blocker,
    #[serde(rename = "pmscore")]
    PmScore,
    #[serde(rename = "ci-fail-rate")]
    CiFailRate,
    #[serde(rename = "total")]
    Total,
}

impl Metric {
    /// Evaluation order.
    pub const ORDERED: [Metric; 5] = [
        Metric::Urgent,
        Metric::Blocker,
        Metric::PmScore,
        Metric::CiFailRate,
        Metric::Total,
    ];

    /// Configuration key.
    pub fn key(&self) -> &'static str {
        match self {
            Metric::Urgent => "urgents",
            Metric::Blocker => "blockers",
            Metric::PmScore => "pmscore",
            Metric::CiFailRate => "ci-fail-rate",
            Metric::Total => "total",
        }
    }

    pub fn from_key(key: &str) -> Option<Metric> {
        Metric::ORDERED.into_iter().find(|m| m.key() == key)
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Team maps the count-based metrics read from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TeamBugMaps {
    /// Every bug; also feeds the PM-score metric.
    pub total: TeamMap,
    /// Bugs of `urgent` severity.
    pub urgent: TeamMap,
    /// Release blockers for the current release.
    pub blocker: TeamMap,
}

impl TeamBugMaps {
    pub fn build(directory: &OrgDirectory, bugs: &BugSet, current_release: &str) -> Self {
        TeamBugMaps {
            total: bugs.team_map(directory),
            urgent: bugs.filter_by_severity(&["urgent"]).team_map(directory),
            blocker: bugs.filter_blocker(current_release).team_map(directory),
        }
    }
}

/// Latest CI pass percentage per component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CiPassRates(BTreeMap<String, f64>);

impl CiPassRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, component: impl Into<String>, percentage: f64) {
        self.0.insert(component.into(), percentage);
    }

    pub fn get(&self, component: &str) -> Option<f64> {
        self.0.get(component).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowest pass rate among `components`; [`FULL_PASS_RATE`] when none
    /// of them is known.
    pub fn worst_pass_rate<S: AsRef<str>>(&self, components: &[S]) -> f64 {
        components
            .iter()
            .filter_map(|c| self.get(c.as_ref()))
            .fold(FULL_PASS_RATE, f64::min)
    }
}

impl FromIterator<(String, f64)> for CiPassRates {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        CiPassRates(iter.into_iter().collect())
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// Outcome of one metric for one team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricResult {
    pub name: Metric,
    pub current: i64,
    pub obligation: i64,
    #[serde(default, rename = "perMember", skip_serializing_if = "is_false")]
    pub per_member: bool,
    pub passed: bool,
}

/// Outcome of every metric for one team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SloResult {
    pub name: String,
    pub failing: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub members: u32,
    #[serde(default)]
    pub results: Vec<MetricResult>,
}

impl SloResult {
    pub fn metric(&self, metric: Metric) -> Option<&MetricResult> {
        self.results.iter().find(|r| r.name == metric)
    }

    pub fn failed_metrics(&self) -> impl Iterator<Item = &MetricResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

/// SLO results keyed by team name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SloReport(BTreeMap<String, SloResult>);

impl SloReport {
    pub fn get(&self, team: &str) -> Option<&SloResult> {
        self.0.get(team)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SloResult)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names of failing teams, sorted.
    pub fn failing_teams(&self) -> Vec<&str> {
        self.0
            .values()
            .filter(|r| r.failing)
            .map(|r| r.name.as_str())
            .collect()
    }
}

/// Team override if present, else the org-wide default, else zero.
pub fn resolve_obligation(directory: &OrgDirectory, team: &TeamRule, metric: Metric) -> SloObligation {
    team.slo
        .get(metric.key())
        .or_else(|| directory.org_slo().get(metric.key()))
        .copied()
        .unwrap_or_default()
}

/// Apply per-member scaling; the float product is truncated.
///
/// A team reporting zero members keeps the unscaled obligation.
pub fn scale_obligation(obligation: SloObligation, member_count: u32) -> i64 {
    if obligation.per_member && member_count != 0 {
        (obligation.count * member_count as f32) as i64
    } else {
        obligation.count as i64
    }
}

fn current_value(metric: Metric, team: &TeamRule, maps: &TeamBugMaps, ci: &CiPassRates) -> i64 {
    let name = team.name.as_str();
    match metric {
        Metric::Urgent => maps.urgent.count_all(name) as i64,
        Metric::Blocker => maps.blocker.count_all(name) as i64,
        Metric::PmScore => maps
            .total
            .bugs(name)
            .iter()
            .map(|b| b.pm_score())
            .fold(0i64, i64::saturating_add),
        Metric::CiFailRate => (FULL_PASS_RATE - ci.worst_pass_rate(&team.components)) as i64,
        Metric::Total => maps.total.count_all(name) as i64,
    }
}

pub fn evaluate_team(
    directory: &OrgDirectory,
    team: &TeamRule,
    maps: &TeamBugMaps,
    ci: &CiPassRates,
) -> SloResult {
    let mut results = Vec::with_capacity(Metric::ORDERED.len());
    for metric in Metric::ORDERED {
        let obligation = resolve_obligation(directory, team, metric);
        if obligation.per_member && team.member_count == 0 {
            tracing::warn!(team = %team.name, metric = %metric, "team has 0 members");
        }
        let obligation_value = scale_obligation(obligation, team.member_count);
        let current = current_value(metric, team, maps, ci);
        results.push(MetricResult {
            name: metric,
            current,
            obligation: obligation_value,
            per_member: obligation.per_member,
            passed: current <= obligation_value,
        });
    }

    SloResult {
        name: team.name.clone(),
        failing: results.iter().any(|r| !r.passed),
        members: team.member_count,
        results,
    }
}

/// Evaluate every team in the directory.
pub fn evaluate(directory: &OrgDirectory, maps: &TeamBugMaps, ci: &CiPassRates) -> SloReport {
    SloReport(
        directory
            .teams()
            .iter()
            .map(|team| (team.name.clone(), evaluate_team(directory, team, maps, ci)))
            .collect(),
    )
}
