//! Grouping and counting of classified bugs.
//!
//! [`BugSet`] is an immutable snapshot of bugs. Every filter returns a new
//! set sharing the underlying records, so readers can keep using a set while
//! reconciliation swaps in a newer one.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bug::Bug;
use crate::classify::UNKNOWN_TEAM;
use crate::directory::OrgDirectory;

/// Immutable collection of bugs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BugSet {
    bugs: Vec<Arc<Bug>>,
}

impl BugSet {
    pub fn new(bugs: Vec<Bug>) -> Self {
        Self {
            bugs: bugs.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn from_shared(bugs: Vec<Arc<Bug>>) -> Self {
        Self { bugs }
    }

    pub fn bugs(&self) -> &[Arc<Bug>] {
        &self.bugs
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bug> {
        self.bugs.iter().map(|b| b.as_ref())
    }

    pub fn len(&self) -> usize {
        self.bugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bugs.is_empty()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.iter().map(|b| b.id).collect()
    }

    /// New set holding the bugs for which `keep` returns true.
    pub fn filter<F>(&self, keep: F) -> BugSet
    where
        F: Fn(&Bug) -> bool,
    {
        BugSet {
            bugs: self.bugs.iter().filter(|b| keep(b)).cloned().collect(),
        }
    }

    pub fn filter_by_severity<S: AsRef<str>>(&self, severities: &[S]) -> BugSet {
        let wanted = as_set(severities);
        self.filter(|b| wanted.contains(b.severity.as_str()))
    }

    /// Keep bugs whose primary target release is one of `targets`. Use
    /// `"---"` to select bugs without a target.
    pub fn filter_by_target_release<S: AsRef<str>>(&self, targets: &[S]) -> BugSet {
        let wanted = as_set(targets);
        self.filter(|b| wanted.contains(b.target_release()))
    }

    pub fn filter_by_status<S: AsRef<str>>(&self, statuses: &[S]) -> BugSet {
        let wanted = as_set(statuses);
        self.filter(|b| wanted.contains(b.status.as_str()))
    }

    /// Keep bugs carrying flag `name`, with the given status when one is set.
    pub fn filter_by_flag(&self, name: &str, status: Option<&str>) -> BugSet {
        self.filter(|b| b.has_flag(name, status))
    }

    pub fn filter_blocker(&self, current_release: &str) -> BugSet {
        self.filter(|b| b.is_blocker(current_release))
    }

    /// Keep bugs classified to one of `teams`.
    pub fn filter_by_teams<S: AsRef<str>>(&self, directory: &OrgDirectory, teams: &[S]) -> BugSet {
        let wanted = as_set(teams);
        self.filter(|b| wanted.contains(directory.classify_bug(b)))
    }

    pub fn team_map(&self, directory: &OrgDirectory) -> TeamMap {
        build_team_map(directory, &self.bugs)
    }

    pub fn assignee_map(&self) -> AssigneeMap {
        build_assignee_map(&self.bugs)
    }
}

impl From<Vec<Bug>> for BugSet {
    fn from(bugs: Vec<Bug>) -> Self {
        BugSet::new(bugs)
    }
}

fn as_set<S: AsRef<str>>(values: &[S]) -> HashSet<&str> {
    values.iter().map(|v| v.as_ref()).collect()
}

/// Bugs grouped under a string key (team name or assignee).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BugMap(BTreeMap<String, Vec<Arc<Bug>>>);

/// Bugs keyed by owning team, plus the [`UNKNOWN_TEAM`] bucket.
pub type TeamMap = BugMap;

/// Bugs keyed by assignee.
pub type AssigneeMap = BugMap;

/// Group `bugs` by owning team.
///
/// Every team in the directory and [`UNKNOWN_TEAM`] are present as keys,
/// even when they end up with no bugs.
pub fn build_team_map(directory: &OrgDirectory, bugs: &[Arc<Bug>]) -> TeamMap {
    let mut out: BTreeMap<String, Vec<Arc<Bug>>> = directory
        .teams()
        .iter()
        .map(|t| (t.name.clone(), Vec::new()))
        .collect();
    out.insert(UNKNOWN_TEAM.to_string(), Vec::new());

    for bug in bugs {
        let team = directory.classify_bug(bug);
        out.entry(team.to_string()).or_default().push(Arc::clone(bug));
    }
    BugMap(out)
}

pub fn build_assignee_map(bugs: &[Arc<Bug>]) -> AssigneeMap {
    let mut out: BTreeMap<String, Vec<Arc<Bug>>> = BTreeMap::new();
    for bug in bugs {
        out.entry(bug.assigned_to.clone())
            .or_default()
            .push(Arc::clone(bug));
    }
    BugMap(out)
}

impl BugMap {
    /// Keys in sorted order.
    pub fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Bugs under `key`; empty when the key is absent.
    pub fn bugs(&self, key: &str) -> &[Arc<Bug>] {
        self.0.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Arc<Bug>])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn count<F>(&self, key: &str, pred: F) -> usize
    where
        F: Fn(&Bug) -> bool,
    {
        self.bugs(key).iter().filter(|b| pred(b)).count()
    }

    pub fn count_all(&self, key: &str) -> usize {
        self.bugs(key).len()
    }

    pub fn count_by_severity_in<S: AsRef<str>>(&self, key: &str, severities: &[S]) -> usize {
        let wanted = as_set(severities);
        self.count(key, |b| wanted.contains(b.severity.as_str()))
    }

    pub fn count_by_target_release_in<S: AsRef<str>>(&self, key: &str, targets: &[S]) -> usize {
        let wanted = as_set(targets);
        self.count(key, |b| wanted.contains(b.target_release()))
    }

    pub fn count_blocker(&self, key: &str, current_release: &str) -> usize {
        self.count(key, |b| b.is_blocker(current_release))
    }

    pub fn count_reviewed_in_sprint(&self, key: &str) -> usize {
        self.count(key, Bug::reviewed_in_sprint)
    }

    pub fn count_not_reviewed_in_sprint(&self, key: &str) -> usize {
        self.count(key, |b| !b.reviewed_in_sprint())
    }

    pub fn count_untriaged(&self, key: &str) -> usize {
        self.count(key, Bug::is_untriaged)
    }

    /// Bug count per severity value.
    pub fn severity_breakdown(&self, key: &str) -> BTreeMap<String, usize> {
        let mut out = BTreeMap::new();
        for bug in self.bugs(key) {
            *out.entry(bug.severity.clone()).or_default() += 1;
        }
        out
    }

    /// Bug count per priority value.
    pub fn priority_breakdown(&self, key: &str) -> BTreeMap<String, usize> {
        let mut out = BTreeMap::new();
        for bug in self.bugs(key) {
            *out.entry(bug.priority.clone()).or_default() += 1;
        }
        out
    }
}
