//! Bug records as returned by the issue tracker.
//!
//! The shape follows the Bugzilla REST search response. The core never
//! mutates a [`Bug`]; every predicate here is a read-only view used by the
//! aggregator, the SLO evaluator and the triage summaries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Target release value Bugzilla uses for "not set".
pub const UNSET_TARGET_RELEASE: &str = "---";

/// Severity/priority value Bugzilla uses for "not set".
pub const UNSPECIFIED: &str = "unspecified";

/// Keyword marking a bug as reviewed for the upcoming sprint.
pub const UPCOMING_SPRINT: &str = "UpcomingSprint";

/// Whiteboard marker for bugs the lifecycle bot has flagged as stale.
pub const LIFECYCLE_STALE: &str = "LifecycleStale";

/// Flag requested on bugs proposed as release blockers.
pub const BLOCKER_FLAG: &str = "blocker";

/// PM score assigned to a bug whose score is missing or unparsable.
pub const BASELINE_PM_SCORE: i64 = 1;

/// A flag set on a bug (e.g. `blocker?`, `needinfo?`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    pub name: String,
    /// `?`, `+` or `-`
    #[serde(default)]
    pub status: String,
}

/// A single bug record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bug {
    pub id: u64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub assigned_to: String,
    #[serde(default)]
    pub component: Vec<String>,
    #[serde(default)]
    pub sub_components: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub target_release: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub flags: Vec<Flag>,
    #[serde(default)]
    pub whiteboard: String,
    /// Bugzilla reports this as a string, some exports as a number.
    #[serde(default, rename = "cf_pm_score", skip_serializing_if = "Option::is_none")]
    pub pm_score: Option<serde_json::Value>,
}

impl Bug {
    /// Primary component, or `""` when the bug has none.
    pub fn component(&self) -> &str {
        self.component.first().map(String::as_str).unwrap_or("")
    }

    /// First subcomponent filed under the primary component, or `""`.
    pub fn subcomponent(&self) -> &str {
        self.sub_components
            .get(self.component())
            .and_then(|subs| subs.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Primary target release, [`UNSET_TARGET_RELEASE`] when empty.
    pub fn target_release(&self) -> &str {
        match self.target_release.first() {
            Some(target) if !target.is_empty() => target,
            _ => UNSET_TARGET_RELEASE,
        }
    }

    pub fn has_keyword(&self, keyword: &str) -> bool {
        self.keywords.iter().any(|k| k == keyword)
    }

    /// Whether a flag named `name` is set, optionally with a given status.
    pub fn has_flag(&self, name: &str, status: Option<&str>) -> bool {
        self.flags
            .iter()
            .any(|f| f.name == name && status.map_or(true, |s| f.status == s))
    }

    pub fn severity_unset(&self) -> bool {
        self.severity.is_empty() || self.severity == UNSPECIFIED
    }

    pub fn priority_unset(&self) -> bool {
        self.priority.is_empty() || self.priority == UNSPECIFIED
    }

    /// Release-critical: severity is not `low` and the bug targets the
    /// current release or has no target yet.
    pub fn is_blocker(&self, current_release: &str) -> bool {
        if self.severity == "low" {
            return false;
        }
        let target = self.target_release();
        target == UNSET_TARGET_RELEASE || target == current_release
    }

    /// Missing severity or priority, or someone asked for `blocker?`.
    pub fn is_untriaged(&self) -> bool {
        self.severity_unset() || self.priority_unset() || self.has_flag(BLOCKER_FLAG, Some("?"))
    }

    pub fn reviewed_in_sprint(&self) -> bool {
        self.has_keyword(UPCOMING_SPRINT)
    }

    pub fn is_stale(&self) -> bool {
        self.whiteboard.contains(LIFECYCLE_STALE)
    }

    pub fn is_low_priority_and_severity(&self) -> bool {
        self.severity == "low" && self.priority == "low"
    }

    /// PM score of this bug.
    ///
    /// Scores that are missing or cannot be read as an integer count as
    /// [`BASELINE_PM_SCORE`].
    pub fn pm_score(&self) -> i64 {
        let parsed = match &self.pm_score {
            Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
            Some(serde_json::Value::Number(n)) => n.as_i64(),
            _ => None,
        };
        parsed.unwrap_or(BASELINE_PM_SCORE)
    }
}
