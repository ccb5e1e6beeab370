//! Daily triage summaries for teams and assignees.
//!
//! A [`TriageSummary`] buckets one team's (or one person's) bugs into the
//! categories people are nagged about, and renders them as chat lines with
//! links back to the issue tracker.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::aggregate::BugMap;
use crate::bug::Bug;

/// Keywords important enough to be called out on their own line.
pub const SERIOUS_KEYWORDS: [&str; 3] = ["ServiceDeliveryBlocker", "TestBlocker", "UpgradeBlocker"];

/// Display order for severity and priority breakdowns.
pub const LEVEL_ORDER: [&str; 5] = ["urgent", "high", "medium", "low", "unspecified"];

/// Builds bug-list links against an issue tracker endpoint.
#[derive(Debug, Clone)]
pub struct BugLinker {
    endpoint: String,
}

impl BugLinker {
    pub fn new(endpoint: &str) -> Self {
        BugLinker {
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// Search URL listing exactly `ids`.
    pub fn buglist_url(&self, ids: &[u64]) -> String {
        let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        format!(
            "{}/buglist.cgi?f1=bug_id&o1=anyexact&v1={}",
            self.endpoint,
            ids.join("%2C")
        )
    }

    /// Slack-style `<url|text>` link.
    pub fn link(&self, text: &str, ids: &[u64]) -> String {
        format!("<{}|{}>", self.buglist_url(ids), text)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TriageSummary {
    pub who: String,
    pub bug_ids: Vec<u64>,
    pub stale: usize,
    pub severity_counts: BTreeMap<String, usize>,
    pub priority_counts: BTreeMap<String, usize>,
    pub blocker_ids: Vec<u64>,
    pub untriaged_ids: Vec<u64>,
    pub needs_sprint_review_ids: Vec<u64>,
    pub post_ids: Vec<u64>,
    pub non_low_ids: Vec<u64>,
    pub serious_keyword_ids: BTreeMap<String, Vec<u64>>,
}

impl TriageSummary {
    /// Bucket `bugs`. Stale bugs are counted and then left out of every
    /// other bucket except the full list and serious keywords.
    pub fn from_bugs(who: &str, bugs: &[Arc<Bug>], current_release: &str) -> Self {
        let mut summary = TriageSummary {
            who: who.to_string(),
            ..Default::default()
        };

        for bug in bugs {
            summary.bug_ids.push(bug.id);
            for keyword in SERIOUS_KEYWORDS {
                if bug.has_keyword(keyword) {
                    summary
                        .serious_keyword_ids
                        .entry(keyword.to_string())
                        .or_default()
                        .push(bug.id);
                }
            }

            if bug.is_stale() {
                summary.stale += 1;
                continue;
            }

            *summary.severity_counts.entry(bug.severity.clone()).or_default() += 1;
            *summary.priority_counts.entry(bug.priority.clone()).or_default() += 1;

            if !bug.reviewed_in_sprint() {
                summary.needs_sprint_review_ids.push(bug.id);
            }
            if bug.is_untriaged() {
                summary.untriaged_ids.push(bug.id);
            }
            if bug.is_blocker(current_release) {
                summary.blocker_ids.push(bug.id);
            }
            if bug.status == "POST" {
                summary.post_ids.push(bug.id);
            }
            if !bug.is_low_priority_and_severity() {
                summary.non_low_ids.push(bug.id);
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.bug_ids.len()
    }

    /// Direct messages for an assignee: blockers and untriaged bugs only.
    pub fn personal_lines(&self, links: &BugLinker) -> Vec<String> {
        let mut lines = Vec::new();
        if !self.blocker_ids.is_empty() {
            let text = format!("{} bugs assigned to {}", self.blocker_ids.len(), self.who);
            lines.push(format!(
                "You have {} that are *release blockers*. Please keep an eye on them today.",
                links.link(&text, &self.blocker_ids)
            ));
        }
        if !self.untriaged_ids.is_empty() {
            let text = format!("{} bugs assigned to {}", self.untriaged_ids.len(), self.who);
            lines.push(format!(
                "You have {} that are untriaged. Set _Severity_ and _Priority_ and clear the _blocker?_ flag.",
                links.link(&text, &self.untriaged_ids)
            ));
        }
        lines
    }

    /// Channel report for a team.
    pub fn team_lines(&self, links: &BugLinker) -> Vec<String> {
        let mut lines = vec![
            format!("*Bug report for {}*", self.who),
            format!(
                "> {} Total",
                links.link(&format!("{} Bugs", self.total()), &self.bug_ids)
            ),
            format!("> Severity: {}", breakdown(&self.severity_counts)),
            format!("> Priority: {}", breakdown(&self.priority_counts)),
            format!(
                "> {}",
                links.link(
                    &format!("{} Release Blockers", self.blocker_ids.len()),
                    &self.blocker_ids
                )
            ),
        ];

        let optional = [
            ("Non-low Bugs", &self.non_low_ids),
            ("Bugs Without _UpcomingSprint_", &self.needs_sprint_review_ids),
            ("Untriaged Bugs", &self.untriaged_ids),
            ("Bugs in POST", &self.post_ids),
        ];
        for (label, ids) in optional {
            if !ids.is_empty() {
                lines.push(format!(
                    "> {}",
                    links.link(&format!("{} {}", ids.len(), label), ids)
                ));
            }
        }

        for keyword in SERIOUS_KEYWORDS {
            if let Some(ids) = self.serious_keyword_ids.get(keyword) {
                lines.push(format!(
                    "> {}",
                    links.link(&format!("{} Bugs with {}", ids.len(), keyword), ids)
                ));
            }
        }
        lines
    }
}

fn breakdown(counts: &BTreeMap<String, usize>) -> String {
    LEVEL_ORDER
        .iter()
        .filter_map(|level| {
            counts
                .get(*level)
                .filter(|&&n| n > 0)
                .map(|n| format!("{} _{}_", n, level))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Summaries for every key of a team or assignee map.
pub fn summarize(map: &BugMap, current_release: &str) -> BTreeMap<String, TriageSummary> {
    map.iter()
        .map(|(who, bugs)| {
            (
                who.to_string(),
                TriageSummary::from_bugs(who, bugs, current_release),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bug(id: u64, severity: &str, priority: &str) -> Arc<Bug> {
        Arc::new(Bug {
            id,
            severity: severity.to_string(),
            priority: priority.to_string(),
            status: "NEW".to_string(),
            target_release: vec!["4.7.0".to_string()],
            ..Default::default()
        })
    }

    #[test]
    fn test_buglist_url() {
        let links = BugLinker::new("https://bugzilla.example.com/");
        assert_eq!(
            links.buglist_url(&[1, 2]),
            "https://bugzilla.example.com/buglist.cgi?f1=bug_id&o1=anyexact&v1=1%2C2"
        );
        assert!(links.link("2 bugs", &[1, 2]).ends_with("|2 bugs>"));
    }

    #[test]
    fn test_summary_buckets() {
        let mut post = (*bug(3, "medium", "medium")).clone();
        post.status = "POST".to_string();
        post.keywords = vec!["UpcomingSprint".to_string(), "TestBlocker".to_string()];

        let mut stale = (*bug(4, "high", "high")).clone();
        stale.whiteboard = "LifecycleStale".to_string();

        let bugs = vec![
            bug(1, "high", "high"),
            bug(2, "low", "low"),
            Arc::new(post),
            Arc::new(stale),
            bug(5, "unspecified", "high"),
        ];
        let summary = TriageSummary::from_bugs("Node", &bugs, "4.7.0");

        assert_eq!(summary.total(), 5);
        assert_eq!(summary.stale, 1);
        assert_eq!(summary.blocker_ids, vec![1, 3, 5]);
        assert_eq!(summary.untriaged_ids, vec![5]);
        assert_eq!(summary.post_ids, vec![3]);
        assert_eq!(summary.needs_sprint_review_ids, vec![1, 2, 5]);
        assert_eq!(summary.non_low_ids, vec![1, 3, 5]);
        assert_eq!(summary.serious_keyword_ids["TestBlocker"], vec![3]);
        assert_eq!(summary.severity_counts["high"], 1);
    }

    #[test]
    fn test_team_lines_skip_empty_buckets() {
        let summary = TriageSummary::from_bugs("Node", &[bug(1, "low", "low")], "4.7.0");
        let lines = summary.team_lines(&BugLinker::new("https://bz"));
        assert!(lines[0].contains("Node"));
        assert!(lines.iter().any(|l| l.contains("1 _low_")));
        assert!(!lines.iter().any(|l| l.contains("POST")));
        assert!(!lines.iter().any(|l| l.contains("Untriaged")));
    }

    #[test]
    fn test_personal_lines() {
        let links = BugLinker::new("https://bz");
        let quiet = TriageSummary::from_bugs("a@example.com", &[bug(1, "low", "low")], "4.7.0");
        assert!(quiet.personal_lines(&links).is_empty());

        let busy = TriageSummary::from_bugs(
            "a@example.com",
            &[bug(1, "high", "high"), bug(2, "", "")],
            "4.7.0",
        );
        let lines = busy.personal_lines(&links);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("release blockers"));
        assert!(lines[1].contains("untriaged"));
    }
}
