//! Bug classification: component/subcomponent pair to owning team.
//!
//! Resolution is two passes over the directory's team order:
//!
//! 1. the first team that owns the pair outright (component with no
//!    subcomponent restriction, or subcomponent explicitly listed);
//! 2. otherwise the first team registered as fallback owner of the
//!    component;
//! 3. otherwise [`UNKNOWN_TEAM`].
//!
//! The function is total and does not depend on any map iteration order.

use crate::bug::Bug;
use crate::directory::{OrgDirectory, SubcomponentScope, TeamRule};

/// Bucket for bugs no team claims.
pub const UNKNOWN_TEAM: &str = "unknown";

/// How a single team relates to a component/subcomponent pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamMatch {
    /// The team owns the pair.
    Exact,
    /// The team is fallback owner of the component.
    Fallback,
    NoMatch,
}

pub fn match_team(team: &TeamRule, component: &str, subcomponent: &str) -> TeamMatch {
    if !team.owns_component(component) {
        return TeamMatch::NoMatch;
    }
    match team.subcomponents.get(component) {
        None => TeamMatch::Exact,
        Some(SubcomponentScope::Fallback) => TeamMatch::Fallback,
        Some(scope) if scope.contains(subcomponent) => TeamMatch::Exact,
        Some(_) => TeamMatch::NoMatch,
    }
}

/// Name of the team owning `component`/`subcomponent`, or [`UNKNOWN_TEAM`].
pub fn classify_team<'a>(directory: &'a OrgDirectory, component: &str, subcomponent: &str) -> &'a str {
    let teams = directory.teams();
    if let Some(team) = teams
        .iter()
        .find(|t| match_team(t, component, subcomponent) == TeamMatch::Exact)
    {
        return &team.name;
    }
    teams
        .iter()
        .find(|t| match_team(t, component, subcomponent) == TeamMatch::Fallback)
        .map(|t| t.name.as_str())
        .unwrap_or(UNKNOWN_TEAM)
}

/// Classify a bug by its primary component and first subcomponent.
pub fn classify_bug<'a>(directory: &'a OrgDirectory, bug: &Bug) -> &'a str {
    classify_team(directory, bug.component(), bug.subcomponent())
}
