//! Team directory: who owns which component, and what each team owes.
//!
//! An [`OrgDirectory`] is built once from raw configuration ([`OrgConfig`])
//! and then treated as immutable. Reconciliation replaces the whole value;
//! nothing mutates a directory in place after [`OrgDirectory::load`].
//!
//! Team order is significant: classification scans teams in the order they
//! appear in the configuration.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::bug::Bug;
use crate::classify;
use crate::error::ConfigError;

/// Subcomponent list value marking a team as the fallback owner of a
/// component's otherwise unclaimed subcomponents.
pub const DEFAULT_SUBCOMPONENTS_TAG: &str = "!!DEFAULT!!";

/// Component list value marking a team to be dropped at load time.
pub const IGNORE_TEAM_TAG: &str = "!!IGNORE!!";

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// Maximum permitted value of one SLO metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SloObligation {
    #[serde(default)]
    pub count: f32,
    /// Scale `count` by the team's member count.
    #[serde(default, rename = "perMember", skip_serializing_if = "is_false")]
    pub per_member: bool,
}

impl SloObligation {
    pub fn new(count: f32) -> Self {
        Self {
            count,
            per_member: false,
        }
    }

    pub fn per_member(count: f32) -> Self {
        Self {
            count,
            per_member: true,
        }
    }
}

/// Which subcomponents of a component a team owns.
///
/// Stored on disk as a plain list; a list consisting of exactly
/// [`DEFAULT_SUBCOMPONENTS_TAG`] means [`SubcomponentScope::Fallback`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub enum SubcomponentScope {
    /// Owner of every subcomponent no other team lists explicitly.
    Fallback,
    /// Owner of exactly these subcomponents.
    Listed(Vec<String>),
}

impl SubcomponentScope {
    pub fn listed<I, S>(subcomponents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SubcomponentScope::Listed(subcomponents.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, subcomponent: &str) -> bool {
        match self {
            SubcomponentScope::Fallback => false,
            SubcomponentScope::Listed(subs) => subs.iter().any(|s| s == subcomponent),
        }
    }
}

impl From<Vec<String>> for SubcomponentScope {
    fn from(subs: Vec<String>) -> Self {
        if subs.len() == 1 && subs[0] == DEFAULT_SUBCOMPONENTS_TAG {
            SubcomponentScope::Fallback
        } else {
            SubcomponentScope::Listed(subs)
        }
    }
}

impl From<SubcomponentScope> for Vec<String> {
    fn from(scope: SubcomponentScope) -> Self {
        match scope {
            SubcomponentScope::Fallback => vec![DEFAULT_SUBCOMPONENTS_TAG.to_string()],
            SubcomponentScope::Listed(subs) => subs,
        }
    }
}

/// One team's ownership rules and SLO obligations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamRule {
    /// May be omitted in the keyed form, where the map key names the team.
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slack_chan: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub lead: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub managers: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(default)]
    pub components: Vec<String>,
    /// Absent entry: the team owns every subcomponent of that component.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subcomponents: BTreeMap<String, SubcomponentScope>,
    #[serde(default, rename = "memberCount", skip_serializing_if = "is_zero")]
    pub member_count: u32,
    /// Per-metric overrides of the org-wide obligations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub slo: BTreeMap<String, SloObligation>,
}

impl TeamRule {
    pub fn new(name: &str, components: &[&str]) -> Self {
        TeamRule {
            name: name.to_string(),
            components: components.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_subcomponents(mut self, component: &str, scope: SubcomponentScope) -> Self {
        self.subcomponents.insert(component.to_string(), scope);
        self
    }

    pub fn with_members(mut self, member_count: u32) -> Self {
        self.member_count = member_count;
        self
    }

    pub fn with_slo(mut self, metric: &str, obligation: SloObligation) -> Self {
        self.slo.insert(metric.to_string(), obligation);
        self
    }

    pub fn owns_component(&self, component: &str) -> bool {
        self.components.iter().any(|c| c == component)
    }

    fn is_ignored(&self) -> bool {
        self.components.len() == 1 && self.components[0] == IGNORE_TEAM_TAG
    }

    /// Overwrite fields with the non-empty fields of `other`.
    fn merge_from(&mut self, other: TeamRule) {
        if !other.slack_chan.is_empty() {
            self.slack_chan = other.slack_chan;
        }
        if !other.lead.is_empty() {
            self.lead = other.lead;
        }
        if !other.managers.is_empty() {
            self.managers = other.managers;
        }
        if !other.group.is_empty() {
            self.group = other.group;
        }
        if !other.components.is_empty() {
            self.components = other.components;
        }
        if other.member_count != 0 {
            self.member_count = other.member_count;
        }
        self.subcomponents.extend(other.subcomponents);
        self.slo.extend(other.slo);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestones {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub start: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub feature_complete: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code_freeze: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ga: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestones: Option<Milestones>,
}

impl ReleaseInfo {
    pub fn new(name: &str, targets: &[&str]) -> Self {
        ReleaseInfo {
            name: name.to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
            milestones: None,
        }
    }

    /// Only z-stream targets (e.g. `4.5.z`).
    fn is_z_stream_only(&self) -> bool {
        self.targets.iter().all(|t| t.ends_with(".z"))
    }
}

/// Raw, ordered configuration as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrgConfig {
    #[serde(rename = "OrgTitle", default, skip_serializing_if = "String::is_empty")]
    pub org_title: String,
    #[serde(rename = "Teams", default)]
    pub teams: Vec<TeamRule>,
    #[serde(rename = "Releases", default, skip_serializing_if = "Vec::is_empty")]
    pub releases: Vec<ReleaseInfo>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub slo: BTreeMap<String, SloObligation>,
}

impl OrgConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let payload: OrgPayload = serde_json::from_str(raw)?;
        Ok(payload.into_config())
    }

    /// Read a config file; `.json` files are parsed as JSON, anything else
    /// as YAML.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&raw),
            _ => Self::from_yaml_str(&raw),
        }
    }

    /// Layer `overlay` on top of this config.
    ///
    /// Teams are matched by name and overwritten field by field (non-empty
    /// fields win); unknown teams are appended. Releases are replaced by
    /// name and org-wide obligations by metric.
    pub fn merge_overlay(&mut self, overlay: OrgConfig) {
        if !overlay.org_title.is_empty() {
            self.org_title = overlay.org_title;
        }
        for team in overlay.teams {
            match self.teams.iter_mut().find(|t| t.name == team.name) {
                Some(existing) => existing.merge_from(team),
                None => self.teams.push(team),
            }
        }
        for release in overlay.releases {
            match self.releases.iter_mut().find(|r| r.name == release.name) {
                Some(existing) => *existing = release,
                None => self.releases.push(release),
            }
        }
        self.slo.extend(overlay.slo);
    }
}

/// Keyed form served by the org-data service.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyedOrgConfig {
    #[serde(rename = "orgTitle", default)]
    pub org_title: String,
    pub teams: BTreeMap<String, TeamRule>,
    #[serde(default)]
    pub releases: BTreeMap<String, ReleaseInfo>,
    #[serde(default)]
    pub slo: BTreeMap<String, SloObligation>,
}

/// Either storage form of the org configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OrgPayload {
    Keyed(KeyedOrgConfig),
    Ordered(OrgConfig),
}

impl OrgPayload {
    /// Normalise to the ordered form. Keyed payloads carry no order, so
    /// their teams come out sorted by name.
    pub fn into_config(self) -> OrgConfig {
        match self {
            OrgPayload::Ordered(config) => config,
            OrgPayload::Keyed(keyed) => OrgConfig {
                org_title: keyed.org_title,
                teams: keyed
                    .teams
                    .into_iter()
                    .map(|(name, mut team)| {
                        if team.name.is_empty() {
                            team.name = name;
                        }
                        team
                    })
                    .collect(),
                releases: keyed
                    .releases
                    .into_iter()
                    .map(|(name, mut release)| {
                        if release.name.is_empty() {
                            release.name = name;
                        }
                        release
                    })
                    .collect(),
                slo: keyed.slo,
            },
        }
    }
}

/// Loaded, indexed team directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "OrgConfig", into = "OrgConfig")]
pub struct OrgDirectory {
    org_title: String,
    teams: Vec<TeamRule>,
    index: HashMap<String, usize>,
    releases: Vec<ReleaseInfo>,
    slo: BTreeMap<String, SloObligation>,
}

impl OrgDirectory {
    /// Validate and index raw configuration.
    pub fn load(config: OrgConfig) -> Result<Self, ConfigError> {
        if config.teams.is_empty() {
            return Err(ConfigError::missing("Teams", "org configuration"));
        }

        let mut teams = Vec::with_capacity(config.teams.len());
        let mut index = HashMap::with_capacity(config.teams.len());
        for team in config.teams {
            if team.name.is_empty() {
                return Err(ConfigError::missing("name", "team entry"));
            }
            if team.is_ignored() {
                tracing::info!(team = %team.name, "dropping ignored team");
                continue;
            }
            if team.components.is_empty() {
                return Err(ConfigError::missing(
                    "components",
                    format!("team {:?}", team.name),
                ));
            }
            if index.insert(team.name.clone(), teams.len()).is_some() {
                return Err(ConfigError::DuplicateTeam(team.name));
            }
            teams.push(team);
        }

        for release in &config.releases {
            if release.name.is_empty() {
                return Err(ConfigError::missing("name", "release entry"));
            }
        }

        Ok(OrgDirectory {
            org_title: config.org_title,
            teams,
            index,
            releases: config.releases,
            slo: config.slo,
        })
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        Self::load(OrgConfig::from_yaml_str(raw)?)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Self::load(OrgConfig::from_json_str(raw)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        Self::load(OrgConfig::from_path(path)?)
    }

    /// Storage form of this directory; `load(to_config())` is identity.
    pub fn to_config(&self) -> OrgConfig {
        OrgConfig {
            org_title: self.org_title.clone(),
            teams: self.teams.clone(),
            releases: self.releases.clone(),
            slo: self.slo.clone(),
        }
    }

    pub fn org_title(&self) -> &str {
        &self.org_title
    }

    /// Teams in classification order.
    pub fn teams(&self) -> &[TeamRule] {
        &self.teams
    }

    pub fn team(&self, name: &str) -> Option<&TeamRule> {
        self.index.get(name).map(|&i| &self.teams[i])
    }

    /// Team names, sorted.
    pub fn team_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.teams.iter().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn releases(&self) -> &[ReleaseInfo] {
        &self.releases
    }

    /// Org-wide default obligations, keyed by metric name.
    pub fn org_slo(&self) -> &BTreeMap<String, SloObligation> {
        &self.slo
    }

    /// Owning team for a component/subcomponent pair, or `"unknown"`.
    pub fn classify(&self, component: &str, subcomponent: &str) -> &str {
        classify::classify_team(self, component, subcomponent)
    }

    pub fn classify_bug(&self, bug: &Bug) -> &str {
        classify::classify_bug(self, bug)
    }

    /// Lowest `x.y` release that still has a non z-stream target.
    pub fn current_version(&self) -> Result<String, ConfigError> {
        self.releases
            .iter()
            .filter(|r| !r.is_z_stream_only())
            .filter_map(|r| {
                let mut parts = r.name.split('.');
                let major = parts.next()?.parse::<u32>().ok()?;
                let minor = parts.next()?.parse::<u32>().ok()?;
                Some((major, minor))
            })
            .min()
            .map(|(major, minor)| format!("{}.{}", major, minor))
            .ok_or_else(|| {
                ConfigError::NoActiveRelease(self.releases.iter().map(|r| r.name.clone()).collect())
            })
    }

    /// Target-release value of the current version (`x.y.0`).
    pub fn current_release(&self) -> Result<String, ConfigError> {
        Ok(format!("{}.0", self.current_version()?))
    }

    /// SHA-256 over the canonical storage form.
    pub fn digest(&self) -> String {
        let bytes = serde_json::to_vec(&self.to_config()).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }

    /// Report component claims whose resolution depends on team order.
    ///
    /// Findings are advisory; the directory stays usable and classification
    /// stays deterministic for a given order.
    pub fn lint(&self) -> Vec<LintFinding> {
        let mut claims: BTreeMap<&str, Vec<&TeamRule>> = BTreeMap::new();
        for team in &self.teams {
            for component in &team.components {
                claims.entry(component.as_str()).or_default().push(team);
            }
        }

        let mut findings = Vec::new();
        for (component, teams) in claims {
            if teams.len() < 2 {
                continue;
            }
            let mut unrestricted = Vec::new();
            let mut fallbacks = Vec::new();
            let mut listed: BTreeMap<&str, Vec<String>> = BTreeMap::new();
            for team in &teams {
                match team.subcomponents.get(component) {
                    None => unrestricted.push(team.name.clone()),
                    Some(SubcomponentScope::Fallback) => fallbacks.push(team.name.clone()),
                    Some(SubcomponentScope::Listed(subs)) => {
                        for sub in subs {
                            listed.entry(sub.as_str()).or_default().push(team.name.clone());
                        }
                    }
                }
            }

            if unrestricted.len() > 1 {
                findings.push(LintFinding {
                    component: component.to_string(),
                    kind: LintKind::SharedComponent,
                    teams: unrestricted.clone(),
                });
            }
            if !unrestricted.is_empty() && unrestricted.len() < teams.len() {
                findings.push(LintFinding {
                    component: component.to_string(),
                    kind: LintKind::ShadowedSubcomponents,
                    teams: teams.iter().map(|t| t.name.clone()).collect(),
                });
            }
            if fallbacks.len() > 1 {
                findings.push(LintFinding {
                    component: component.to_string(),
                    kind: LintKind::MultipleFallbacks,
                    teams: fallbacks,
                });
            }
            for (sub, owners) in listed {
                if owners.len() > 1 {
                    findings.push(LintFinding {
                        component: component.to_string(),
                        kind: LintKind::DuplicateSubcomponent(sub.to_string()),
                        teams: owners,
                    });
                }
            }
        }
        findings
    }
}

impl TryFrom<OrgConfig> for OrgDirectory {
    type Error = ConfigError;

    fn try_from(config: OrgConfig) -> Result<Self, Self::Error> {
        OrgDirectory::load(config)
    }
}

impl From<OrgDirectory> for OrgConfig {
    fn from(directory: OrgDirectory) -> Self {
        OrgConfig {
            org_title: directory.org_title,
            teams: directory.teams,
            releases: directory.releases,
            slo: directory.slo,
        }
    }
}

/// Kind of order-dependent claim found by [`OrgDirectory::lint`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "subcomponent", rename_all = "snake_case")]
pub enum LintKind {
    /// Several teams own the whole component; the first one wins.
    SharedComponent,
    /// A team owning the whole component hides teams that list
    /// subcomponents after it, and every fallback owner.
    ShadowedSubcomponents,
    /// More than one fallback owner; the first one wins.
    MultipleFallbacks,
    /// The same subcomponent is listed by several teams.
    DuplicateSubcomponent(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintFinding {
    pub component: String,
    pub kind: LintKind,
    pub teams: Vec<String>,
}

impl std::fmt::Display for LintFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let teams = self.teams.join(", ");
        match &self.kind {
            LintKind::SharedComponent => {
                write!(f, "component {:?} is owned outright by: {}", self.component, teams)
            }
            LintKind::ShadowedSubcomponents => write!(
                f,
                "component {:?} mixes whole-component and subcomponent owners: {}",
                self.component, teams
            ),
            LintKind::MultipleFallbacks => write!(
                f,
                "component {:?} has several fallback owners: {}",
                self.component, teams
            ),
            LintKind::DuplicateSubcomponent(sub) => write!(
                f,
                "subcomponent {:?}/{:?} is listed by: {}",
                self.component, sub, teams
            ),
        }
    }
}
