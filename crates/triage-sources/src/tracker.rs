//! Issue tracker access.
//!
//! [`IssueTracker`] is the seam the rest of the system uses. The production
//! implementation talks to the Bugzilla REST API; [`FileTracker`] serves a
//! saved JSON dump for offline runs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use triage_core::{Bug, BugSet};

use crate::config::TrackerConfig;
use crate::error::{ensure_success, SourceError, SourceResult};

const SERVICE: &str = "bugzilla";

/// Statuses treated as open.
pub const OPEN_STATUSES: [&str; 5] = ["NEW", "ASSIGNED", "POST", "ON_DEV", "MODIFIED"];

/// Fields fetched for every bug.
pub const BUG_FIELDS: [&str; 13] = [
    "id",
    "summary",
    "status",
    "severity",
    "priority",
    "assigned_to",
    "target_release",
    "component",
    "sub_components",
    "keywords",
    "flags",
    "whiteboard",
    "cf_pm_score",
];

/// One `f<n>`/`o<n>`/`v<n>` advanced search term.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancedTerm {
    pub field: String,
    pub op: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub negate: bool,
}

/// Search parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugQuery {
    #[serde(default)]
    pub classification: Vec<String>,
    #[serde(default)]
    pub product: Vec<String>,
    #[serde(default)]
    pub status: Vec<String>,
    #[serde(default)]
    pub severity: Vec<String>,
    #[serde(default)]
    pub component: Vec<String>,
    #[serde(default)]
    pub target_release: Vec<String>,
    #[serde(default)]
    pub include_fields: Vec<String>,
    #[serde(default)]
    pub advanced: Vec<AdvancedTerm>,
}

impl BugQuery {
    /// Every open, non-documentation bug of the product.
    pub fn open_bugs() -> Self {
        BugQuery {
            classification: vec!["Red Hat".to_string()],
            product: vec!["OpenShift Container Platform".to_string()],
            status: OPEN_STATUSES.iter().map(|s| s.to_string()).collect(),
            include_fields: BUG_FIELDS.iter().map(|s| s.to_string()).collect(),
            advanced: vec![AdvancedTerm {
                field: "component".to_string(),
                op: "equals".to_string(),
                value: "Documentation".to_string(),
                negate: true,
            }],
            ..Default::default()
        }
    }

    pub fn with_status(mut self, statuses: &[&str]) -> Self {
        self.status = statuses.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_components(mut self, components: &[&str]) -> Self {
        self.component = components.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Query-string pairs in Bugzilla's REST naming.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        let repeated = [
            ("classification", &self.classification),
            ("product", &self.product),
            ("bug_status", &self.status),
            ("bug_severity", &self.severity),
            ("component", &self.component),
            ("target_release", &self.target_release),
        ];
        for (key, values) in repeated {
            for value in values {
                params.push((key.to_string(), value.clone()));
            }
        }
        for (i, term) in self.advanced.iter().enumerate() {
            let n = i + 1;
            params.push((format!("f{}", n), term.field.clone()));
            params.push((format!("o{}", n), term.op.clone()));
            if !term.value.is_empty() {
                params.push((format!("v{}", n), term.value.clone()));
            }
            if term.negate {
                params.push((format!("n{}", n), "1".to_string()));
            }
        }
        if !self.include_fields.is_empty() {
            params.push(("include_fields".to_string(), self.include_fields.join(",")));
        }
        params
    }

    /// Whether `bug` satisfies the simple (non-advanced) criteria.
    pub fn matches(&self, bug: &Bug) -> bool {
        fn allowed(values: &[String], actual: &str) -> bool {
            values.is_empty() || values.iter().any(|v| v == actual)
        }
        allowed(&self.status, &bug.status)
            && allowed(&self.severity, &bug.severity)
            && allowed(&self.component, bug.component())
            && allowed(&self.target_release, bug.target_release())
    }
}

/// Keyword additions and removals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordChange {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub body: String,
}

/// Fields to change on a bug; unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<KeywordChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whiteboard: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<Comment>,
}

impl BugUpdate {
    pub fn status(status: &str) -> Self {
        BugUpdate {
            status: Some(status.to_string()),
            ..Default::default()
        }
    }

    pub fn add_keyword(mut self, keyword: &str) -> Self {
        self.keywords
            .get_or_insert_with(KeywordChange::default)
            .add
            .push(keyword.to_string());
        self
    }

    pub fn remove_keyword(mut self, keyword: &str) -> Self {
        self.keywords
            .get_or_insert_with(KeywordChange::default)
            .remove
            .push(keyword.to_string());
        self
    }

    pub fn with_comment(mut self, body: &str) -> Self {
        self.comment = Some(Comment {
            body: body.to_string(),
        });
        self
    }

    /// Apply the update to a local copy of a bug.
    pub fn apply_to(&self, bug: &mut Bug) {
        if let Some(status) = &self.status {
            bug.status = status.clone();
        }
        if let Some(target) = &self.target_release {
            bug.target_release = vec![target.clone()];
        }
        if let Some(whiteboard) = &self.whiteboard {
            bug.whiteboard = whiteboard.clone();
        }
        if let Some(keywords) = &self.keywords {
            bug.keywords.retain(|k| !keywords.remove.contains(k));
            for k in &keywords.add {
                if !bug.has_keyword(k) {
                    bug.keywords.push(k.clone());
                }
            }
        }
    }
}

/// Read and write access to the issue tracker.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Every bug matching `query`.
    async fn search(&self, query: &BugQuery) -> SourceResult<BugSet>;

    /// One bug; [`SourceError::NotFound`] when the ID does not exist.
    async fn get_bug(&self, id: u64) -> SourceResult<Bug>;

    async fn update_bug(&self, id: u64, update: &BugUpdate) -> SourceResult<()>;
}

#[derive(Debug, Deserialize)]
struct BugsResponse {
    #[serde(default)]
    bugs: Vec<Bug>,
}

/// Bugzilla REST client.
pub struct BugzillaClient {
    endpoint: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl BugzillaClient {
    pub fn new(config: &TrackerConfig) -> SourceResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("triage-sources/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(BugzillaClient {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.resolve_api_key()?,
            http,
        })
    }

    pub fn from_env() -> SourceResult<Self> {
        Self::new(&TrackerConfig::from_env())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("X-BUGZILLA-API-KEY", key),
            None => req,
        }
    }

    async fn fetch_page(
        &self,
        params: &[(String, String)],
        limit: usize,
        offset: usize,
    ) -> SourceResult<Vec<Bug>> {
        let url = format!("{}/rest/bug", self.endpoint);
        let resp = self
            .authorize(self.http.get(&url))
            .query(params)
            .query(&[("limit", limit), ("offset", offset)])
            .send()
            .await?;
        let resp = ensure_success(SERVICE, resp).await?;
        let parsed: BugsResponse = resp.json().await?;
        Ok(parsed.bugs)
    }
}

#[async_trait]
impl IssueTracker for BugzillaClient {
    /// Bugzilla does not advertise its page size, so the size of the first
    /// page is taken as the limit and paging stops at the first short or
    /// empty page.
    async fn search(&self, query: &BugQuery) -> SourceResult<BugSet> {
        let params = query.to_params();
        let mut limit = 0;
        let mut offset = 0;
        let mut out = Vec::new();
        loop {
            let page = self.fetch_page(&params, limit, offset).await?;
            debug!(offset, count = page.len(), "fetched bug page");
            if page.is_empty() {
                break;
            }
            let count = page.len();
            out.extend(page);
            if limit == 0 {
                limit = count;
            }
            if count < limit {
                break;
            }
            offset += limit;
        }
        info!(bugs = out.len(), "bugzilla search complete");
        Ok(BugSet::new(out))
    }

    async fn get_bug(&self, id: u64) -> SourceResult<Bug> {
        let url = format!("{}/rest/bug/{}", self.endpoint, id);
        let resp = self.authorize(self.http.get(&url)).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound { id });
        }
        let resp = ensure_success(SERVICE, resp).await?;
        let parsed: BugsResponse = resp.json().await?;
        parsed
            .bugs
            .into_iter()
            .next()
            .ok_or(SourceError::NotFound { id })
    }

    async fn update_bug(&self, id: u64, update: &BugUpdate) -> SourceResult<()> {
        let url = format!("{}/rest/bug/{}", self.endpoint, id);
        let resp = self.authorize(self.http.put(&url)).json(update).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound { id });
        }
        ensure_success(SERVICE, resp).await?;
        info!(bug = id, "updated bug");
        Ok(())
    }
}

/// Read-only tracker backed by a JSON file of bugs.
///
/// Accepts either a bare array or the `{"bugs": [...]}` search response
/// shape. Updates are rejected.
#[derive(Debug, Clone)]
pub struct FileTracker {
    path: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BugDump {
    Wrapped(BugsResponse),
    Bare(Vec<Bug>),
}

impl FileTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileTracker { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> SourceResult<Vec<Bug>> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let dump: BugDump = serde_json::from_str(&raw)?;
        Ok(match dump {
            BugDump::Wrapped(resp) => resp.bugs,
            BugDump::Bare(bugs) => bugs,
        })
    }
}

#[async_trait]
impl IssueTracker for FileTracker {
    async fn search(&self, query: &BugQuery) -> SourceResult<BugSet> {
        let bugs: Vec<Bug> = self
            .load()
            .await?
            .into_iter()
            .filter(|b| query.matches(b))
            .collect();
        debug!(path = %self.path.display(), bugs = bugs.len(), "loaded bugs from file");
        Ok(BugSet::new(bugs))
    }

    async fn get_bug(&self, id: u64) -> SourceResult<Bug> {
        self.load()
            .await?
            .into_iter()
            .find(|b| b.id == id)
            .ok_or(SourceError::NotFound { id })
    }

    async fn update_bug(&self, id: u64, _update: &BugUpdate) -> SourceResult<()> {
        Err(SourceError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            format!("bug {} cannot be updated in file {}", id, self.path.display()),
        )))
    }
}

/// Tracker selected by configuration: the test data file when one is set,
/// Bugzilla otherwise.
pub fn tracker_from_config(config: &TrackerConfig) -> SourceResult<Box<dyn IssueTracker>> {
    match &config.test_data {
        Some(path) => Ok(Box::new(FileTracker::new(path))),
        None => Ok(Box::new(BugzillaClient::new(config)?)),
    }
}
