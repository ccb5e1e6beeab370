//! Connection settings for each external source.
//!
//! Every config has a `Default` that reads the same environment variables
//! the binaries accept as flags, plus `new`/`with_*` builders.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SourceError;

pub const DEFAULT_BUGZILLA_ENDPOINT: &str = "https://bugzilla.redhat.com";
pub const DEFAULT_SIPPY_URL: &str = "https://sippy.dptools.openshift.org/json";
pub const DEFAULT_SLACK_API: &str = "https://slack.com/api";
pub const DEFAULT_ORG_TIMEOUT: Duration = Duration::from_secs(2);

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name).map(PathBuf::from)
}

/// Read a secret from a key file, dropping trailing newlines.
pub fn read_key_file(path: &Path) -> Result<String, SourceError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(raw.trim_end_matches(['\r', '\n']).to_string())
}

/// Issue tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Bugzilla base URL
    pub endpoint: String,
    /// File holding the API key
    pub api_key_file: Option<PathBuf>,
    /// API key given directly; wins over `api_key_file`
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Serve bugs from this JSON file instead of Bugzilla
    pub test_data: Option<PathBuf>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            endpoint: std::env::var("BUGZILLA_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_BUGZILLA_ENDPOINT.to_string()),
            api_key_file: env_path("BUGZILLA_KEY_FILE"),
            api_key: None,
            test_data: env_path("TRIAGE_TEST_BUG_DATA"),
        }
    }
}

impl TrackerConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn new(endpoint: &str) -> Self {
        TrackerConfig {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key_file: None,
            api_key: None,
            test_data: None,
        }
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    pub fn with_api_key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.api_key_file = Some(path.into());
        self
    }

    pub fn with_test_data(mut self, path: impl Into<PathBuf>) -> Self {
        self.test_data = Some(path.into());
        self
    }

    /// API key from `api_key`, else from `api_key_file`, else none.
    pub fn resolve_api_key(&self) -> Result<Option<String>, SourceError> {
        if let Some(key) = &self.api_key {
            return Ok(Some(key.clone()));
        }
        match &self.api_key_file {
            Some(path) => Ok(Some(read_key_file(path)?)),
            None => Ok(None),
        }
    }
}

/// Where team configuration comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgSourceConfig {
    /// Org-data service returning the keyed JSON form
    pub url: Option<String>,
    /// Local YAML or JSON file
    pub path: Option<PathBuf>,
    /// File layered over `path`
    pub overlay: Option<PathBuf>,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for OrgSourceConfig {
    fn default() -> Self {
        OrgSourceConfig {
            url: std::env::var("TRIAGE_ORG_DATA_URL").ok(),
            path: env_path("TRIAGE_TEAM_DATA"),
            overlay: env_path("TRIAGE_TEAM_OVERRIDE"),
            timeout: DEFAULT_ORG_TIMEOUT,
        }
    }
}

impl OrgSourceConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        OrgSourceConfig {
            url: None,
            path: Some(path.into()),
            overlay: None,
            timeout: DEFAULT_ORG_TIMEOUT,
        }
    }

    pub fn from_url(url: &str) -> Self {
        OrgSourceConfig {
            url: Some(url.to_string()),
            path: None,
            overlay: None,
            timeout: DEFAULT_ORG_TIMEOUT,
        }
    }

    pub fn with_overlay(mut self, path: impl Into<PathBuf>) -> Self {
        self.overlay = Some(path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// CI pass-rate service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiSourceConfig {
    pub url: String,
}

impl Default for CiSourceConfig {
    fn default() -> Self {
        CiSourceConfig {
            url: std::env::var("TRIAGE_CI_URL").unwrap_or_else(|_| DEFAULT_SIPPY_URL.to_string()),
        }
    }
}

impl CiSourceConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn new(url: &str) -> Self {
        CiSourceConfig {
            url: url.to_string(),
        }
    }
}

/// Slack settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub api_url: String,
    pub token_file: Option<PathBuf>,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub debug_channel: String,
    /// Send everything to `debug_channel` instead of its real target
    pub debug: bool,
    /// Tracker address to chat address, for people whose emails differ
    #[serde(default)]
    pub email_aliases: std::collections::BTreeMap<String, String>,
}

impl Default for SlackConfig {
    fn default() -> Self {
        SlackConfig {
            api_url: DEFAULT_SLACK_API.to_string(),
            token_file: env_path("SLACK_TOKEN_FILE"),
            token: None,
            debug_channel: "#triage-debug".to_string(),
            debug: false,
            email_aliases: Default::default(),
        }
    }
}

impl SlackConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn new(api_url: &str, token: &str) -> Self {
        SlackConfig {
            api_url: api_url.trim_end_matches('/').to_string(),
            token: Some(token.to_string()),
            token_file: None,
            ..Self::default()
        }
    }

    pub fn with_debug(mut self, debug_channel: &str) -> Self {
        self.debug = true;
        self.debug_channel = debug_channel.to_string();
        self
    }

    pub fn with_alias(mut self, tracker_email: &str, chat_email: &str) -> Self {
        self.email_aliases
            .insert(tracker_email.to_string(), chat_email.to_string());
        self
    }

    pub fn resolve_token(&self) -> Result<String, SourceError> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        match &self.token_file {
            Some(path) => read_key_file(path),
            None => Err(SourceError::Chat("no Slack token configured".to_string())),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_key_file_trims_newlines() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("key");
        std::fs::write(&path, "s3cret\r\n").unwrap();
        assert_eq!(read_key_file(&path).unwrap(), "s3cret");
    }

    #[test]
    fn test_api_key_precedence() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("key");
        std::fs::write(&path, "from-file\n").unwrap();

        let config = TrackerConfig::new("https://bz/").with_api_key_file(&path);
        assert_eq!(config.endpoint, "https://bz");
        assert_eq!(config.resolve_api_key().unwrap().as_deref(), Some("from-file"));

        let config = config.with_api_key("inline");
        assert_eq!(config.resolve_api_key().unwrap().as_deref(), Some("inline"));

        assert_eq!(TrackerConfig::new("https://bz").resolve_api_key().unwrap(), None);
    }

    #[test]
    fn test_slack_token_required() {
        let mut config = SlackConfig::new("https://slack", "t");
        assert_eq!(config.resolve_token().unwrap(), "t");
        config.token = None;
        assert!(config.resolve_token().is_err());
    }

    #[test]
    fn test_org_source_timeout_round_trip() {
        let config = OrgSourceConfig::from_url("http://org").with_timeout(Duration::from_millis(500));
        let json = serde_json::to_string(&config).unwrap();
        let back: OrgSourceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.timeout, Duration::from_millis(500));
    }
}
