//! Team directory sources.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};
use triage_core::{OrgConfig, OrgDirectory};

use crate::config::OrgSourceConfig;
use crate::error::{ensure_success, SourceError, SourceResult};

const SERVICE: &str = "org-data";

/// Anything that can produce a fresh, validated team directory.
#[async_trait]
pub trait OrgSource: Send + Sync {
    async fn load(&self) -> SourceResult<OrgDirectory>;
}

/// Directory read from a YAML or JSON file, with an optional override file
/// layered on top.
#[derive(Debug, Clone)]
pub struct FileOrgSource {
    path: PathBuf,
    overlay: Option<PathBuf>,
}

impl FileOrgSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileOrgSource {
            path: path.into(),
            overlay: None,
        }
    }

    pub fn with_overlay(mut self, overlay: impl Into<PathBuf>) -> Self {
        self.overlay = Some(overlay.into());
        self
    }
}

#[async_trait]
impl OrgSource for FileOrgSource {
    async fn load(&self) -> SourceResult<OrgDirectory> {
        let mut config = OrgConfig::from_path(&self.path)?;
        if let Some(overlay) = &self.overlay {
            debug!(overlay = %overlay.display(), "applying team override file");
            config.merge_overlay(OrgConfig::from_path(overlay)?);
        }
        let directory = OrgDirectory::load(config)?;
        info!(
            path = %self.path.display(),
            teams = directory.teams().len(),
            "loaded team directory"
        );
        Ok(directory)
    }
}

/// Directory served by the org-data service as JSON.
pub struct ServiceOrgSource {
    url: String,
    http: reqwest::Client,
}

impl ServiceOrgSource {
    pub fn new(url: &str, config: &OrgSourceConfig) -> SourceResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("triage-sources/", env!("CARGO_PKG_VERSION"), " org"))
            .timeout(config.timeout)
            .build()?;
        Ok(ServiceOrgSource {
            url: url.to_string(),
            http,
        })
    }
}

#[async_trait]
impl OrgSource for ServiceOrgSource {
    async fn load(&self) -> SourceResult<OrgDirectory> {
        let resp = self.http.get(&self.url).send().await?;
        let body = ensure_success(SERVICE, resp).await?.text().await?;
        let directory = OrgDirectory::from_json_str(&body)?;
        info!(
            url = %self.url,
            teams = directory.teams().len(),
            "fetched team directory"
        );
        Ok(directory)
    }
}

/// Source selected by configuration. A local file wins over the service.
pub fn org_source_from_config(config: &OrgSourceConfig) -> SourceResult<Box<dyn OrgSource>> {
    if let Some(path) = &config.path {
        let mut source = FileOrgSource::new(path);
        if let Some(overlay) = &config.overlay {
            source = source.with_overlay(overlay);
        }
        return Ok(Box::new(source));
    }
    match &config.url {
        Some(url) => Ok(Box::new(ServiceOrgSource::new(url, config)?)),
        None => Err(SourceError::Config(triage_core::ConfigError::MissingField {
            field: "url or path".to_string(),
            context: "team data source".to_string(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r##"
Teams:
  - name: Node
    components: [Node]
    slack_chan: "#node"
  - name: Storage
    components: [Storage]
"##;

    const OVERRIDE: &str = r#"
Teams:
  - name: Node
    memberCount: 6
  - name: Docs
    components: [Documentation]
slo:
  total:
    count: 50
"#;

    #[tokio::test]
    async fn test_file_source_with_overlay() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("teams.yaml");
        let overlay = tmp.path().join("override.yaml");
        std::fs::write(&base, BASE).unwrap();
        std::fs::write(&overlay, OVERRIDE).unwrap();

        let dir = FileOrgSource::new(&base).with_overlay(&overlay).load().await.unwrap();
        let node = dir.team("Node").unwrap();
        assert_eq!(node.member_count, 6);
        assert_eq!(node.slack_chan, "#node");
        assert_eq!(node.components, vec!["Node".to_string()]);
        assert_eq!(dir.teams().len(), 3);
        assert_eq!(dir.org_slo()["total"].count, 50.0);
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let err = FileOrgSource::new("/nonexistent/teams.yaml").load().await.unwrap_err();
        assert!(matches!(err, SourceError::Config(_)));
    }

    #[test]
    fn test_source_selection_needs_url_or_path() {
        let config = OrgSourceConfig {
            url: None,
            path: None,
            overlay: None,
            timeout: std::time::Duration::from_secs(1),
        };
        assert!(org_source_from_config(&config).is_err());
        assert!(org_source_from_config(&OrgSourceConfig::from_file("teams.yaml")).is_ok());
    }
}
