//! CI pass rates per component.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;
use triage_core::CiPassRates;

use crate::config::CiSourceConfig;
use crate::error::{ensure_success, SourceResult};

const SERVICE: &str = "sippy";

/// Pass-rate window read from each component entry.
pub const LATEST_WINDOW: &str = "latest";

#[async_trait]
pub trait CiPassRateSource: Send + Sync {
    /// Latest pass percentage per component for release `version` (`x.y`).
    async fn pass_rates(&self, version: &str) -> SourceResult<CiPassRates>;
}

#[derive(Debug, Deserialize)]
struct PassRate {
    percentage: f64,
}

#[derive(Debug, Deserialize)]
struct ComponentPassRates {
    name: String,
    #[serde(rename = "passRates", default)]
    pass_rates: BTreeMap<String, PassRate>,
}

#[derive(Debug, Deserialize)]
struct ReleaseReport {
    #[serde(rename = "minimumJobPassRatesByComponent", default)]
    by_component: Vec<ComponentPassRates>,
}

/// Extract `version`'s latest per-component pass rates from a sippy report.
///
/// The report is keyed by release; a report without `version` yields an
/// empty table. Components without a latest window are skipped.
pub fn parse_sippy_report(body: &str, version: &str) -> Result<CiPassRates, serde_json::Error> {
    let mut report: BTreeMap<String, ReleaseReport> = serde_json::from_str(body)?;
    let Some(release) = report.remove(version) else {
        return Ok(CiPassRates::new());
    };
    Ok(release
        .by_component
        .into_iter()
        .filter_map(|c| {
            let latest = c.pass_rates.get(LATEST_WINDOW)?.percentage;
            Some((c.name, latest))
        })
        .collect())
}

/// Client for the sippy JSON report.
pub struct SippyClient {
    url: String,
    http: reqwest::Client,
}

impl SippyClient {
    pub fn new(config: &CiSourceConfig) -> SourceResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("triage-sources/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(SippyClient {
            url: config.url.clone(),
            http,
        })
    }
}

#[async_trait]
impl CiPassRateSource for SippyClient {
    async fn pass_rates(&self, version: &str) -> SourceResult<CiPassRates> {
        let resp = self
            .http
            .get(&self.url)
            .query(&[("release", version)])
            .send()
            .await?;
        let body = ensure_success(SERVICE, resp).await?.text().await?;
        let rates = parse_sippy_report(&body, version)?;
        info!(release = version, components = rates.len(), "fetched CI pass rates");
        Ok(rates)
    }
}
