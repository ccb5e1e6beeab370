//! Chat notifications.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::SlackConfig;
use crate::error::{ensure_success, SourceError, SourceResult};

const SERVICE: &str = "slack";

/// Delay used when a 429 carries no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

#[async_trait]
pub trait ChatNotifier: Send + Sync {
    async fn message_channel(&self, channel: &str, text: &str) -> SourceResult<()>;

    /// Direct message to the chat user registered under `email`.
    async fn message_email(&self, email: &str, text: &str) -> SourceResult<()>;

    async fn message_debug(&self, text: &str) -> SourceResult<()>;
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user: Option<IdRef>,
    #[serde(default)]
    channel: Option<IdRef>,
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: String,
}

impl ApiReply {
    fn into_result(self) -> SourceResult<ApiReply> {
        if self.ok {
            Ok(self)
        } else {
            Err(SourceError::Chat(
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

fn retry_after(resp: &reqwest::Response) -> Duration {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

/// Slack Web API client.
///
/// In debug mode every message is rewritten and delivered to the debug
/// channel instead of its real destination.
pub struct SlackClient {
    api_url: String,
    token: String,
    debug: bool,
    debug_channel: String,
    email_aliases: BTreeMap<String, String>,
    http: reqwest::Client,
}

impl SlackClient {
    pub fn new(config: &SlackConfig) -> SourceResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("triage-sources/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(SlackClient {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.resolve_token()?,
            debug: config.debug,
            debug_channel: config.debug_channel.clone(),
            email_aliases: config.email_aliases.clone(),
            http,
        })
    }

    /// Chat address for a tracker address.
    pub fn chat_email<'a>(&'a self, email: &'a str) -> &'a str {
        self.email_aliases
            .get(email)
            .map(String::as_str)
            .unwrap_or(email)
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.api_url, method)
    }

    async fn send_once(&self, req: reqwest::RequestBuilder) -> SourceResult<Result<ApiReply, Duration>> {
        let resp = req.bearer_auth(&self.token).send().await?;
        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Ok(Err(retry_after(&resp)));
        }
        let reply: ApiReply = ensure_success(SERVICE, resp).await?.json().await?;
        Ok(Ok(reply))
    }

    /// Call `method`, honouring one rate-limit delay with a single retry.
    async fn call<F>(&self, method: &str, build: F) -> SourceResult<ApiReply>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        match self.send_once(build()).await? {
            Ok(reply) => reply.into_result(),
            Err(delay) => {
                warn!(method, delay_secs = delay.as_secs(), "slack rate limited, retrying once");
                tokio::time::sleep(delay).await;
                match self.send_once(build()).await? {
                    Ok(reply) => reply.into_result(),
                    Err(retry_after) => Err(SourceError::RateLimited { retry_after }),
                }
            }
        }
    }

    async fn post_message(&self, channel: &str, text: &str) -> SourceResult<()> {
        let url = self.url("chat.postMessage");
        let body = json!({ "channel": channel, "text": text });
        self.call("chat.postMessage", || self.http.post(&url).json(&body))
            .await?;
        debug!(channel, "posted slack message");
        Ok(())
    }
}

#[async_trait]
impl ChatNotifier for SlackClient {
    async fn message_channel(&self, channel: &str, text: &str) -> SourceResult<()> {
        if self.debug && channel != self.debug_channel {
            return self
                .message_debug(&format!("DEBUG sendto: {}: {}", channel, text))
                .await;
        }
        self.post_message(channel, text).await
    }

    async fn message_email(&self, email: &str, text: &str) -> SourceResult<()> {
        if self.debug {
            return self
                .message_debug(&format!("DEBUG: {:?} will receive:\n{}", email, text))
                .await;
        }

        let lookup = self.url("users.lookupByEmail");
        let address = self.chat_email(email);
        let user = self
            .call("users.lookupByEmail", || {
                self.http.get(&lookup).query(&[("email", address)])
            })
            .await?
            .user
            .ok_or_else(|| SourceError::Chat(format!("no user for {}", address)))?;

        let open = self.url("conversations.open");
        let body = json!({ "users": user.id });
        let channel = self
            .call("conversations.open", || self.http.post(&open).json(&body))
            .await?
            .channel
            .ok_or_else(|| SourceError::Chat(format!("no IM channel for {}", address)))?;

        self.post_message(&channel.id, text).await
    }

    async fn message_debug(&self, text: &str) -> SourceResult<()> {
        self.post_message(&self.debug_channel, text).await
    }
}
