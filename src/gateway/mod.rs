use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::Config;
use crate::model::Article;

pub mod model;

/// Upstream path prefixes the relay forwards. Anything else is refused.
pub const ALLOWED_PATH_PREFIXES: [&str; 3] =
    ["/api/v2/creators/", "/api/v1/note_comments", "/api/v3/notes/"];

/// Comments are requested in fixed pages of this size.
pub const COMMENT_PAGE_SIZE: u32 = 10;

const FORBIDDEN_PATH_BODY: &str = "Forbidden path";

/// Characters left unescaped by `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("forbidden path: {0}")]
    ForbiddenPath(String),
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("invalid JSON from relay: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("redirect target outside the upstream site: {0}")]
    ForeignTarget(String),
}

impl GatewayError {
    /// HTTP status associated with the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::ForbiddenPath(_) => Some(StatusCode::FORBIDDEN.as_u16()),
            GatewayError::Status { status, .. } => Some(*status),
            GatewayError::Network(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Outbound access to the upstream platform. One call, no retry.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn fetch_json(&self, path: &str) -> Result<Value, GatewayError>;
}

pub fn is_allowed_path(path: &str) -> bool {
    ALLOWED_PATH_PREFIXES.iter().any(|p| path.starts_with(p))
}

pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}

pub fn creator_path(urlname: &str) -> String {
    format!("/api/v2/creators/{}", encode_component(urlname))
}

pub fn article_feed_path(urlname: &str, page: u32) -> String {
    format!(
        "/api/v2/creators/{}/contents?kind=note&page={}",
        encode_component(urlname),
        page
    )
}

pub fn comment_feed_path(article_key: &str, page: u32) -> String {
    format!(
        "/api/v3/notes/{}/note_comments?per_page={}&page={}",
        encode_component(article_key),
        COMMENT_PAGE_SIZE,
        page
    )
}

/// Browser-facing links: upstream comment URLs and the relay's redirect
/// document. Pure URL building, no network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Links {
    relay_url: Url,
    upstream_origin: Url,
}

impl Links {
    pub fn new(relay_url: Url, upstream_origin: Url) -> Self {
        Self {
            relay_url,
            upstream_origin,
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self, GatewayError> {
        Ok(Self::new(
            Url::parse(&cfg.relay.url)?,
            Url::parse(&cfg.relay.upstream_origin)?,
        ))
    }

    /// Canonical upstream URL of one comment in its article thread.
    pub fn comment_url(&self, article: &Article, comment_key: &str) -> Result<Url, GatewayError> {
        let mut url = self.upstream_origin.join(&format!(
            "/{}/n/{}",
            encode_component(&article.urlname),
            encode_component(&article.key)
        ))?;
        url.query_pairs_mut()
            .append_pair("scrollpos", "comment")
            .append_pair("c", comment_key);
        Ok(url)
    }

    /// Wrap an upstream URL in the relay's `?goto=` redirect document, which
    /// keeps mobile browsers from handing the link to the native app.
    pub fn redirect_url(&self, target: &Url) -> Result<Url, GatewayError> {
        let same_origin = target.scheme() == "https"
            && target.host_str() == self.upstream_origin.host_str()
            && target.port_or_known_default() == self.upstream_origin.port_or_known_default();
        if !same_origin {
            return Err(GatewayError::ForeignTarget(target.to_string()));
        }
        let mut url = self.relay_url.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("goto", target.as_str());
        Ok(url)
    }
}

/// HTTP client for the allow-listed relay in front of the upstream platform.
#[derive(Clone)]
pub struct RelayClient {
    http: Client,
    links: Links,
}

impl fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayClient")
            .field("links", &self.links)
            .finish_non_exhaustive()
    }
}

impl RelayClient {
    pub fn new(relay_url: Url, upstream_origin: Url, user_agent: &str) -> Result<Self, GatewayError> {
        let http = Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            http,
            links: Links::new(relay_url, upstream_origin),
        })
    }

    pub fn links(&self) -> &Links {
        &self.links
    }

    pub fn from_config(cfg: &Config) -> Result<Self, GatewayError> {
        Self::new(
            Url::parse(&cfg.relay.url)?,
            Url::parse(&cfg.relay.upstream_origin)?,
            &cfg.relay.user_agent,
        )
    }

    /// Build the relay request for an upstream `path`. Paths outside the
    /// allowlist never leave the process.
    pub fn build_request(&self, path: &str) -> Result<reqwest::Request, GatewayError> {
        if !is_allowed_path(path) {
            return Err(GatewayError::ForbiddenPath(path.to_string()));
        }
        let mut url = self.links.relay_url.clone();
        url.query_pairs_mut().clear().append_pair("path", path);
        Ok(self
            .http
            .get(url)
            .header("Accept", "application/json")
            .build()?)
    }

    async fn execute(&self, request: reqwest::Request, label: &str) -> Result<Value, GatewayError> {
        debug!(url = %request.url(), "relay request");
        let res = self.http.execute(request).await?;
        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            warn!(%status, %label, body = %body, "relay returned error");
            let reason = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned));
            if status == StatusCode::FORBIDDEN && reason.as_deref() == Some(FORBIDDEN_PATH_BODY) {
                return Err(GatewayError::ForbiddenPath(label.to_string()));
            }
            let message = match reason {
                Some(reason) => format!("API error: {} ({})", status.as_u16(), reason),
                None => format!("API error: {}", status.as_u16()),
            };
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// Creator profile through the legacy `?id=` passthrough.
    #[instrument(skip(self))]
    pub async fn lookup_creator_legacy(&self, creator_id: &str) -> Result<Value, GatewayError> {
        let mut url = self.links.relay_url.clone();
        url.query_pairs_mut().clear().append_pair("id", creator_id);
        let request = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .build()?;
        self.execute(request, creator_id).await
    }
}

#[async_trait]
impl Gateway for RelayClient {
    #[instrument(skip(self))]
    async fn fetch_json(&self, path: &str) -> Result<Value, GatewayError> {
        let request = self.build_request(path)?;
        self.execute(request, path).await
    }
}
