//! Configuration loader and validator for the comment triage dashboard.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::classify::{ArticleOrder, RankingPolicy, UnrepliedMetric};
use crate::sync::Pacing;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub relay: Relay,
    #[serde(default)]
    pub sync: Throttle,
    #[serde(default)]
    pub ranking: Ranking,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Relay endpoint and the upstream origin it forwards to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Relay {
    pub url: String,
    pub upstream_origin: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Courtesy delays between sequential upstream calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Throttle {
    #[serde(default = "default_article_page_delay_ms")]
    pub article_page_delay_ms: u64,
    #[serde(default = "default_comment_delay_ms")]
    pub comment_delay_ms: u64,
}

/// How the worklist is ranked.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ranking {
    #[serde(default)]
    pub order: ArticleOrder,
    #[serde(default)]
    pub metric: UnrepliedMetric,
}

impl Default for Throttle {
    fn default() -> Self {
        Self {
            article_page_delay_ms: default_article_page_delay_ms(),
            comment_delay_ms: default_comment_delay_ms(),
        }
    }
}

fn default_user_agent() -> String {
    "comment-triage/0.1".to_string()
}

fn default_article_page_delay_ms() -> u64 {
    500
}

fn default_comment_delay_ms() -> u64 {
    300
}

impl App {
    /// `data_dir` with a leading `~/` expanded to `$HOME`.
    pub fn resolved_data_dir(&self) -> String {
        if let Some(rest) = self.data_dir.strip_prefix("~/") {
            if let Ok(home) = std::env::var("HOME") {
                return format!("{}/{}", home.trim_end_matches('/'), rest);
            }
        }
        self.data_dir.clone()
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.app.resolved_data_dir())
    }

    pub fn pacing(&self) -> Pacing {
        Pacing {
            article_page_delay: Duration::from_millis(self.sync.article_page_delay_ms),
            comment_delay: Duration::from_millis(self.sync.comment_delay_ms),
        }
    }

    pub fn ranking_policy(&self) -> RankingPolicy {
        RankingPolicy {
            order: self.ranking.order,
            metric: self.ranking.metric,
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    match Url::parse(&cfg.relay.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => return Err(ConfigError::Invalid("relay.url must be an http(s) URL")),
    }
    match Url::parse(&cfg.relay.upstream_origin) {
        Ok(url) if url.scheme() == "https" && url.host_str().is_some() => {}
        _ => {
            return Err(ConfigError::Invalid(
                "relay.upstream_origin must be an https URL",
            ))
        }
    }
    if cfg.relay.user_agent.trim().is_empty() {
        return Err(ConfigError::Invalid("relay.user_agent must be non-empty"));
    }

    Ok(())
}

/// Returns the example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

relay:
  url: "https://relay.example.workers.dev/"
  upstream_origin: "https://note.com"
  user_agent: "comment-triage/0.1"

sync:
  article_page_delay_ms: 500
  comment_delay_ms: 300

ranking:
  order: published_at
  metric: needs_attention
"#
}
