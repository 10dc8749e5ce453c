//! Incremental sync: article listing, comment pagination and cache reuse.
//!
//! Every upstream call made here is sequential. Courtesy delays between calls
//! come from [`Pacing`] and progress is reported through a [`ProgressSink`]
//! before each page or fetch starts.

use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::gateway::{Gateway, GatewayError};

pub mod articles;
pub mod comments;
pub mod reconcile;

pub use articles::list_commented_articles;
pub use comments::fetch_all_comments;
pub use reconcile::reconcile;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("unexpected response shape for {path}: {source}")]
    Shape {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl SyncError {
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Gateway(err) => err.status(),
            SyncError::Shape { .. } => None,
        }
    }
}

/// Pauses between sequential upstream calls. These are scheduling pauses,
/// not timeouts, and are skipped after the last call of a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub article_page_delay: Duration,
    pub comment_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            article_page_delay: Duration::from_millis(500),
            comment_delay: Duration::from_millis(300),
        }
    }
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            article_page_delay: Duration::ZERO,
            comment_delay: Duration::ZERO,
        }
    }
}

pub(crate) async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// About to request article page `page`; `collected` commented articles so far.
    ListingArticles { page: u32, collected: usize },
    /// About to fetch comments for the `index`-th of `total` stale articles.
    FetchingComments {
        index: usize,
        total: usize,
        title: String,
    },
}

/// Optional channel for progress events. Sends never block and a dropped
/// receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink(Option<UnboundedSender<ProgressEvent>>);

impl ProgressSink {
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self(Some(tx))
    }

    pub fn silent() -> Self {
        Self(None)
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.0 {
            let _ = tx.send(event);
        }
    }
}

/// Shared inputs of one sync run.
#[derive(Clone, Copy)]
pub struct SyncContext<'a> {
    pub gateway: &'a dyn Gateway,
    pub pacing: Pacing,
    pub progress: &'a ProgressSink,
}

impl<'a> SyncContext<'a> {
    pub fn new(gateway: &'a dyn Gateway, pacing: Pacing, progress: &'a ProgressSink) -> Self {
        Self {
            gateway,
            pacing,
            progress,
        }
    }

    /// Fetch `path` and decode it into `T`.
    pub(crate) async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        let value = self.gateway.fetch_json(path).await?;
        serde_json::from_value(value).map_err(|source| SyncError::Shape {
            path: path.to_string(),
            source,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_sink_delivers_in_order_and_tolerates_closed_receiver() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = ProgressSink::new(tx);
        sink.emit(ProgressEvent::ListingArticles {
            page: 1,
            collected: 0,
        });
        sink.emit(ProgressEvent::ListingArticles {
            page: 2,
            collected: 3,
        });
        assert_eq!(
            rx.try_recv().unwrap(),
            ProgressEvent::ListingArticles {
                page: 1,
                collected: 0
            }
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            ProgressEvent::ListingArticles { page: 2, .. }
        ));
        drop(rx);
        sink.emit(ProgressEvent::ListingArticles {
            page: 3,
            collected: 3,
        });
        ProgressSink::silent().emit(ProgressEvent::ListingArticles {
            page: 1,
            collected: 0,
        });
    }

    #[test]
    fn default_pacing_matches_courtesy_delays() {
        let pacing = Pacing::default();
        assert_eq!(pacing.article_page_delay, Duration::from_millis(500));
        assert_eq!(pacing.comment_delay, Duration::from_millis(300));
        assert!(Pacing::none().comment_delay.is_zero());
    }
}
