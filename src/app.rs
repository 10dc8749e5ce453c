//! The dashboard: refresh orchestration, the current worklist view and the
//! reply confirmation workflow.
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use url::Url;

use crate::classify::{classify, status_of, summarize, RankingPolicy, Summary};
use crate::db::{StateStore, StoreError};
use crate::gateway::{Gateway, GatewayError, Links};
use crate::marks::{Confirmation, PendingReply, ReplyMarks, ReplyWorkflow, WorkflowError};
use crate::model::{ClassifiedArticle, EnrichedArticle, ReplyStatus, Settings, Snapshot};
use crate::sync::{list_commented_articles, reconcile, Pacing, ProgressSink, SyncContext, SyncError};

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("invalid urlname {0:?}: only letters, digits and underscores are allowed")]
    InvalidUrlname(String),
    #[error("comment {0} is not in the cached worklist")]
    UnknownComment(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

/// Result of one refresh request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Fresh data was fetched, stored and classified.
    Refreshed { articles: usize },
    /// The refresh failed; the last cached view stays on screen.
    KeptCache { error: String },
    /// The refresh failed and there is nothing cached to fall back to.
    Failed { message: String },
    NotConfigured,
    AlreadyRunning,
}

/// Link for a comment plus whether a reply confirmation is now pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedComment {
    pub url: Url,
    pub status: ReplyStatus,
    pub awaiting_confirmation: bool,
}

/// A refresh lock older than this is treated as left behind by a crashed run.
const REFRESH_LOCK_TTL_MINUTES: i64 = 10;

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Dashboard {
    gateway: Arc<dyn Gateway>,
    store: StateStore,
    marks: ReplyMarks,
    links: Links,
    policy: RankingPolicy,
    pacing: Pacing,
    refreshing: AtomicBool,
    view: Mutex<Vec<ClassifiedArticle>>,
    workflow: Mutex<ReplyWorkflow>,
}

impl Dashboard {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        store: StateStore,
        links: Links,
        policy: RankingPolicy,
        pacing: Pacing,
    ) -> Self {
        Self {
            gateway,
            marks: ReplyMarks::new(store.clone()),
            store,
            links,
            policy,
            pacing,
            refreshing: AtomicBool::new(false),
            view: Mutex::new(Vec::new()),
            workflow: Mutex::new(ReplyWorkflow::default()),
        }
    }

    pub fn marks(&self) -> &ReplyMarks {
        &self.marks
    }

    pub async fn settings(&self) -> Settings {
        self.store.settings().await
    }

    /// Persist new settings. A changed urlname clears the on-screen view since
    /// the cached snapshot belongs to the previous creator.
    pub async fn update_settings(
        &self,
        urlname: Option<&str>,
        range_days: Option<u32>,
    ) -> Result<Settings, DashboardError> {
        let current = self.store.settings().await;
        if let Some(urlname) = urlname {
            let urlname = urlname.trim();
            if !Settings::valid_urlname(urlname) {
                return Err(DashboardError::InvalidUrlname(urlname.to_string()));
            }
            if urlname != current.urlname {
                self.store.save_urlname(urlname).await?;
                self.view.lock().await.clear();
            }
        }
        if let Some(days) = range_days {
            self.store.save_range_days(days).await?;
        }
        Ok(self.store.settings().await)
    }

    /// Current worklist as last rendered.
    pub async fn view(&self) -> Vec<ClassifiedArticle> {
        self.view.lock().await.clone()
    }

    pub async fn summary(&self) -> Summary {
        summarize(&self.view.lock().await)
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    async fn classify_cached(&self, urlname: &str, articles: &[EnrichedArticle]) -> Vec<ClassifiedArticle> {
        let manual = self.marks.current().await;
        classify(articles, &manual, urlname, self.policy)
    }

    /// Re-classify the cached snapshot without touching the network.
    pub async fn rerender(&self) -> Vec<ClassifiedArticle> {
        let settings = self.store.settings().await;
        let worklist = match self.store.snapshot_for(&settings.urlname).await {
            Some(snapshot) if settings.is_configured() => {
                self.classify_cached(&settings.urlname, &snapshot.articles).await
            }
            _ => Vec::new(),
        };
        *self.view.lock().await = worklist.clone();
        worklist
    }

    /// List, reconcile against the cache, persist and classify.
    ///
    /// A second call while one is running, in this process or in another one
    /// sharing the database, returns [`RefreshOutcome::AlreadyRunning`]
    /// immediately. When nothing is on screen yet a non-empty cached snapshot
    /// is classified and shown first.
    #[instrument(skip_all)]
    pub async fn refresh(&self, progress: &ProgressSink) -> RefreshOutcome {
        let settings = self.store.settings().await;
        if !settings.is_configured() {
            return RefreshOutcome::NotConfigured;
        }
        let Some(_guard) = InFlight::acquire(&self.refreshing) else {
            info!("refresh already in flight; ignoring");
            return RefreshOutcome::AlreadyRunning;
        };
        let locked = match self
            .store
            .acquire_refresh_lock(Utc::now(), ChronoDuration::minutes(REFRESH_LOCK_TTL_MINUTES))
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                info!("another process is refreshing; ignoring");
                return RefreshOutcome::AlreadyRunning;
            }
            Err(err) => {
                warn!(?err, "refresh lock unavailable; continuing without it");
                false
            }
        };

        let outcome = self.run_refresh(&settings, progress).await;

        if locked {
            if let Err(err) = self.store.release_refresh_lock().await {
                warn!(?err, "failed to release refresh lock");
            }
        }
        outcome
    }

    async fn run_refresh(&self, settings: &Settings, progress: &ProgressSink) -> RefreshOutcome {
        let urlname = settings.urlname.as_str();
        let cached = self
            .store
            .snapshot_for(urlname)
            .await
            .filter(|s| !s.articles.is_empty());
        if let Some(snapshot) = &cached {
            if self.view.lock().await.is_empty() {
                let worklist = self.classify_cached(urlname, &snapshot.articles).await;
                *self.view.lock().await = worklist;
            }
        }

        let ctx = SyncContext::new(self.gateway.as_ref(), self.pacing, progress);
        let cached_articles = cached.as_ref().map(|s| s.articles.as_slice());
        let articles = match self.sync(ctx, settings, cached_articles).await {
            Ok(articles) => articles,
            Err(err) => {
                let message = err.to_string();
                return if cached.is_some() {
                    warn!(error = %message, "refresh failed; keeping cached view");
                    RefreshOutcome::KeptCache { error: message }
                } else {
                    warn!(error = %message, "refresh failed with nothing cached");
                    RefreshOutcome::Failed { message }
                };
            }
        };

        let snapshot = Snapshot {
            urlname: urlname.to_string(),
            updated_at: Utc::now(),
            articles,
        };
        if let Err(err) = self.store.save_snapshot(&snapshot).await {
            warn!(?err, "failed to persist snapshot");
        }
        let worklist = self.classify_cached(urlname, &snapshot.articles).await;
        info!(
            articles = snapshot.articles.len(),
            shown = worklist.len(),
            "refresh complete"
        );
        *self.view.lock().await = worklist;
        RefreshOutcome::Refreshed {
            articles: snapshot.articles.len(),
        }
    }

    async fn sync(
        &self,
        ctx: SyncContext<'_>,
        settings: &Settings,
        cached: Option<&[EnrichedArticle]>,
    ) -> Result<Vec<EnrichedArticle>, SyncError> {
        let fresh =
            list_commented_articles(ctx, &settings.urlname, settings.range_days, Utc::now()).await?;
        reconcile(ctx, fresh, cached).await
    }

    /// Resolve a comment from the cached snapshot into its redirect link.
    /// Comments that still need a reply also start the confirmation workflow.
    pub async fn open_comment(&self, comment_key: &str) -> Result<OpenedComment, DashboardError> {
        let settings = self.store.settings().await;
        let snapshot = self
            .store
            .snapshot_for(&settings.urlname)
            .await
            .ok_or_else(|| DashboardError::UnknownComment(comment_key.to_string()))?;
        let (article, comment) = snapshot
            .articles
            .iter()
            .find_map(|a| {
                a.comments
                    .iter()
                    .find(|c| c.key == comment_key)
                    .map(|c| (&a.article, c))
            })
            .ok_or_else(|| DashboardError::UnknownComment(comment_key.to_string()))?;

        let target = self.links.comment_url(article, &comment.key)?;
        let url = self.links.redirect_url(&target)?;
        let manual = self.marks.current().await;
        let status = status_of(comment, &manual);

        let awaiting_confirmation = status != ReplyStatus::Replied;
        if awaiting_confirmation {
            let pending = PendingReply {
                comment_key: comment.key.clone(),
                article_key: article.key.clone(),
                comment_body: comment.body.text(),
            };
            self.workflow.lock().await.begin(&self.store, &pending).await?;
        }
        Ok(OpenedComment {
            url,
            status,
            awaiting_confirmation,
        })
    }

    /// Called when the dashboard regains focus. Returns the comment awaiting
    /// confirmation, if any.
    pub async fn on_activate(&self) -> Option<PendingReply> {
        self.workflow.lock().await.activate(&self.store).await.cloned()
    }

    /// Answer the pending "did you reply?" question. Marking re-classifies the
    /// cached snapshot right away.
    pub async fn confirm_reply(&self, replied: bool) -> Result<Confirmation, DashboardError> {
        let confirmation = self
            .workflow
            .lock()
            .await
            .confirm(&self.store, &self.marks, replied)
            .await?;
        if matches!(confirmation, Confirmation::Marked { .. }) {
            self.rerender().await;
        }
        Ok(confirmation)
    }
}
