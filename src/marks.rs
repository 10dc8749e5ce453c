//! User-confirmed reply marks and the "did you reply?" workflow.
//!
//! Opening a comment on the upstream site persists a [`PendingReply`] token.
//! When the dashboard is activated again the token moves the workflow to
//! awaiting confirmation; it is removed from storage once the user confirms or
//! dismisses. Confirmed keys are added to the [`ManualReplySet`], which only
//! ever grows.
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{StateStore, StoreError};

/// Append-only, deduplicated set of comment keys the user marked as replied.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ManualReplySet {
    keys: Vec<String>,
    index: HashSet<String>,
}

impl From<Vec<String>> for ManualReplySet {
    fn from(keys: Vec<String>) -> Self {
        let mut set = ManualReplySet::default();
        for key in keys {
            set.insert(&key);
        }
        set
    }
}

impl From<ManualReplySet> for Vec<String> {
    fn from(set: ManualReplySet) -> Self {
        set.keys
    }
}

impl ManualReplySet {
    /// Returns `false` when the key was already present.
    pub fn insert(&mut self, key: &str) -> bool {
        if !self.index.insert(key.to_string()) {
            return false;
        }
        self.keys.push(key.to_string());
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys in the order they were first marked.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

/// Sole writer of the persisted [`ManualReplySet`].
#[derive(Clone)]
pub struct ReplyMarks {
    store: StateStore,
}

impl ReplyMarks {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub async fn current(&self) -> ManualReplySet {
        self.store.manual_replied().await
    }

    /// Idempotent. Returns `true` when the key was newly marked. A failed read
    /// aborts instead of writing back a set that lost earlier marks.
    pub async fn mark_replied(&self, comment_key: &str) -> Result<bool, StoreError> {
        let mut set = self.store.try_manual_replied().await?;
        if !set.insert(comment_key) {
            return Ok(false);
        }
        self.store.save_manual_replied(&set).await?;
        info!(comment_key, total = set.len(), "marked comment as replied");
        Ok(true)
    }

    pub async fn is_replied(&self, comment_key: &str) -> bool {
        self.store.manual_replied().await.contains(comment_key)
    }
}

/// Token persisted before the user leaves for the upstream comment thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingReply {
    pub comment_key: String,
    pub article_key: String,
    pub comment_body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WorkflowState {
    #[default]
    Idle,
    AwaitingConfirmation(PendingReply),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Marked { comment_key: String, newly: bool },
    Dismissed { comment_key: String },
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("no reply is awaiting confirmation")]
    NothingPending,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// `Idle -> AwaitingConfirmation -> Idle`.
#[derive(Debug, Default)]
pub struct ReplyWorkflow {
    state: WorkflowState,
}

impl ReplyWorkflow {
    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Persist the token before navigating away. The in-process state is
    /// untouched; the token is picked up by [`ReplyWorkflow::activate`].
    pub async fn begin(&self, store: &StateStore, pending: &PendingReply) -> Result<(), StoreError> {
        store.save_pending_reply(pending).await
    }

    /// Pick up a persisted token on activation. The token stays stored until
    /// the question is answered. Without a token the current state is kept.
    pub async fn activate(&mut self, store: &StateStore) -> Option<&PendingReply> {
        if let Some(pending) = store.pending_reply().await {
            self.state = WorkflowState::AwaitingConfirmation(pending);
        }
        match &self.state {
            WorkflowState::AwaitingConfirmation(pending) => Some(pending),
            WorkflowState::Idle => None,
        }
    }

    /// Resolve the pending confirmation and return to idle. The stored token
    /// is cleared only once the answer has been recorded.
    pub async fn confirm(
        &mut self,
        store: &StateStore,
        marks: &ReplyMarks,
        replied: bool,
    ) -> Result<Confirmation, WorkflowError> {
        let pending = match std::mem::take(&mut self.state) {
            WorkflowState::AwaitingConfirmation(pending) => pending,
            WorkflowState::Idle => return Err(WorkflowError::NothingPending),
        };
        let confirmation = if replied {
            match marks.mark_replied(&pending.comment_key).await {
                Ok(newly) => Confirmation::Marked {
                    comment_key: pending.comment_key.clone(),
                    newly,
                },
                Err(err) => {
                    self.state = WorkflowState::AwaitingConfirmation(pending);
                    return Err(err.into());
                }
            }
        } else {
            Confirmation::Dismissed {
                comment_key: pending.comment_key.clone(),
            }
        };
        if store.pending_reply().await.as_ref() == Some(&pending) {
            if let Err(err) = store.clear_pending_reply().await {
                warn!(?err, "failed to clear pending reply token");
            }
        }
        Ok(confirmation)
    }
}
