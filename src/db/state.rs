use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use super::{KvStore, StoreError};
use crate::marks::{ManualReplySet, PendingReply};
use crate::model::{Settings, Snapshot};

const URLNAME_KEY: &str = "settings.urlname";
const RANGE_DAYS_KEY: &str = "settings.range_days";
const MANUAL_REPLIED_KEY: &str = "marks.manual_replied";
const SNAPSHOT_KEY: &str = "cache.snapshot";
const PENDING_REPLY_KEY: &str = "workflow.pending_reply";
const REFRESH_LOCK_KEY: &str = "sync.refresh_lock";

/// Typed view over the four independent dashboard records plus the pending
/// reply token and the cross-process refresh lock. Each record is read on its
/// own; one corrupt record never affects the others.
#[derive(Clone)]
pub struct StateStore {
    kv: Arc<dyn KvStore>,
}

impl StateStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Storage errors are returned; an undecodable record reads as absent.
    async fn try_read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.kv.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(?err, key, "corrupt record; treating as absent");
                Ok(None)
            }
        }
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_read(key).await {
            Ok(value) => value,
            Err(err) => {
                warn!(?err, key, "failed to read record; treating as absent");
                None
            }
        }
    }

    async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.kv.set(key, &raw).await
    }

    pub async fn settings(&self) -> Settings {
        Settings {
            urlname: self.read::<String>(URLNAME_KEY).await.unwrap_or_default(),
            range_days: self.read::<u32>(RANGE_DAYS_KEY).await.unwrap_or(0),
        }
    }

    pub async fn save_urlname(&self, urlname: &str) -> Result<(), StoreError> {
        self.write(URLNAME_KEY, urlname).await
    }

    pub async fn save_range_days(&self, days: u32) -> Result<(), StoreError> {
        self.write(RANGE_DAYS_KEY, &days).await
    }

    /// Cached snapshot, but only when it belongs to `urlname`.
    pub async fn snapshot_for(&self, urlname: &str) -> Option<Snapshot> {
        self.read::<Snapshot>(SNAPSHOT_KEY)
            .await
            .filter(|s| s.urlname == urlname)
    }

    /// Replaces any previously stored snapshot.
    pub async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.write(SNAPSHOT_KEY, snapshot).await
    }

    pub(crate) async fn manual_replied(&self) -> ManualReplySet {
        self.read(MANUAL_REPLIED_KEY).await.unwrap_or_default()
    }

    /// Like `manual_replied`, but a storage failure is an error rather than
    /// an empty set. Used before writing the set back.
    pub(crate) async fn try_manual_replied(&self) -> Result<ManualReplySet, StoreError> {
        Ok(self.try_read(MANUAL_REPLIED_KEY).await?.unwrap_or_default())
    }

    pub(crate) async fn save_manual_replied(&self, set: &ManualReplySet) -> Result<(), StoreError> {
        self.write(MANUAL_REPLIED_KEY, set).await
    }

    pub(crate) async fn pending_reply(&self) -> Option<PendingReply> {
        self.read(PENDING_REPLY_KEY).await
    }

    pub(crate) async fn save_pending_reply(&self, pending: &PendingReply) -> Result<(), StoreError> {
        self.write(PENDING_REPLY_KEY, pending).await
    }

    pub(crate) async fn clear_pending_reply(&self) -> Result<(), StoreError> {
        self.kv.remove(PENDING_REPLY_KEY).await
    }

    /// Take the refresh lock shared by every process on this database. A lock
    /// older than `ttl` is treated as abandoned and taken over.
    pub(crate) async fn acquire_refresh_lock(
        &self,
        now: DateTime<Utc>,
        ttl: ChronoDuration,
    ) -> Result<bool, StoreError> {
        let stamp = serde_json::to_string(&now)?;
        if self.kv.set_if_absent(REFRESH_LOCK_KEY, &stamp).await? {
            return Ok(true);
        }
        let Some(held) = self.kv.get(REFRESH_LOCK_KEY).await? else {
            return self.kv.set_if_absent(REFRESH_LOCK_KEY, &stamp).await;
        };
        let fresh = serde_json::from_str::<DateTime<Utc>>(&held)
            .map(|since| now.signed_duration_since(since) < ttl)
            .unwrap_or(false);
        if fresh {
            return Ok(false);
        }
        warn!(held = %held, "taking over abandoned refresh lock");
        self.kv.remove_if(REFRESH_LOCK_KEY, &held).await?;
        self.kv.set_if_absent(REFRESH_LOCK_KEY, &stamp).await
    }

    pub(crate) async fn release_refresh_lock(&self) -> Result<(), StoreError> {
        self.kv.remove(REFRESH_LOCK_KEY).await
    }
}
