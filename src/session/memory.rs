//! In-process document collection with TTL expiry
//!
//! Stands in for a document database in the binary and in tests. Expiry is not
//! immediate: records older than the TTL are removed by [`MemoryCollection::purge_expired`],
//! either called directly or from the background monitor.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::document::{DocumentCollection, SessionRecord};
use super::model::MODIFIED_KEY;
use super::store::StoreError;

#[derive(Default)]
struct Inner {
    records: RwLock<HashMap<String, SessionRecord>>,
    ttl: RwLock<Option<Duration>>,
}

/// Shared handle to an in-memory session collection; clones see the same records
#[derive(Clone, Default)]
pub struct MemoryCollection {
    inner: Arc<Inner>,
}

impl MemoryCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.records.read().await.is_empty()
    }

    /// Field and max age of the TTL index, if one was requested
    pub async fn ttl_index(&self) -> Option<(String, Duration)> {
        self.inner
            .ttl
            .read()
            .await
            .map(|ttl| (MODIFIED_KEY.to_string(), ttl))
    }

    /// Remove records whose `modified` is older than the TTL; returns how many went
    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now()).await
    }

    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let Some(ttl) = *self.inner.ttl.read().await else {
            return 0;
        };
        let ttl_seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);

        let mut records = self.inner.records.write().await;
        let before = records.len();
        records.retain(|_, record| {
            now.signed_duration_since(record.modified).num_seconds() <= ttl_seconds
        });
        let purged = before - records.len();
        drop(records);

        if purged > 0 {
            debug!("Purged {purged} expired session records");
        }
        purged
    }

    /// Run [`MemoryCollection::purge_expired`] every `period` on the tokio runtime
    #[must_use]
    pub fn spawn_ttl_monitor(&self, period: Duration) -> JoinHandle<()> {
        let collection = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                collection.purge_expired().await;
            }
        })
    }
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    async fn find_by_id(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.inner.records.read().await.get(id).cloned())
    }

    async fn upsert_by_id(&self, record: SessionRecord) -> Result<(), StoreError> {
        self.inner
            .records
            .write()
            .await
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.records.write().await.remove(id).is_some())
    }

    async fn ensure_ttl_index(&self, field: &str, max_age: Duration) -> Result<(), StoreError> {
        if field != MODIFIED_KEY {
            return Err(StoreError::Backend(format!(
                "TTL index is only supported on '{MODIFIED_KEY}', not '{field}'"
            )));
        }
        *self.inner.ttl.write().await = Some(max_age);
        Ok(())
    }
}
