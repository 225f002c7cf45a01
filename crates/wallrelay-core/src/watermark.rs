//! Durable per-source-group "last published post id" cursor.

use std::{collections::BTreeMap, path::PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{domain::SourceGroup, storage::JsonFile, utils::iso_timestamp_utc, Result};

/// Key-value cursor store keyed by source group.
///
/// `last_published_id` returns 0 when a group has no record yet. Setting the same id twice
/// has no further effect, and the cursor never moves backwards.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn last_published_id(&self, group: &SourceGroup) -> Result<i64>;
    async fn set_last_published_id(&self, group: &SourceGroup, id: i64) -> Result<()>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkRecord {
    pub last_post_id: i64,
    #[serde(default)]
    pub updated_at: String,
}

type Records = BTreeMap<SourceGroup, WatermarkRecord>;

/// Watermarks persisted as one JSON document, rewritten atomically on every advance.
pub struct JsonWatermarkStore {
    file: JsonFile,
    records: Mutex<Records>,
}

impl JsonWatermarkStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let file = JsonFile::new(path);
        let records: Records = file.load().await?;
        tracing::info!(
            path = %file.path().display(),
            groups = records.len(),
            "watermark store opened"
        );
        Ok(Self {
            file,
            records: Mutex::new(records),
        })
    }

    /// Snapshot of every stored cursor.
    pub async fn snapshot(&self) -> Records {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl WatermarkStore for JsonWatermarkStore {
    async fn last_published_id(&self, group: &SourceGroup) -> Result<i64> {
        let records = self.records.lock().await;
        Ok(records.get(group).map(|r| r.last_post_id).unwrap_or(0))
    }

    async fn set_last_published_id(&self, group: &SourceGroup, id: i64) -> Result<()> {
        // Held across the write so concurrent advances for a group are serialized.
        let mut records = self.records.lock().await;
        let current = records.get(group).map(|r| r.last_post_id).unwrap_or(0);
        if id <= current {
            if id < current {
                tracing::warn!(%group, id, current, "ignoring watermark regression");
            }
            return Ok(());
        }

        let mut next = records.clone();
        next.insert(
            group.clone(),
            WatermarkRecord {
                last_post_id: id,
                updated_at: iso_timestamp_utc(),
            },
        );
        // Only adopt the new cursor once it is on disk.
        self.file.save(&next).await?;
        *records = next;
        Ok(())
    }
}

/// In-memory store with the same semantics; used by tests and dry runs.
#[derive(Default)]
pub struct MemoryWatermarkStore {
    records: Mutex<BTreeMap<SourceGroup, i64>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with(entries: &[(&str, i64)]) -> Self {
        let store = Self::new();
        {
            let mut records = store.records.lock().await;
            for (group, id) in entries {
                records.insert(SourceGroup::new(*group), *id);
            }
        }
        store
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn last_published_id(&self, group: &SourceGroup) -> Result<i64> {
        Ok(self.records.lock().await.get(group).copied().unwrap_or(0))
    }

    async fn set_last_published_id(&self, group: &SourceGroup, id: i64) -> Result<()> {
        let mut records = self.records.lock().await;
        let slot = records.entry(group.clone()).or_insert(0);
        if id > *slot {
            *slot = id;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_state(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        PathBuf::from(format!(
            "/tmp/{prefix}-{}-{ts}/watermarks.json",
            std::process::id()
        ))
    }

    #[tokio::test]
    async fn unknown_group_reads_zero() {
        let store = JsonWatermarkStore::open(tmp_state("wr-wm-zero")).await.unwrap();
        let g = SourceGroup::new("public1");
        assert_eq!(store.last_published_id(&g).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cursor_survives_reopen() {
        let path = tmp_state("wr-wm-reopen");
        let g = SourceGroup::new("club2");
        {
            let store = JsonWatermarkStore::open(&path).await.unwrap();
            store.set_last_published_id(&g, 5).await.unwrap();
            store.set_last_published_id(&g, 7).await.unwrap();
        }

        let reopened = JsonWatermarkStore::open(&path).await.unwrap();
        assert_eq!(reopened.last_published_id(&g).await.unwrap(), 7);
        let snap = reopened.snapshot().await;
        assert_eq!(snap.get(&g).map(|r| r.last_post_id), Some(7));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn cursor_never_moves_backwards() {
        let path = tmp_state("wr-wm-monotonic");
        let store = JsonWatermarkStore::open(&path).await.unwrap();
        let g = SourceGroup::new("public1");
        store.set_last_published_id(&g, 10).await.unwrap();
        store.set_last_published_id(&g, 10).await.unwrap();
        store.set_last_published_id(&g, 3).await.unwrap();
        assert_eq!(store.last_published_id(&g).await.unwrap(), 10);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn groups_are_independent() {
        let store = MemoryWatermarkStore::with(&[("a", 4)]).await;
        store
            .set_last_published_id(&SourceGroup::new("b"), 9)
            .await
            .unwrap();
        assert_eq!(
            store.last_published_id(&SourceGroup::new("a")).await.unwrap(),
            4
        );
        assert_eq!(
            store.last_published_id(&SourceGroup::new("b")).await.unwrap(),
            9
        );
    }
}
