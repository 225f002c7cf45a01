use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::{ChatId, SourceGroup};

/// Where a chat is in the `/group_parsing` dialogue.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Step {
    #[default]
    Idle,
    AwaitingGroup,
    AwaitingCount {
        group: SourceGroup,
    },
}

#[derive(Debug)]
struct Entry {
    step: Step,
    last_seen: Instant,
}

/// Per-chat dialogue state. Entries idle past the timeout are forgotten.
pub struct ConversationStore {
    idle_timeout: Duration,
    entries: Mutex<HashMap<ChatId, Entry>>,
}

impl ConversationStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Current step; an expired entry reads as `Idle` and is dropped.
    pub async fn step(&self, chat_id: ChatId) -> Step {
        let mut entries = self.entries.lock().await;
        if let Some(e) = entries.get_mut(&chat_id) {
            if e.last_seen.elapsed() < self.idle_timeout {
                e.last_seen = Instant::now();
                return e.step.clone();
            }
            entries.remove(&chat_id);
        }
        Step::Idle
    }

    pub async fn set_step(&self, chat_id: ChatId, step: Step) {
        let mut entries = self.entries.lock().await;
        if step == Step::Idle {
            entries.remove(&chat_id);
            return;
        }
        entries.insert(
            chat_id,
            Entry {
                step,
                last_seen: Instant::now(),
            },
        );
    }

    /// Returns whether a dialogue was in progress.
    pub async fn reset(&self, chat_id: ChatId) -> bool {
        self.entries.lock().await.remove(&chat_id).is_some()
    }

    /// Drop every idle entry; returns how many were removed.
    pub async fn evict_idle(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| e.last_seen.elapsed() < self.idle_timeout);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Periodic sweep so abandoned dialogues do not accumulate.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = self.evict_idle().await;
                        if evicted > 0 {
                            tracing::debug!(evicted, "evicted idle conversations");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn steps_are_tracked_per_chat() {
        let store = ConversationStore::new(Duration::from_secs(3600));
        store.set_step(ChatId(1), Step::AwaitingGroup).await;
        store
            .set_step(
                ChatId(2),
                Step::AwaitingCount {
                    group: SourceGroup::new("public1"),
                },
            )
            .await;

        assert_eq!(store.step(ChatId(1)).await, Step::AwaitingGroup);
        assert_eq!(
            store.step(ChatId(2)).await,
            Step::AwaitingCount {
                group: SourceGroup::new("public1")
            }
        );
        assert_eq!(store.step(ChatId(3)).await, Step::Idle);
    }

    #[tokio::test]
    async fn reset_and_idle_clear_entries() {
        let store = ConversationStore::new(Duration::from_secs(3600));
        store.set_step(ChatId(1), Step::AwaitingGroup).await;
        assert!(store.reset(ChatId(1)).await);
        assert!(!store.reset(ChatId(1)).await);

        store.set_step(ChatId(1), Step::AwaitingGroup).await;
        store.set_step(ChatId(1), Step::Idle).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn expired_entries_read_as_idle() {
        let store = ConversationStore::new(Duration::ZERO);
        store.set_step(ChatId(1), Step::AwaitingGroup).await;
        assert_eq!(store.step(ChatId(1)).await, Step::Idle);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn sweep_evicts_only_idle_entries() {
        let fresh = ConversationStore::new(Duration::from_secs(3600));
        fresh.set_step(ChatId(1), Step::AwaitingGroup).await;
        assert_eq!(fresh.evict_idle().await, 0);

        let stale = ConversationStore::new(Duration::ZERO);
        stale.set_step(ChatId(1), Step::AwaitingGroup).await;
        stale.set_step(ChatId(2), Step::AwaitingGroup).await;
        assert_eq!(stale.evict_idle().await, 2);
    }
}
