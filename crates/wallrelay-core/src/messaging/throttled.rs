use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{ChatAction, MessagingCapabilities, OutgoingDocument},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* Telegram API calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between calls per chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40),
            per_chat_min_interval: Duration::from_millis(1050),
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return how long to wait before using it.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = self.next.max(now);
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// MessagingPort decorator that spaces outbound calls to stay under Telegram flood limits.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<i64, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_chat(&self, chat_id: i64) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_chat.lock().await;
        map.entry(chat_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_chat_min_interval,
                )))
            })
            .clone()
    }

    /// Forget per-chat limiters whose last reserved slot ended more than `idle` ago.
    pub async fn prune_idle(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let mut map = self.per_chat.lock().await;
        let before = map.len();
        map.retain(|_, lim| {
            if Arc::strong_count(lim) > 1 {
                return true;
            }
            match lim.try_lock() {
                Ok(l) => l.next + idle > now,
                Err(_) => true,
            }
        });
        before - map.len()
    }

    pub fn spawn_pruner(
        self: Arc<Self>,
        idle: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + idle, idle);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let pruned = self.prune_idle(idle).await;
                        if pruned > 0 {
                            tracing::debug!(pruned, "pruned idle chat limiters");
                        }
                    }
                }
            }
        })
    }

    async fn throttle_chat(&self, chat_id: ChatId) {
        let global_wait = { self.global.lock().await.reserve() };
        let chat_wait = {
            let lim = self.limiter_for_chat(chat_id.0).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(chat_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.throttle_chat(chat_id).await;
        self.inner.send_html(chat_id, html).await
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.throttle_chat(chat_id).await;
        self.inner.send_text(chat_id, text).await
    }

    async fn send_document(&self, chat_id: ChatId, doc: OutgoingDocument) -> Result<MessageRef> {
        self.throttle_chat(chat_id).await;
        self.inner.send_document(chat_id, doc).await
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        self.throttle_chat(chat_id).await;
        self.inner.send_chat_action(chat_id, action).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageId;

    #[test]
    fn limiter_spaces_consecutive_reservations() {
        let mut lim = IntervalLimiter::new(Duration::from_millis(500));
        assert!(lim.reserve().is_zero());
        let second = lim.reserve();
        assert!(second > Duration::from_millis(400));
        assert!(second <= Duration::from_millis(500));
    }

    struct Recorder {
        sent: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl MessagingPort for Recorder {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                supports_html: true,
                supports_documents: true,
                max_message_len: 4096,
            }
        }

        async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
            self.send_text(chat_id, html).await
        }

        async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
            let mut sent = self.sent.lock().unwrap();
            sent.push(text.to_string());
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(sent.len() as i32),
            })
        }

        async fn send_document(
            &self,
            chat_id: ChatId,
            doc: OutgoingDocument,
        ) -> Result<MessageRef> {
            self.send_text(chat_id, &doc.file_name).await
        }

        async fn send_chat_action(&self, _chat_id: ChatId, _action: ChatAction) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn forwards_calls_in_order() {
        let inner = Arc::new(Recorder {
            sent: std::sync::Mutex::new(Vec::new()),
        });
        let throttled = ThrottledMessenger::new(
            inner.clone(),
            ThrottleConfig {
                global_min_interval: Duration::from_millis(1),
                per_chat_min_interval: Duration::from_millis(1),
            },
        );

        throttled.send_text(ChatId(1), "one").await.unwrap();
        throttled.send_html(ChatId(1), "<b>two</b>").await.unwrap();
        throttled
            .send_document(ChatId(2), OutgoingDocument::text("d.txt", "body"))
            .await
            .unwrap();

        assert_eq!(
            *inner.sent.lock().unwrap(),
            vec!["one", "<b>two</b>", "d.txt"]
        );
        assert!(throttled.capabilities().supports_documents);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_chat_limiters_are_pruned() {
        let inner = Arc::new(Recorder {
            sent: std::sync::Mutex::new(Vec::new()),
        });
        let throttled = ThrottledMessenger::new(inner, ThrottleConfig::default());

        throttled.send_text(ChatId(1), "one").await.unwrap();
        assert_eq!(throttled.prune_idle(Duration::from_secs(60)).await, 0);

        tokio::time::advance(Duration::from_secs(120)).await;
        throttled.send_text(ChatId(2), "two").await.unwrap();

        assert_eq!(throttled.prune_idle(Duration::from_secs(60)).await, 1);
        assert_eq!(throttled.per_chat.lock().await.len(), 1);
        assert!(throttled.per_chat.lock().await.contains_key(&2));
    }
}
