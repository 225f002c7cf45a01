//! Periodic cross-posting pipeline.
//!
//! Every tick walks the configured source groups in order and, for each one:
//! fetch -> read watermark -> backfill -> order oldest-first -> filter -> publish -> advance.
//!
//! - Groups are isolated: any failure ends that group's iteration only and is reported as a
//!   [`GroupOutcome`].
//! - The watermark advances only after a confirmed publish, one post at a time.
//! - A busy flag keeps ticks single-flight (timer loop vs. manual `/crosspost`).

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    domain::{AccessToken, Post, SourceGroup},
    errors::Error,
    filter::{ContentFilter, FilterDecision},
    ports::{Publisher, SourceFetcher},
    watermark::WatermarkStore,
    Result,
};

#[derive(Clone, Debug)]
pub struct CrossPostSettings {
    pub groups: Vec<SourceGroup>,
    pub interval: Duration,
    /// Minimum spacing between two publishes of the same group.
    pub publish_delay: Duration,
    pub fetch_limit: u32,
    /// Extra pages fetched when the first window does not reach the watermark.
    pub max_backfill_pages: u32,
}

impl CrossPostSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            groups: cfg.source_groups.clone(),
            interval: cfg.poll_interval,
            publish_delay: cfg.publish_delay,
            fetch_limit: cfg.fetch_limit,
            max_backfill_pages: cfg.max_backfill_pages,
        }
    }
}

/// What happened to one group during one tick.
#[derive(Debug)]
pub enum GroupOutcome {
    /// The source returned no posts.
    Empty,
    Completed {
        published: usize,
        skipped: usize,
        watermark: i64,
    },
    FetchFailed {
        error: Error,
    },
    WatermarkReadFailed {
        error: Error,
    },
    /// Publishing `post_id` failed; later posts were not attempted.
    PublishFailed {
        post_id: i64,
        published: usize,
        error: Error,
    },
    /// `post_id` went out but its cursor could not be stored; it may be republished.
    WatermarkWriteFailed {
        post_id: i64,
        published: usize,
        error: Error,
    },
    Cancelled {
        published: usize,
        watermark: i64,
    },
}

impl GroupOutcome {
    pub fn published(&self) -> usize {
        match self {
            GroupOutcome::Completed { published, .. }
            | GroupOutcome::PublishFailed { published, .. }
            | GroupOutcome::WatermarkWriteFailed { published, .. }
            | GroupOutcome::Cancelled { published, .. } => *published,
            GroupOutcome::Empty
            | GroupOutcome::FetchFailed { .. }
            | GroupOutcome::WatermarkReadFailed { .. } => 0,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            GroupOutcome::FetchFailed { .. }
                | GroupOutcome::WatermarkReadFailed { .. }
                | GroupOutcome::PublishFailed { .. }
                | GroupOutcome::WatermarkWriteFailed { .. }
        )
    }
}

#[derive(Debug)]
pub struct GroupReport {
    pub group: SourceGroup,
    pub outcome: GroupOutcome,
}

#[derive(Debug, Default)]
pub struct TickReport {
    pub groups: Vec<GroupReport>,
}

impl TickReport {
    pub fn published(&self) -> usize {
        self.groups.iter().map(|g| g.outcome.published()).sum()
    }

    pub fn failures(&self) -> usize {
        self.groups.iter().filter(|g| g.outcome.is_failure()).count()
    }

    pub fn outcome(&self, group: &SourceGroup) -> Option<&GroupOutcome> {
        self.groups
            .iter()
            .find(|g| &g.group == group)
            .map(|g| &g.outcome)
    }

    pub fn summary(&self) -> String {
        format!(
            "groups={} published={} failed={}",
            self.groups.len(),
            self.published(),
            self.failures()
        )
    }
}

pub struct CrossPoster {
    fetcher: Arc<dyn SourceFetcher>,
    publisher: Arc<dyn Publisher>,
    store: Arc<dyn WatermarkStore>,
    filter: ContentFilter,
    credentials: AccessToken,
    settings: CrossPostSettings,
    busy: AtomicBool,
}

/// Clears the busy flag when a tick ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CrossPoster {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        publisher: Arc<dyn Publisher>,
        store: Arc<dyn WatermarkStore>,
        filter: ContentFilter,
        credentials: AccessToken,
        settings: CrossPostSettings,
    ) -> Self {
        Self {
            fetcher,
            publisher,
            store,
            filter,
            credentials,
            settings,
            busy: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Spawn the timer loop. The first tick fires one interval after start.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.settings.interval;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                interval_secs = period.as_secs(),
                groups = self.settings.groups.len(),
                "cross-post scheduler started"
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        // The tick itself watches `cancel`; it is never dropped mid-publish.
                        let _ = self.run_tick(&cancel).await;
                    }
                }
            }

            info!("cross-post scheduler stopped");
        })
    }

    /// Run one tick over every configured group.
    ///
    /// Returns `None` without doing anything if another tick is still running.
    pub async fn run_tick(&self, cancel: &CancellationToken) -> Option<TickReport> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("cross-post tick already in progress, skipping");
            return None;
        }
        let _guard = BusyGuard(&self.busy);

        info!(groups = self.settings.groups.len(), "cross-post tick started");
        let mut report = TickReport::default();

        for group in &self.settings.groups {
            if cancel.is_cancelled() {
                break;
            }
            let outcome = self.process_group(group, cancel).await;
            log_outcome(group, &outcome);
            report.groups.push(GroupReport {
                group: group.clone(),
                outcome,
            });
        }

        info!(summary = %report.summary(), "cross-post tick finished");
        Some(report)
    }

    async fn process_group(&self, group: &SourceGroup, cancel: &CancellationToken) -> GroupOutcome {
        let first = match self
            .fetcher
            .fetch_recent(&self.credentials, group, self.settings.fetch_limit)
            .await
        {
            Ok(v) => v,
            Err(error) => return GroupOutcome::FetchFailed { error },
        };
        if first.is_empty() {
            return GroupOutcome::Empty;
        }

        let last_saved = match self.store.last_published_id(group).await {
            Ok(v) => v,
            Err(error) => return GroupOutcome::WatermarkReadFailed { error },
        };

        let window = match self.backfill(group, first, last_saved).await {
            Ok(v) => v,
            Err(error) => return GroupOutcome::FetchFailed { error },
        };

        let mut watermark = last_saved;
        let mut published = 0usize;
        let mut skipped = 0usize;
        let mut last_publish: Option<Instant> = None;

        for post in chronological(window) {
            if post.id <= watermark {
                continue;
            }

            match self.filter.check(&post) {
                FilterDecision::Accept => {}
                FilterDecision::RejectEmpty => {
                    debug!(%group, post_id = post.id, "skipping post without text");
                    skipped += 1;
                    continue;
                }
                FilterDecision::RejectDenylisted { term } => {
                    info!(%group, post_id = post.id, %term, "skipping denylisted post");
                    skipped += 1;
                    continue;
                }
            }

            if let Some(prev) = last_publish {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return GroupOutcome::Cancelled { published, watermark };
                    }
                    _ = sleep_until(prev + self.settings.publish_delay) => {}
                }
            }
            if cancel.is_cancelled() {
                return GroupOutcome::Cancelled {
                    published,
                    watermark,
                };
            }

            match self
                .publisher
                .publish(post.text.trim(), &self.credentials)
                .await
            {
                Ok(remote) => {
                    info!(
                        %group,
                        post_id = post.id,
                        remote_post_id = remote.post_id,
                        "published post"
                    );
                }
                Err(error) => {
                    return GroupOutcome::PublishFailed {
                        post_id: post.id,
                        published,
                        error,
                    };
                }
            }
            last_publish = Some(Instant::now());
            published += 1;

            if let Err(error) = self.store.set_last_published_id(group, post.id).await {
                error!(
                    %group,
                    post_id = post.id,
                    %error,
                    "post published but watermark not advanced; it may be republished next tick"
                );
                return GroupOutcome::WatermarkWriteFailed {
                    post_id: post.id,
                    published,
                    error,
                };
            }
            watermark = post.id;
        }

        GroupOutcome::Completed {
            published,
            skipped,
            watermark,
        }
    }

    /// Page further back until the window reaches the stored watermark.
    ///
    /// Skipped on the first run for a group (watermark 0): only the latest window is considered.
    async fn backfill(
        &self,
        group: &SourceGroup,
        mut window: Vec<Post>,
        watermark: i64,
    ) -> Result<Vec<Post>> {
        if watermark <= 0 {
            return Ok(window);
        }

        let limit = self.settings.fetch_limit;
        let mut offset = window.len() as u32;
        let mut last_page_full = window.len() >= limit as usize;
        let mut pages = 0u32;

        while last_page_full && !reaches_watermark(&window, watermark) {
            if pages >= self.settings.max_backfill_pages {
                warn!(
                    %group,
                    watermark,
                    pages,
                    "backfill budget exhausted; older unseen posts will be skipped"
                );
                break;
            }

            let page = self
                .fetcher
                .fetch_page(&self.credentials, group, offset, limit)
                .await?;
            pages += 1;
            debug!(%group, offset, fetched = page.len(), "fetched backfill page");

            last_page_full = page.len() >= limit as usize;
            offset += page.len() as u32;
            window.extend(page);
        }

        Ok(window)
    }
}

/// Pinned posts lead the wall regardless of age, so they say nothing about the window's depth.
fn reaches_watermark(window: &[Post], watermark: i64) -> bool {
    window
        .iter()
        .filter(|p| !p.pinned)
        .any(|p| p.id <= watermark)
}

/// Oldest first, one entry per id.
///
/// Reversing the newest-first upstream order is not enough on its own: a pinned post
/// leads the wall regardless of age, and overlapping pages can repeat ids.
fn chronological(mut posts: Vec<Post>) -> Vec<Post> {
    posts.sort_by_key(|p| p.id);
    posts.dedup_by_key(|p| p.id);
    posts
}

fn log_outcome(group: &SourceGroup, outcome: &GroupOutcome) {
    match outcome {
        GroupOutcome::Empty => debug!(%group, "no posts returned"),
        GroupOutcome::Completed {
            published,
            skipped,
            watermark,
        } => info!(%group, published, skipped, watermark, "group processed"),
        GroupOutcome::FetchFailed { error } => {
            error!(%group, %error, "failed to fetch posts")
        }
        GroupOutcome::WatermarkReadFailed { error } => {
            error!(%group, %error, "failed to read watermark")
        }
        GroupOutcome::PublishFailed {
            post_id,
            published,
            error,
        } => error!(
            %group,
            post_id,
            published,
            %error,
            "publish failed; remaining posts deferred to next tick"
        ),
        // Logged at the failure site with its own message.
        GroupOutcome::WatermarkWriteFailed { .. } => {}
        GroupOutcome::Cancelled {
            published,
            watermark,
        } => warn!(%group, published, watermark, "group interrupted by shutdown"),
    }
}
