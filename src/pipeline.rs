//! One bounded publication pass: fetch → merge → select → per entry
//! (transform → publish → record) → done.
use anyhow::Result;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::channels::Channel;
use crate::config::Config;
use crate::db::{self, PendingEntry, Pool};
use crate::feeds::FeedSource;
use crate::ingest;
use crate::model::Content;
use crate::preview::PreviewSource;
use crate::publisher::{deliver, Publisher};
use crate::rewrite::{RewriteError, Rewriter};
use crate::selector::{Quota, Selector};
use crate::transform::transform;

/// Per-run limits. Defaults: 3 posts, 50 examined entries, 2 s between posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub max_posts: usize,
    pub max_candidates: i64,
    pub post_interval: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_posts: 3,
            max_candidates: 50,
            post_interval: Duration::from_secs(2),
        }
    }
}

impl RunSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_posts: cfg.app.max_posts,
            max_candidates: cfg.app.max_candidates,
            post_interval: Duration::from_millis(cfg.app.post_interval_ms),
        }
    }
}

/// What a run did, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub fetched: usize,
    pub inserted: usize,
    /// Pending entries the run started working on. Entries owed only to
    /// unconfigured channels are passed over and not counted.
    pub examined: usize,
    /// Entries that reached at least one channel.
    pub published: usize,
    pub rewrite_failures: usize,
    /// Entries rewritten but accepted by no channel.
    pub undelivered: usize,
}

pub struct Coordinator<'a> {
    pool: &'a Pool,
    settings: RunSettings,
    feeds: &'a dyn FeedSource,
    rewriter: &'a dyn Rewriter,
    preview: &'a dyn PreviewSource,
    publisher: Publisher<'a>,
}

impl<'a> Coordinator<'a> {
    pub fn new(
        pool: &'a Pool,
        settings: RunSettings,
        feeds: &'a dyn FeedSource,
        rewriter: &'a dyn Rewriter,
        preview: &'a dyn PreviewSource,
        channels: Vec<&'a dyn Channel>,
    ) -> Self {
        Self {
            pool,
            settings,
            feeds,
            rewriter,
            preview,
            publisher: Publisher::new(channels),
        }
    }

    /// Run the whole pass once. Only store failures abort it; collaborator
    /// failures stay with the entry or channel they happened in.
    #[instrument(skip_all)]
    pub async fn run_once(&self) -> Result<RunReport> {
        let mut report = RunReport::default();

        info!("fetching feeds");
        let batch = self.feeds.fetch_candidates().await;
        report.fetched = batch.len();

        info!(candidates = batch.len(), "merging");
        let stats = ingest::merge_candidates(self.pool, &batch).await?;
        report.inserted = stats.inserted;

        let pending = Selector::new(self.settings.max_candidates)
            .pending(self.pool)
            .await?;
        info!(pending = pending.len(), quota = self.settings.max_posts, "selected");

        let summaries: HashMap<&str, &str> = batch
            .iter()
            .map(|c| (c.url.trim(), c.summary.as_str()))
            .collect();

        let mut quota = Quota::new(self.settings.max_posts);
        for entry in &pending {
            if quota.is_exhausted() {
                break;
            }
            let targets = self.publisher.targets(&entry.pending_channels());
            if targets.is_empty() {
                debug!(url = %entry.url, "no configured channel owes this entry; skipping");
                continue;
            }
            report.examined += 1;
            let summary = summaries.get(entry.url.as_str()).copied().unwrap_or("");

            let content = match transform(
                self.rewriter,
                self.preview,
                &entry.title,
                summary,
                &entry.url,
            )
            .await
            {
                Ok(content) => content,
                Err(RewriteError::MissingCredential) => {
                    report.rewrite_failures += 1;
                    warn!("rewrite credentials are missing; no entries can be published this run");
                    break;
                }
                Err(err) => {
                    report.rewrite_failures += 1;
                    warn!(url = %entry.url, %err, "rewrite failed; entry stays pending");
                    continue;
                }
            };

            if self.publish_entry(entry, &targets, &content).await? {
                quota.consume();
                report.published += 1;
                if !quota.is_exhausted() && !self.settings.post_interval.is_zero() {
                    tokio::time::sleep(self.settings.post_interval).await;
                }
            } else {
                report.undelivered += 1;
                warn!(url = %entry.url, "no channel accepted the entry; stays pending");
            }
        }

        info!(
            examined = report.examined,
            published = report.published,
            rewrite_failures = report.rewrite_failures,
            undelivered = report.undelivered,
            "run done"
        );
        Ok(report)
    }

    /// Deliver to each target in turn, recording a confirmed delivery before
    /// the next channel is attempted. Returns whether any channel accepted it.
    async fn publish_entry(
        &self,
        entry: &PendingEntry,
        targets: &[&dyn Channel],
        content: &Content,
    ) -> Result<bool> {
        let mut delivered = false;
        for channel in targets {
            let kind = channel.kind();
            let outcome = deliver(*channel, content).await;
            if !outcome.is_delivered() {
                continue;
            }
            db::mark_delivered(self.pool, &entry.id, kind).await?;
            info!(url = %entry.url, channel = %kind, ?outcome, "delivered");
            delivered = true;
        }
        Ok(delivered)
    }
}
