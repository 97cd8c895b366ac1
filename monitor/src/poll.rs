//! Watermark-based poll loop for one stream (posts or comments).
//!
//! Every tick fetches the newest items, drops everything at or below the
//! watermark, evaluates the rest in fetch order and then raises the
//! watermark to the tick's fetch-start time. Ticks are spawned
//! independently, so two ticks of the same stream can overlap; the ledger's
//! `mark_seen` keeps that safe.

use crate::ledger::Ledger;
use crate::matcher::{find_special_pattern, KeywordMatcher};
use crate::policy::{Decision, ResponsePolicy};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use turtlebot_core::{now_epoch, ContentSource, CoreError, ErrorExt, Item, ItemKind, MonitorSettings};

const REMOVAL_MARKERS: [&str; 2] = ["[removed]", "[deleted]"];

/// What happened to one item during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    NoMatch,
    AlreadySeen,
    Replied,
    Upvoted,
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub fetched: usize,
    pub below_watermark: usize,
    pub filtered: usize,
    pub no_match: usize,
    pub already_seen: usize,
    pub replied: usize,
    pub upvoted: usize,
    pub ignored: usize,
    pub failed: usize,
}

impl TickReport {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::NoMatch => self.no_match += 1,
            Outcome::AlreadySeen => self.already_seen += 1,
            Outcome::Replied => self.replied += 1,
            Outcome::Upvoted => self.upvoted += 1,
            Outcome::Ignored => self.ignored += 1,
        }
    }

    pub fn evaluated(&self) -> usize {
        self.no_match + self.already_seen + self.replied + self.upvoted + self.ignored + self.failed
    }
}

pub struct PollLoop {
    kind: ItemKind,
    source: Arc<dyn ContentSource>,
    ledger: Arc<Ledger>,
    matcher: KeywordMatcher,
    policy: ResponsePolicy,
    subreddits: Vec<String>,
    limit: u32,
    bot_username: String,
    ignored_authors: Vec<String>,
    special_reply: String,
    watermark: AtomicI64,
}

impl PollLoop {
    pub fn new(
        kind: ItemKind,
        source: Arc<dyn ContentSource>,
        ledger: Arc<Ledger>,
        settings: &MonitorSettings,
        bot_username: &str,
    ) -> Self {
        let limit = match kind {
            ItemKind::Post => settings.post_limit,
            ItemKind::Comment => settings.comment_limit,
        };

        Self {
            kind,
            source,
            ledger,
            matcher: KeywordMatcher::new(&settings.keywords),
            policy: ResponsePolicy::from_settings(settings),
            subreddits: settings.subreddits.clone(),
            limit,
            bot_username: bot_username.to_string(),
            ignored_authors: settings.ignored_authors.clone(),
            special_reply: settings.special_reply.clone(),
            watermark: AtomicI64::new(now_epoch()),
        }
    }

    /// Starts from `watermark` instead of the current time.
    pub fn with_watermark(self, watermark: i64) -> Self {
        self.watermark.store(watermark, Ordering::SeqCst);
        self
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn watermark(&self) -> i64 {
        self.watermark.load(Ordering::SeqCst)
    }

    pub async fn tick(&self) -> Result<TickReport, CoreError> {
        self.tick_at(now_epoch()).await
    }

    /// One fetch-filter-evaluate-advance pass; `fetch_started` becomes the
    /// new watermark once the whole batch has been evaluated.
    pub async fn tick_at(&self, fetch_started: i64) -> Result<TickReport, CoreError> {
        let watermark = self.watermark();
        let items = self
            .source
            .fetch_recent(&self.subreddits, self.kind, self.limit)
            .await?;

        let mut report = TickReport {
            fetched: items.len(),
            ..Default::default()
        };

        for item in items {
            if item.created_utc <= watermark {
                report.below_watermark += 1;
                continue;
            }
            if let Some(reason) = self.ignore_reason(&item) {
                debug!("Skipping {} ({})", item.fullname(), reason);
                report.filtered += 1;
                continue;
            }

            match AssertUnwindSafe(self.evaluate(&item)).catch_unwind().await {
                Ok(Ok(outcome)) => report.record(outcome),
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!("Failed to handle {} {}: {}", self.kind, item.fullname(), e);
                    e.log_warn();
                }
                Err(_) => {
                    report.failed += 1;
                    error!("Panic while evaluating {} {}", self.kind, item.fullname());
                }
            }
        }

        let previous = self.watermark.fetch_max(fetch_started, Ordering::SeqCst);
        debug!(
            "{} tick done: {:?}, watermark {} -> {}",
            self.kind,
            report,
            previous,
            previous.max(fetch_started)
        );
        Ok(report)
    }

    fn ignore_reason(&self, item: &Item) -> Option<&'static str> {
        if item.author.eq_ignore_ascii_case(&self.bot_username) {
            return Some("own item");
        }
        if self
            .ignored_authors
            .iter()
            .any(|author| item.author.eq_ignore_ascii_case(author))
        {
            return Some("ignored author");
        }
        if REMOVAL_MARKERS.contains(&item.author.as_str()) {
            return Some("deleted author");
        }
        let removed = [item.title.as_deref(), item.body.as_deref()]
            .into_iter()
            .flatten()
            .any(|text| REMOVAL_MARKERS.iter().any(|marker| text.contains(marker)));
        if removed {
            return Some("removed or deleted");
        }
        None
    }

    async fn evaluate(&self, item: &Item) -> Result<Outcome, CoreError> {
        if find_special_pattern(&item.normalized_text()) {
            if !self.ledger.mark_seen(item.kind, &item.id).await {
                return Ok(Outcome::AlreadySeen);
            }
            info!(
                "Special pattern in {} by u/{}, replying",
                item.fullname(),
                item.author
            );
            let result = self.source.reply(item, &self.special_reply).await;
            self.ledger.persist().await;
            return result.map(|_| Outcome::Replied);
        }

        let matches = self
            .matcher
            .find_matches(item.title.as_deref(), item.body.as_deref());
        if matches.is_empty() {
            return Ok(Outcome::NoMatch);
        }
        if !self.ledger.mark_seen(item.kind, &item.id).await {
            return Ok(Outcome::AlreadySeen);
        }

        let result = match self.policy.decide_random(&matches, &item.author, item.kind) {
            Decision::Reply(text) => {
                info!(
                    "Replying to {} by u/{} (matched {:?})",
                    item.fullname(),
                    item.author,
                    matches
                );
                self.source.reply(item, &text).await.map(|_| Outcome::Replied)
            }
            Decision::Upvote => {
                info!("Upvoting {} (matched {:?})", item.fullname(), matches);
                self.source.upvote(item).await.map(|_| Outcome::Upvoted)
            }
            Decision::Ignore => {
                debug!("Staying quiet on {} (matched {:?})", item.fullname(), matches);
                Ok(Outcome::Ignored)
            }
        };
        self.ledger.persist().await;
        result
    }

    /// Spawns a tick every `interval` until `shutdown` flips, then waits for
    /// ticks still in flight.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight = JoinSet::new();

        info!(
            "Watching {}s in r/{} every {:?}",
            self.kind,
            self.subreddits.join("+"),
            interval
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let this = self.clone();
                    in_flight.spawn(async move { this.run_tick().await });
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                _ = shutdown.changed() => break,
            }
        }

        while in_flight.join_next().await.is_some() {}
        info!("Stopped watching {}s", self.kind);
    }

    async fn run_tick(&self) {
        match self.tick().await {
            Ok(report) if report.replied + report.upvoted > 0 => {
                info!(
                    "{} tick: {} replies, {} upvotes out of {} fetched",
                    self.kind, report.replied, report.upvoted, report.fetched
                );
            }
            Ok(_) => {}
            Err(e) => {
                e.log_error();
                if e.is_retryable() {
                    warn!(
                        "{} tick aborted, the same window is retried next tick: {}",
                        self.kind,
                        e.user_friendly_message()
                    );
                } else {
                    warn!(
                        "{} tick aborted ({}), watermark kept at {}",
                        self.kind,
                        e.error_code(),
                        self.watermark()
                    );
                }
            }
        }
    }
}
