//! Keyword monitor: two poll loops sharing one seen-item ledger, plus a
//! periodic flusher that keeps the ledger file current.

pub mod flusher;
pub mod ledger;
pub mod matcher;
pub mod policy;
pub mod poll;

pub use flusher::LedgerFlusher;
pub use ledger::{Ledger, LedgerState};
pub use matcher::{find_special_pattern, KeywordMatcher};
pub use policy::{enumerate_keywords, Decision, ResponsePolicy};
pub use poll::{Outcome, PollLoop, TickReport};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use turtlebot_core::{ContentSource, CoreError, ItemKind, MonitorSettings};

pub struct MonitorService {
    source: Arc<dyn ContentSource>,
    settings: MonitorSettings,
    bot_username: String,
    ledger: Arc<Ledger>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl MonitorService {
    /// Loads the ledger from `settings.ledger_path`.
    pub async fn new(
        source: Arc<dyn ContentSource>,
        settings: MonitorSettings,
        bot_username: impl Into<String>,
    ) -> Self {
        let ledger = Arc::new(Ledger::load(&settings.ledger_path).await);
        Self::with_ledger(source, settings, bot_username, ledger)
    }

    pub fn with_ledger(
        source: Arc<dyn ContentSource>,
        settings: MonitorSettings,
        bot_username: impl Into<String>,
        ledger: Arc<Ledger>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            source,
            settings,
            bot_username: bot_username.into(),
            ledger,
            shutdown,
            tasks: Vec::new(),
        }
    }

    pub fn ledger(&self) -> Arc<Ledger> {
        self.ledger.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    pub fn poll_loop(&self, kind: ItemKind) -> PollLoop {
        PollLoop::new(
            kind,
            self.source.clone(),
            self.ledger.clone(),
            &self.settings,
            &self.bot_username,
        )
    }

    pub fn start(&mut self) -> Result<(), CoreError> {
        if self.is_running() {
            return Err(CoreError::InvalidInput {
                message: "monitor is already running".to_string(),
            });
        }
        if self.settings.poll_interval_secs == 0 || self.settings.flush_interval_secs == 0 {
            return Err(CoreError::InvalidInput {
                message: "poll and flush intervals must be positive".to_string(),
            });
        }

        self.shutdown.send_replace(false);
        let poll_interval = Duration::from_secs(self.settings.poll_interval_secs);

        let kinds = [
            (ItemKind::Post, self.settings.watch_posts),
            (ItemKind::Comment, self.settings.watch_comments),
        ];
        for (kind, enabled) in kinds {
            if !enabled {
                info!("Not watching {}s", kind);
                continue;
            }
            let poll_loop = Arc::new(self.poll_loop(kind));
            let shutdown = self.shutdown.subscribe();
            self.tasks
                .push(tokio::spawn(poll_loop.run(poll_interval, shutdown)));
        }

        let flusher = LedgerFlusher::new(
            self.ledger.clone(),
            Duration::from_secs(self.settings.flush_interval_secs),
        );
        self.tasks
            .push(tokio::spawn(flusher.run(self.shutdown.subscribe())));

        info!(
            "Monitor started for r/{} as u/{}",
            self.settings.subreddits.join("+"),
            self.bot_username
        );
        Ok(())
    }

    /// Signals every loop, waits for in-flight ticks and the final flush.
    pub async fn stop(&mut self) -> Result<(), CoreError> {
        self.shutdown.send_replace(true);

        let mut failed = 0;
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Monitor task ended abnormally: {}", e);
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(CoreError::Internal {
                message: format!("{} monitor task(s) did not shut down cleanly", failed),
            });
        }
        info!("Monitor stopped");
        Ok(())
    }
}
