use crate::ledger::Ledger;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Persists the ledger every `interval` and once more on shutdown.
pub struct LedgerFlusher {
    ledger: Arc<Ledger>,
    interval: Duration,
}

impl LedgerFlusher {
    pub fn new(ledger: Arc<Ledger>, interval: Duration) -> Self {
        Self { ledger, interval }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the ledger was just loaded.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("Periodic ledger flush");
                    self.ledger.persist().await;
                }
                _ = shutdown.changed() => break,
            }
        }

        info!("Final ledger flush to {}", self.ledger.path().display());
        self.ledger.persist().await;
    }
}
