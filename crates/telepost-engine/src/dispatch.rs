//! The dispatch loop — sole writer of publication delivery state.
//!
//! One worker per deployment. Each wake selects every pending publication
//! with `ready_at <= now` (this comparison is the whole catch-up story) and
//! processes the due set strictly sequentially, oldest first, so the
//! channel sees a single ordered delivery stream.
//!
//! Failure containment: a delivery port failure is an outcome for that one
//! item and never aborts the wake; a ledger failure aborts the wake — no
//! state was committed, the next wake retries everything.
//!
//! Crash window: if the process dies between the send and the ledger
//! write, the item is still pending and due on restart. We assume the
//! interrupted attempt failed and accept a possible duplicate send over a
//! silent loss.

use std::time::Duration as StdDuration;

use chrono::Duration;

use telepost_core::config::SchedulerConfig;
use telepost_core::error::Result;
use telepost_core::traits::{Clock, Delivery, DeliveryError, DeliveryPort};
use telepost_ledger::{CommitOutcome, DispatchItem, Ledger};

/// Per-wake counters, reported in logs and inspected by tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub selected: usize,
    pub delivered: usize,
    pub retried: usize,
    pub failed: usize,
    /// Lost races: selected but no longer pending at dispatch time.
    pub skipped: usize,
}

/// The background worker. All collaborators are injected; there is no
/// process-wide state and no direct `Utc::now()` call anywhere in here.
pub struct DispatchLoop<P, C> {
    ledger: Ledger,
    port: P,
    clock: C,
    config: SchedulerConfig,
}

impl<P: DeliveryPort, C: Clock> DispatchLoop<P, C> {
    pub fn new(ledger: Ledger, port: P, clock: C, config: SchedulerConfig) -> Self {
        Self {
            ledger,
            port,
            clock,
            config,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Run forever on the configured wake interval. Returns immediately
    /// when the deployment disables delivery.
    pub async fn run(mut self) {
        if self.config.disabled {
            tracing::info!("dispatch loop disabled by config, not starting");
            return;
        }
        tracing::info!(
            interval_secs = self.config.interval_secs,
            max_attempts = self.config.max_attempts,
            retry_minutes = self.config.retry_minutes,
            "dispatch loop started"
        );

        let mut interval =
            tokio::time::interval(StdDuration::from_secs(self.config.interval_secs.max(1)));
        loop {
            interval.tick().await;
            match self.tick().await {
                Ok(stats) if stats.selected > 0 => {
                    tracing::info!(
                        selected = stats.selected,
                        delivered = stats.delivered,
                        retried = stats.retried,
                        failed = stats.failed,
                        skipped = stats.skipped,
                        "wake cycle complete"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    // ledger unavailable; nothing was committed, retry whole
                    // cycle on the next wake
                    tracing::error!("wake cycle aborted: {e}");
                }
            }
        }
    }

    /// One wake cycle: select the due set and process it in order.
    pub async fn tick(&mut self) -> Result<TickStats> {
        let now = self.clock.now();
        let due = self.ledger.select_due(now)?;
        let mut stats = TickStats {
            selected: due.len(),
            ..Default::default()
        };
        for publication_id in due {
            self.process_one(publication_id, &mut stats).await?;
        }
        Ok(stats)
    }

    /// Process a single due publication. Only ledger errors propagate.
    pub(crate) async fn process_one(
        &mut self,
        publication_id: i64,
        stats: &mut TickStats,
    ) -> Result<()> {
        // Re-check status right before dispatch: the publication may have
        // been cancelled between due-set selection and now.
        let Some(item) = self.ledger.dispatch_item(publication_id)? else {
            tracing::debug!(publication_id, "publication no longer pending, skipping");
            stats.skipped += 1;
            return Ok(());
        };

        tracing::debug!(
            publication_id,
            attempt = item.publication.attempt_count + 1,
            chat_id = %item.destination.chat_id,
            "dispatching publication"
        );
        let outcome =
            Self::deliver(&self.port, self.config.send_timeout_secs, &item).await;
        let now = self.clock.now();

        match outcome {
            Ok(receipt) => {
                self.ledger.commit(
                    publication_id,
                    &CommitOutcome::Delivered {
                        sent_at: now,
                        message_id: receipt.message_id.clone(),
                    },
                )?;
                tracing::info!(
                    publication_id,
                    message_id = receipt.message_id.as_deref().unwrap_or("-"),
                    "publication delivered"
                );
                stats.delivered += 1;
            }
            Err(err) => {
                let attempt_count = item.publication.attempt_count + 1;
                if err.retryable && attempt_count < self.config.max_attempts {
                    let ready_at = now + self.retry_delay(&err);
                    self.ledger.commit(
                        publication_id,
                        &CommitOutcome::Retry {
                            attempt_count,
                            ready_at,
                            error: err.reason.clone(),
                        },
                    )?;
                    tracing::warn!(
                        publication_id,
                        attempt_count,
                        %ready_at,
                        "delivery failed, retry scheduled: {}",
                        err.reason
                    );
                    stats.retried += 1;
                } else {
                    self.ledger.commit(
                        publication_id,
                        &CommitOutcome::Failed {
                            attempt_count,
                            error: err.reason.clone(),
                        },
                    )?;
                    tracing::error!(
                        publication_id,
                        attempt_count,
                        retryable = err.retryable,
                        "publication failed terminally: {}",
                        err.reason
                    );
                    stats.failed += 1;
                }
            }
        }
        Ok(())
    }

    /// One bounded delivery call. A timeout is a retryable failure, never a
    /// hang — one slow item must not stall the queue behind it.
    async fn deliver(
        port: &P,
        timeout_secs: u64,
        item: &DispatchItem,
    ) -> std::result::Result<Delivery, DeliveryError> {
        let timeout = StdDuration::from_secs(timeout_secs);
        match tokio::time::timeout(timeout, port.send(&item.destination, &item.rendered)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::transient(format!(
                "delivery timed out after {timeout_secs}s"
            ))),
        }
    }

    /// Fixed backoff, except a larger server-requested delay wins.
    fn retry_delay(&self, err: &DeliveryError) -> Duration {
        let backoff = Duration::minutes(self.config.retry_minutes);
        match err.retry_after.and_then(|d| Duration::from_std(d).ok()) {
            Some(requested) if requested > backoff => requested,
            _ => backoff,
        }
    }
}
