use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::allocator::{AllocationOutcome, Allocator};
use crate::config::QueueConfig;
use crate::models::{IntentStatus, PurchaseIntent};
use crate::store::IntentStore;

/// Counters the processor maintains for the health endpoint. All reads are
/// approximate snapshots; writes come only from the processor itself.
#[derive(Debug, Default)]
pub struct ProcessorHealth {
    is_running: AtomicBool,
    /// Micros since epoch of the last terminal transition; 0 means never.
    last_processed_at: AtomicI64,
    total_processed: AtomicU64,
    total_failed: AtomicU64,
    latency_total_micros: AtomicU64,
    latency_samples: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct ProcessorHealthSnapshot {
    pub is_running: bool,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub total_processed: u64,
    pub total_failed: u64,
    pub average_processing_time_ms: f64,
}

impl ProcessorHealth {
    fn set_running(&self, running: bool) {
        self.is_running.store(running, Ordering::Relaxed);
    }

    fn record(&self, completed: bool, latency: Duration) {
        if completed {
            self.total_processed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.total_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.latency_total_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
        self.last_processed_at
            .store(Utc::now().timestamp_micros(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProcessorHealthSnapshot {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        let average_processing_time_ms = if samples == 0 {
            0.0
        } else {
            self.latency_total_micros.load(Ordering::Relaxed) as f64 / samples as f64 / 1000.0
        };
        let last = self.last_processed_at.load(Ordering::Relaxed);

        ProcessorHealthSnapshot {
            is_running: self.is_running.load(Ordering::Relaxed),
            last_processed_at: DateTime::<Utc>::from_timestamp_micros(last).filter(|_| last != 0),
            total_processed: self.total_processed.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            average_processing_time_ms,
        }
    }
}

/// The long-lived worker that turns waiting intents into purchases.
///
/// One logical processor per process; correctness under multi-process
/// deployment comes from the claim update and the allocator's locking, not
/// from any single-worker assumption. Owned by the composition root, started
/// at boot, stopped through the shutdown channel.
pub struct QueueProcessor {
    intents: Arc<dyn IntentStore>,
    allocator: Arc<dyn Allocator>,
    config: QueueConfig,
    health: Arc<ProcessorHealth>,
}

impl QueueProcessor {
    pub fn new(
        intents: Arc<dyn IntentStore>,
        allocator: Arc<dyn Allocator>,
        config: QueueConfig,
    ) -> Self {
        Self {
            intents,
            allocator,
            config,
            health: Arc::new(ProcessorHealth::default()),
        }
    }

    pub fn health(&self) -> Arc<ProcessorHealth> {
        Arc::clone(&self.health)
    }

    /// Spawns the tick loop and the expiry sweeper. Both stop when the
    /// shutdown sender fires.
    pub fn start(self: &Arc<Self>, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        self.health.set_running(true);

        let ticker = Arc::clone(self);
        let mut tick_shutdown = shutdown.subscribe();
        let tick_loop = tokio::spawn(async move {
            ticker.recover().await;

            let mut tick = tokio::time::interval(ticker.config.tick_period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => ticker.run_tick().await,
                    _ = tick_shutdown.recv() => break,
                }
            }
            ticker.health.set_running(false);
            info!("queue processor stopped");
        });

        let sweeper = Arc::clone(self);
        let mut sweep_shutdown = shutdown.subscribe();
        let sweep_loop = tokio::spawn(async move {
            let mut tick = tokio::time::interval(sweeper.config.sweeper_period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first interval tick fires immediately; skip it so a boot
            // sweep does not race startup recovery.
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = tick.tick() => sweeper.run_sweep().await,
                    _ = sweep_shutdown.recv() => break,
                }
            }
            info!("expiry sweeper stopped");
        });

        vec![tick_loop, sweep_loop]
    }

    /// Startup reconciliation: a prior instance may have crashed mid-intent.
    /// Anything still PROCESSING that has not been touched within the
    /// per-intent budget is failed; committed tickets (if any) stand.
    pub async fn recover(&self) {
        let timeout = chrono::Duration::from_std(self.config.per_intent_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let cutoff = Utc::now() - timeout;
        match self.intents.fail_stalled(cutoff).await {
            Ok(0) => {}
            Ok(failed) => {
                warn!(count = failed, "failed stalled intents left by a previous run");
            }
            Err(e) => {
                error!(error = ?e, "startup recovery failed");
            }
        }
    }

    /// One processor tick: find events with pending work, drain a bounded
    /// batch from each. Events drain in parallel; within an event the batch
    /// runs in strict arrival order so fairness holds.
    pub async fn run_tick(&self) {
        let event_ids = match self.intents.events_with_waiting().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = ?e, "failed to discover events with waiting intents");
                return;
            }
        };
        if event_ids.is_empty() {
            return;
        }

        debug!(events = event_ids.len(), "draining queues");
        futures::future::join_all(event_ids.into_iter().map(|id| self.drain_event(id))).await;
    }

    async fn drain_event(&self, event_id: Uuid) {
        let batch = match self
            .intents
            .next_waiting_for_event(event_id, self.config.batch_size)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                error!(event_id = %event_id, error = ?e, "failed to load waiting intents");
                return;
            }
        };

        for intent in batch {
            self.process_intent(intent).await;
        }
    }

    /// Claim-and-process for one intent. After a successful claim the intent
    /// always reaches a terminal state before this returns.
    pub async fn process_intent(&self, intent: PurchaseIntent) {
        match self.intents.claim(intent.id).await {
            Ok(true) => {}
            Ok(false) => {
                // Cancelled, expired, or claimed by a sibling process.
                debug!(intent_id = %intent.id, "claim lost, skipping");
                return;
            }
            Err(e) => {
                error!(intent_id = %intent.id, error = ?e, "claim failed");
                return;
            }
        }

        let started = tokio::time::Instant::now();

        let expiry_micros = self.config.intent_expiry.as_micros() as i64;
        if intent.age_micros(Utc::now().timestamp_micros()) > expiry_micros {
            info!(intent_id = %intent.id, "intent expired before allocation");
            self.finish(&intent, IntentStatus::Expired, started).await;
            return;
        }

        for attempt in 1..=self.config.max_attempts {
            let outcome = match tokio::time::timeout(
                self.config.per_intent_timeout,
                self.allocator.allocate(&intent),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => AllocationOutcome::Timeout,
            };

            match outcome {
                AllocationOutcome::Success { tickets } => {
                    info!(
                        intent_id = %intent.id,
                        event_id = %intent.event_id,
                        tickets = tickets.len(),
                        attempt,
                        "purchase completed"
                    );
                    self.finish(&intent, IntentStatus::Completed, started).await;
                    return;
                }
                outcome if outcome.is_retryable() && attempt < self.config.max_attempts => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        intent_id = %intent.id,
                        outcome = outcome.kind(),
                        attempt,
                        delay_secs = delay.as_secs(),
                        "allocation attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                outcome => {
                    warn!(
                        intent_id = %intent.id,
                        event_id = %intent.event_id,
                        outcome = outcome.kind(),
                        attempt,
                        "purchase failed"
                    );
                    self.finish(&intent, IntentStatus::Failed, started).await;
                    return;
                }
            }
        }

        // max_attempts = 0; nothing was tried, nothing may stay claimed.
        self.finish(&intent, IntentStatus::Failed, started).await;
    }

    /// Bulk-expire WAITING intents past the expiry age. PROCESSING intents
    /// belong to the tick loop and are never touched here.
    pub async fn run_sweep(&self) {
        let cutoff =
            Utc::now().timestamp_micros() - self.config.intent_expiry.as_micros() as i64;
        match self.intents.expire_older_than(cutoff).await {
            Ok(0) => {}
            Ok(expired) => info!(count = expired, "expired stale intents"),
            Err(e) => error!(error = ?e, "expiry sweep failed"),
        }
    }

    async fn finish(
        &self,
        intent: &PurchaseIntent,
        status: IntentStatus,
        started: tokio::time::Instant,
    ) {
        if let Err(e) = self.intents.set_status(intent.id, status).await {
            // The intent stays PROCESSING; startup recovery will fail it.
            error!(intent_id = %intent.id, status = %status, error = ?e, "terminal transition failed");
            return;
        }
        if status != IntentStatus::Expired {
            self.health
                .record(status == IntentStatus::Completed, started.elapsed());
        }
    }
}

/// Exponential backoff between allocation attempts: 2^attempt seconds.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}
