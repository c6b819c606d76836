//! Action worker: turns deliveries into acknowledgement decisions.
//!
//! - Actions for one player run under that player's lock, so the engine's
//!   read-modify-write never races within this process. Across processes the
//!   repository's version check still applies.
//! - Repository failures requeue; malformed payloads and corrupt player
//!   records are rejected (dead-lettered).
//! - A publish failure after a committed write is logged and acknowledged.
//!   Redelivery would be skipped as a duplicate anyway.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use rewardz_core::config::TransportConfig;
use rewardz_core::persistence::open_repository;
use rewardz_core::processor::ProcessorConfig;
use rewardz_core::{
    ActionProcessor, PlayerId, PlayerRepository, RepositoryError, RetryingRepository,
    RewardzConfig, RewardzError, RuleSet,
};

use crate::envelope::Envelope;
use crate::error::WorkerError;
use crate::publisher::RewardPublisher;

/// What the transport should do with a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Processed (or already processed); remove from the queue.
    Ack,
    /// Failed transiently; redeliver later.
    Requeue,
    /// Can never succeed; dead-letter without retry.
    Reject,
}

/// One inbound message and the channel its disposition goes back on.
#[derive(Debug)]
pub struct Delivery {
    /// Raw payload.
    pub body: Vec<u8>,
    /// Receives the disposition once handling finishes.
    pub reply: oneshot::Sender<Disposition>,
}

impl Delivery {
    /// Wrap `body`, returning the receiver for its disposition.
    #[must_use]
    pub fn new(body: Vec<u8>) -> (Self, oneshot::Receiver<Disposition>) {
        let (reply, rx) = oneshot::channel();
        (Self { body, reply }, rx)
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Running counters.
#[derive(Debug, Default)]
pub struct WorkerStats {
    processed: AtomicU64,
    duplicates: AtomicU64,
    requeued: AtomicU64,
    rejected: AtomicU64,
    publish_failures: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Actions applied and saved.
    pub processed: u64,
    /// Deliveries skipped as already applied.
    pub duplicates: u64,
    /// Deliveries sent back for retry.
    pub requeued: u64,
    /// Deliveries dead-lettered.
    pub rejected: u64,
    /// Results that could not be published.
    pub publish_failures: u64,
}

impl WorkerStats {
    /// Current values.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// ActionWorker
// ---------------------------------------------------------------------------

/// Handles deliveries for an [`ActionProcessor`].
pub struct ActionWorker<R, P> {
    processor: ActionProcessor<R>,
    publisher: P,
    locks: DashMap<PlayerId, Arc<Mutex<()>>>,
    stats: WorkerStats,
    max_in_flight: usize,
}

impl<R, P> std::fmt::Debug for ActionWorker<R, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionWorker")
            .field("locked_players", &self.locks.len())
            .field("stats", &self.stats.snapshot())
            .field("max_in_flight", &self.max_in_flight)
            .finish_non_exhaustive()
    }
}

impl<P: RewardPublisher> ActionWorker<RetryingRepository<Box<dyn PlayerRepository>>, P> {
    /// Load rules and open the repository named by `config`.
    ///
    /// # Errors
    /// Returns [`WorkerError::Core`] if the rule file fails to load or the
    /// repository cannot be opened. Both are fatal at startup.
    pub fn from_config(config: &RewardzConfig, publisher: P) -> Result<Self, WorkerError> {
        let rules = RuleSet::load(&config.rules.path)?;
        let repository = open_repository(&config.persistence, &config.retry)
            .map_err(RewardzError::from)?;
        let processor = ActionProcessor::with_config(
            Arc::new(rules),
            repository,
            ProcessorConfig::from(config),
        );
        Ok(Self::new(processor, publisher, &config.transport))
    }
}

impl<R: PlayerRepository, P: RewardPublisher> ActionWorker<R, P> {
    /// Create a worker.
    #[must_use]
    pub fn new(processor: ActionProcessor<R>, publisher: P, transport: &TransportConfig) -> Self {
        Self {
            processor,
            publisher,
            locks: DashMap::new(),
            stats: WorkerStats::default(),
            max_in_flight: transport.max_in_flight.max(1),
        }
    }

    /// The wrapped processor.
    #[must_use]
    pub fn processor(&self) -> &ActionProcessor<R> {
        &self.processor
    }

    /// The publisher results go to.
    #[must_use]
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Decode and handle a raw payload.
    pub fn handle_body(&self, body: &[u8]) -> Disposition {
        match Envelope::decode(body) {
            Ok(envelope) => self.handle(&envelope),
            Err(e) => {
                warn!(error = %e, bytes = body.len(), "Rejecting malformed delivery");
                WorkerStats::bump(&self.stats.rejected);
                Disposition::Reject
            }
        }
    }

    /// Handle one decoded envelope.
    pub fn handle(&self, envelope: &Envelope) -> Disposition {
        let start = Instant::now();
        let lock = self.player_lock(&envelope.player_id);
        let outcome = {
            let _guard = lock.lock();
            self.processor.handle(&envelope.to_event())
        };
        drop(lock);
        self.release_lock(&envelope.player_id);

        let result = match outcome {
            Ok(result) => result,
            Err(RewardzError::Repository(e @ RepositoryError::Corrupt { .. })) => {
                error!(
                    player = %envelope.player_id,
                    action = %envelope.action,
                    error = %e,
                    "Rejecting action for corrupt player record"
                );
                WorkerStats::bump(&self.stats.rejected);
                return Disposition::Reject;
            }
            Err(e) => {
                error!(
                    player = %envelope.player_id,
                    action = %envelope.action,
                    error = %e,
                    "Action failed, requeueing"
                );
                WorkerStats::bump(&self.stats.requeued);
                return Disposition::Requeue;
            }
        };

        if result.duplicate {
            WorkerStats::bump(&self.stats.duplicates);
            return Disposition::Ack;
        }
        WorkerStats::bump(&self.stats.processed);

        if let Err(e) = self.publisher.publish(&result) {
            error!(
                player = %result.player_id,
                rewards = result.rewards.len(),
                error = %e,
                "Rewards committed but not published"
            );
            WorkerStats::bump(&self.stats.publish_failures);
        }

        debug!(
            player = %envelope.player_id,
            action = %envelope.action,
            rewards = result.rewards.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Delivery acknowledged"
        );
        Disposition::Ack
    }

    fn player_lock(&self, player: &PlayerId) -> Arc<Mutex<()>> {
        Arc::clone(&self.locks.entry(player.clone()).or_default())
    }

    /// Drop the player's lock entry once nobody else holds it.
    fn release_lock(&self, player: &PlayerId) {
        self.locks.remove_if(player, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl<R, P> ActionWorker<R, P>
where
    R: PlayerRepository + 'static,
    P: RewardPublisher + 'static,
{
    /// Consume deliveries until `rx` closes, with at most
    /// `transport.max_in_flight` actions running at once on the blocking
    /// pool. Returns after every in-flight delivery has been answered.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<Delivery>) {
        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();
        info!(max_in_flight = self.max_in_flight, "Worker started");

        while let Some(delivery) = rx.recv().await {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(error = %e, "Semaphore closed");
                    break;
                }
            };
            let worker = Arc::clone(&self);

            tasks.spawn(async move {
                let Delivery { body, reply } = delivery;
                let disposition = tokio::task::spawn_blocking(move || worker.handle_body(&body))
                    .await
                    .unwrap_or_else(|e| {
                        error!(error = %e, "Action task failed, requeueing");
                        Disposition::Requeue
                    });
                drop(permit);
                if reply.send(disposition).is_err() {
                    debug!(?disposition, "Delivery reply dropped");
                }
            });

            while tasks.try_join_next().is_some() {}
        }

        while tasks.join_next().await.is_some() {}
        info!(stats = ?self.stats.snapshot(), "Worker stopped");
    }
}
