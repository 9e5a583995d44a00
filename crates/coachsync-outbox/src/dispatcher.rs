//! The dispatch loop: claim, write, then settle the event.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use coachsync_core::clock::Clock;
use coachsync_core::config::SyncConfig;
use coachsync_core::error::{DomainError, WriteError};
use coachsync_core::outbox::{OutboxEvent, OutboxWriter, WriteOutcome};
use coachsync_core::repository::OutboxRepository;
use coachsync_core::rng::DeterministicRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// What happened to the event claimed by one [`OutboxDispatcher::dispatch_next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    /// Nothing was eligible.
    Idle,
    /// The writer succeeded and the event is done.
    Delivered {
        /// Outbox event id.
        event_id: i64,
        /// Writer result.
        outcome: WriteOutcome,
    },
    /// A retryable failure; the event becomes eligible again later.
    Retrying {
        /// Outbox event id.
        event_id: i64,
        /// Attempts made so far.
        attempt_count: i32,
        /// When the event is next eligible.
        next_attempt_at: DateTime<Utc>,
    },
    /// Permanent failure or retries exhausted.
    DeadLettered {
        /// Outbox event id.
        event_id: i64,
        /// New dead-letter entry id.
        dead_letter_id: i64,
    },
}

/// Drives outbox events through a writer.
///
/// Every claim is atomic, so any number of dispatchers, in this process or
/// others, can share one queue. No relational lock is held while the writer
/// talks to the spreadsheet store.
pub struct OutboxDispatcher {
    outbox: Arc<dyn OutboxRepository>,
    writer: Arc<dyn OutboxWriter>,
    clock: Arc<dyn Clock>,
    rng: Mutex<Box<dyn DeterministicRng>>,
    config: SyncConfig,
}

impl OutboxDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(
        outbox: Arc<dyn OutboxRepository>,
        writer: Arc<dyn OutboxWriter>,
        clock: Arc<dyn Clock>,
        rng: Box<dyn DeterministicRng>,
        config: SyncConfig,
    ) -> Self {
        Self {
            outbox,
            writer,
            clock,
            rng: Mutex::new(rng),
            config,
        }
    }

    /// Claims the most urgent eligible event and processes it.
    ///
    /// Writer failures are settled on the event itself and reported through
    /// the returned [`DispatchResult`]; they never surface as errors.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` only if the queue itself cannot be read or
    /// updated. A claimed event left in flight by such an error is recovered
    /// by [`Self::release_stale_claims`].
    pub async fn dispatch_next(&self) -> Result<DispatchResult, DomainError> {
        let Some(event) = self.outbox.claim_next(self.clock.now()).await? else {
            return Ok(DispatchResult::Idle);
        };
        let span = info_span!(
            "dispatch",
            event_id = event.id,
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            attempt_count = event.attempt_count,
        );
        self.process(event).instrument(span).await
    }

    async fn process(&self, event: OutboxEvent) -> Result<DispatchResult, DomainError> {
        match self.write(&event).await {
            Ok(outcome) => {
                self.outbox.mark_done(event.id, self.clock.now()).await?;
                info!(outcome = outcome.label(), "Outbox event delivered");
                Ok(DispatchResult::Delivered {
                    event_id: event.id,
                    outcome,
                })
            }
            Err(WriteError::Retryable(message)) => {
                let attempt_count = event.attempt_count.saturating_add(1);
                if attempt_count > self.config.max_retries {
                    return self
                        .dead_letter(&event, attempt_count, &format!("retries exhausted: {message}"))
                        .await;
                }
                let delay = {
                    let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                    self.config.backoff.delay(attempt_count, &mut **rng)
                };
                let next_attempt_at = self.clock.after(delay);
                self.outbox
                    .mark_retryable(
                        event.id,
                        attempt_count,
                        next_attempt_at,
                        &message,
                        self.clock.now(),
                    )
                    .await?;
                warn!(
                    attempt_count,
                    %next_attempt_at,
                    error = %message,
                    "Outbox event failed, will retry"
                );
                Ok(DispatchResult::Retrying {
                    event_id: event.id,
                    attempt_count,
                    next_attempt_at,
                })
            }
            Err(WriteError::Permanent(message)) => {
                let attempt_count = event.attempt_count.saturating_add(1);
                self.dead_letter(&event, attempt_count, &message).await
            }
        }
    }

    async fn write(&self, event: &OutboxEvent) -> Result<WriteOutcome, WriteError> {
        let timeout = self.config.write_timeout;
        tokio::time::timeout(timeout, self.writer.write_outbox_event(event))
            .await
            .unwrap_or_else(|_| {
                Err(WriteError::Retryable(format!(
                    "writer call timed out after {}ms",
                    timeout.as_millis()
                )))
            })
    }

    async fn dead_letter(
        &self,
        event: &OutboxEvent,
        attempt_count: i32,
        message: &str,
    ) -> Result<DispatchResult, DomainError> {
        let entry = self
            .outbox
            .dead_letter(event.id, attempt_count, message, self.clock.now())
            .await?;
        error!(
            dead_letter_id = entry.id,
            attempt_count,
            error = %message,
            "Outbox event dead-lettered"
        );
        Ok(DispatchResult::DeadLettered {
            event_id: event.id,
            dead_letter_id: entry.id,
        })
    }

    /// Returns abandoned in-flight claims to the queue.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the queue cannot be updated.
    pub async fn release_stale_claims(&self) -> Result<u64, DomainError> {
        let now = self.clock.now();
        let timeout = chrono::Duration::from_std(self.config.claim_timeout)
            .map_err(|e| DomainError::Validation(format!("claim timeout out of range: {e}")))?;
        let released = self.outbox.release_stale_claims(now - timeout, now).await?;
        if released > 0 {
            warn!(released, "Released stale outbox claims");
        }
        Ok(released)
    }

    /// Processes events until `shutdown` flips to `true`, sleeping for the
    /// poll interval whenever the queue is empty or unreachable.
    pub async fn run_worker(&self, worker: usize, mut shutdown: watch::Receiver<bool>) {
        info!(worker, "Outbox worker started");
        while !*shutdown.borrow() {
            let idle = match self.dispatch_next().await {
                Ok(DispatchResult::Idle) => true,
                Ok(_) => false,
                Err(e) => {
                    error!(worker, error = %e, "Outbox dispatch failed");
                    true
                }
            };
            if idle {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    () = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }
        info!(worker, "Outbox worker stopped");
    }

    /// Periodically releases stale claims until `shutdown` flips to `true`.
    pub async fn run_reaper(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.claim_timeout);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.release_stale_claims().await {
                        error!(error = %e, "Releasing stale outbox claims failed");
                    }
                }
            }
        }
        debug!("Outbox reaper stopped");
    }

    /// Spawns the configured number of workers plus one reaper.
    #[must_use]
    pub fn spawn(self: &Arc<Self>, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let workers = self.config.workers.max(1);
        let mut handles: Vec<JoinHandle<()>> = (0..workers)
            .map(|worker| {
                let dispatcher = Arc::clone(self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { dispatcher.run_worker(worker, shutdown).await })
            })
            .collect();
        let dispatcher = Arc::clone(self);
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move { dispatcher.run_reaper(shutdown).await }));
        handles
    }
}
