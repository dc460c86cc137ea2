//! The subscriber role: a read-only mirror of the producer's document.
//!
//! A replica runs two tasks over one store:
//!
//! - the ingestion task ([`Replica::run_ingest`]) feeds every delta from the
//!   stream into [`Replica::ingest`], which applies it while the replica is
//!   active and queues it otherwise
//! - the lifecycle driver ([`Replica::run`]) establishes a baseline with
//!   [`Replica::resync`] and then periodically checks it with
//!   [`Replica::verify`]
//!
//! ```text
//!            resync                          drain
//! Paused ──────────────▶ Resyncing ──▶ DrainingQueue ──▶ Active
//!   ▲                        │                           │   ▲
//!   └──── transport fault ───┘                    verify │   │ digests match
//!                                                        ▼   │
//!                            Diverged ◀── mismatch ── Verifying
//! ```
//!
//! Phase and queue live behind one mutex that ingestion also takes, so a
//! delta is either applied or queued, never lost between the two.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::Rng;
use tokio::sync::Notify;

use treesync_core::{Snapshot, StateChecksum, Timestamp};
use treesync_store::{ApplyOutcome, Store};

use crate::convergence::{compare, ConvergenceResult};
use crate::error::{Result, SyncError};
use crate::messages::{DeltaMessage, SyncRequest, SyncResponse};
use crate::queue::{DrainReport, ReplicaQueue};
use crate::transport::{DeltaStream, RequestChannel};

/// Configuration for replica behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Timeout for one request/response round-trip.
    pub request_timeout: Duration,
    /// How long verify waits for in-flight deltas to reach the producer's
    /// checkpoint before comparing whatever state it has.
    pub catch_up_timeout: Duration,
    /// Pause between verifications in [`Replica::run`].
    pub verify_interval: Duration,
    /// Give up resyncing after this many attempts. `None` retries forever.
    pub max_resync_attempts: Option<u32>,
    /// Initial delay between resync attempts.
    pub retry_backoff: Duration,
    /// Upper bound for the delay between resync attempts.
    pub max_retry_backoff: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            catch_up_timeout: Duration::from_secs(5),
            verify_interval: Duration::from_secs(30),
            max_resync_attempts: None,
            retry_backoff: Duration::from_millis(100),
            max_retry_backoff: Duration::from_secs(5),
        }
    }
}

/// Lifecycle phase of a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicaPhase {
    /// No usable baseline. Initial phase, and where a failed resync lands.
    Paused,
    /// Waiting for the producer's full state.
    Resyncing,
    /// Replaying deltas queued during the resync.
    DrainingQueue,
    /// Applying deltas as they arrive.
    Active,
    /// Comparing checksums with the producer.
    Verifying,
    /// Verification found a mismatch. Only a resync leaves this phase.
    Diverged,
}

impl ReplicaPhase {
    /// Whether incoming deltas are applied directly rather than queued.
    pub fn applies_directly(&self) -> bool {
        matches!(self, ReplicaPhase::Active)
    }

    fn can_resync(&self) -> bool {
        matches!(
            self,
            ReplicaPhase::Paused | ReplicaPhase::Active | ReplicaPhase::Diverged
        )
    }
}

impl fmt::Display for ReplicaPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplicaPhase::Paused => "paused",
            ReplicaPhase::Resyncing => "resyncing",
            ReplicaPhase::DrainingQueue => "draining-queue",
            ReplicaPhase::Active => "active",
            ReplicaPhase::Verifying => "verifying",
            ReplicaPhase::Diverged => "diverged",
        };
        f.write_str(name)
    }
}

/// What [`Replica::ingest`] did with a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Merged into the store.
    Applied,
    /// Already covered by the store; dropped.
    Stale,
    /// Held in the replica queue.
    Queued,
}

/// Result of a completed resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResyncReport {
    /// Timestamp of the producer snapshot the store was reset to.
    pub baseline: Timestamp,
    /// Queued deltas applied on top of the baseline.
    pub applied: usize,
    /// Queued deltas already covered by the baseline.
    pub discarded: usize,
}

/// Result of a verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The replica was not active; nothing was checked.
    Blocked,
    /// The replica matches the producer at `timestamp`.
    Consistent { timestamp: Timestamp },
    /// The replica differs from the producer.
    Diverged {
        local: StateChecksum,
        remote: StateChecksum,
    },
}

impl VerifyOutcome {
    pub fn is_consistent(&self) -> bool {
        matches!(self, VerifyOutcome::Consistent { .. })
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, VerifyOutcome::Blocked)
    }

    pub fn is_diverged(&self) -> bool {
        matches!(self, VerifyOutcome::Diverged { .. })
    }
}

struct ReplicaState {
    phase: ReplicaPhase,
    queue: ReplicaQueue,
}

/// A subscriber node's replica of the document.
pub struct Replica<S: Store, C: RequestChannel> {
    store: S,
    channel: C,
    config: SyncConfig,
    /// Locked before the store's own lock, never held across an await.
    state: Mutex<ReplicaState>,
    /// Signalled whenever a delta is queued.
    queued: Notify,
}

impl<S: Store, C: RequestChannel> Replica<S, C> {
    /// Create a replica in the `Paused` phase.
    pub fn new(store: S, channel: C, config: SyncConfig) -> Self {
        Self {
            store,
            channel,
            config,
            state: Mutex::new(ReplicaState {
                phase: ReplicaPhase::Paused,
                queue: ReplicaQueue::new(),
            }),
            queued: Notify::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn phase(&self) -> ReplicaPhase {
        self.lock_state().phase
    }

    pub fn queue_len(&self) -> usize {
        self.lock_state().queue.len()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    pub fn checksum(&self) -> StateChecksum {
        self.store.checksum()
    }

    pub fn timestamp(&self) -> Timestamp {
        self.store.timestamp()
    }

    /// Accept one delta from the stream.
    ///
    /// Applies it while active, queues it in every other phase. Never waits
    /// on the request channel.
    pub fn ingest(&self, message: DeltaMessage) -> IngestOutcome {
        let mut state = self.lock_state();

        if state.phase.applies_directly() {
            return match self.store.apply_delta(message.timestamp, &message.delta) {
                ApplyOutcome::Applied => {
                    tracing::debug!(timestamp = %message.timestamp, "delta applied");
                    IngestOutcome::Applied
                }
                ApplyOutcome::Stale { current } => {
                    tracing::warn!(
                        incoming = %message.timestamp,
                        %current,
                        "dropping stale delta"
                    );
                    IngestOutcome::Stale
                }
            };
        }

        tracing::debug!(
            timestamp = %message.timestamp,
            phase = %state.phase,
            "delta queued"
        );
        state.queue.push(message);
        drop(state);
        self.queued.notify_waiters();
        IngestOutcome::Queued
    }

    /// Decode and ingest one delta frame.
    pub fn ingest_frame(&self, frame: &[u8]) -> Result<IngestOutcome> {
        let message = DeltaMessage::decode(frame)?;
        Ok(self.ingest(message))
    }

    /// Ingest every frame from `stream` until it closes.
    ///
    /// Malformed frames are logged and skipped.
    pub async fn run_ingest<D: DeltaStream + ?Sized>(&self, stream: &D) -> Result<()> {
        loop {
            match stream.recv().await {
                Ok(frame) => {
                    if let Err(e) = self.ingest_frame(&frame) {
                        tracing::warn!(error = %e, "skipping malformed delta frame");
                    }
                }
                Err(SyncError::ChannelClosed) => {
                    tracing::info!("delta stream closed");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Replace the local state with the producer's and replay the queue.
    ///
    /// Allowed from `Paused`, `Active` and `Diverged`. Queued deltas at or
    /// below the snapshot's timestamp are discarded, newer ones applied in
    /// receipt order. On a transport fault the replica returns to `Paused`
    /// with its queue intact.
    pub async fn resync(&self) -> Result<ResyncReport> {
        let from = self.begin_resync()?;
        tracing::info!(%from, "resync started");

        let snapshot = match self.request(SyncRequest::Update).await {
            Ok(SyncResponse::Update(snapshot)) => snapshot,
            Ok(other) => {
                self.set_phase(ReplicaPhase::Paused);
                return Err(SyncError::InvalidMessage(format!(
                    "expected update response, got {} response",
                    other.request()
                )));
            }
            Err(e) => {
                self.set_phase(ReplicaPhase::Paused);
                tracing::warn!(error = %e, "resync failed, replica paused");
                return Err(e);
            }
        };

        let baseline = snapshot.timestamp;
        let drained = {
            let mut state = self.lock_state();
            state.phase = ReplicaPhase::DrainingQueue;
            self.store.reset(snapshot.document, baseline);
            let drained = state.queue.drain_into(&self.store, None);
            state.phase = ReplicaPhase::Active;
            drained
        };

        tracing::info!(
            %baseline,
            applied = drained.applied,
            discarded = drained.discarded,
            "resync complete, replica active"
        );

        Ok(ResyncReport {
            baseline,
            applied: drained.applied,
            discarded: drained.discarded,
        })
    }

    /// [`Replica::resync`], retrying retryable faults with capped
    /// exponential backoff.
    pub async fn resync_with_retry(&self) -> Result<ResyncReport> {
        let mut attempt: u32 = 0;
        let mut backoff = self.config.retry_backoff;

        loop {
            attempt += 1;
            match self.resync().await {
                Ok(report) => return Ok(report),
                Err(e) if e.is_retryable() && self.may_retry(attempt) => {
                    let delay = with_jitter(backoff);
                    tracing::warn!(attempt, error = %e, ?delay, "resync failed, retrying");
                    tokio::time::sleep(delay).await;
                    backoff = (backoff * 2).min(self.config.max_retry_backoff);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Compare this replica's checksum with the producer's.
    ///
    /// Only runs from `Active`; any other phase gives
    /// [`VerifyOutcome::Blocked`]. Before comparing, queued deltas up to the
    /// producer's checkpoint are applied, waiting up to `catch_up_timeout`
    /// for ones still in flight. A replica that never reaches the checkpoint
    /// is compared as it stands, so a lost delta shows up as a mismatch.
    /// A mismatch moves the replica to `Diverged`; a transport fault returns
    /// it to `Active` and is reported as an error.
    pub async fn verify(&self) -> Result<VerifyOutcome> {
        {
            let mut state = self.lock_state();
            if state.phase != ReplicaPhase::Active {
                tracing::debug!(phase = %state.phase, "verify blocked");
                return Ok(VerifyOutcome::Blocked);
            }
            state.phase = ReplicaPhase::Verifying;
        }

        let remote = match self.request(SyncRequest::Verify).await {
            Ok(SyncResponse::Verify(remote)) => remote,
            Ok(other) => {
                self.resume_active();
                return Err(SyncError::InvalidMessage(format!(
                    "expected verify response, got {} response",
                    other.request()
                )));
            }
            Err(e) => {
                self.resume_active();
                tracing::warn!(error = %e, "verify failed");
                return Err(e);
            }
        };

        if let Err(e) = self.catch_up(remote.timestamp).await {
            tracing::warn!(
                error = %e,
                remote = %remote.timestamp,
                "checkpoint not reached, comparing current state"
            );
        }

        let mut state = self.lock_state();
        state.queue.drain_into(&self.store, Some(remote.timestamp));
        let local = self.store.checksum();

        match compare(&local, &remote) {
            ConvergenceResult::Converged => {
                state.queue.drain_into(&self.store, None);
                state.phase = ReplicaPhase::Active;
                tracing::debug!(timestamp = %local.timestamp, "replica consistent");
                Ok(VerifyOutcome::Consistent {
                    timestamp: local.timestamp,
                })
            }
            ConvergenceResult::Diverged { local, remote } => {
                state.phase = ReplicaPhase::Diverged;
                tracing::error!(%local, %remote, "replica diverged from producer");
                Ok(VerifyOutcome::Diverged { local, remote })
            }
        }
    }

    /// The lifecycle driver.
    ///
    /// Resyncs (with retry), then verifies immediately and every
    /// `verify_interval`. Returns only on a fatal fault: an exhausted resync
    /// or a divergence.
    pub async fn run(&self) -> Result<()> {
        self.resync_with_retry().await?;

        loop {
            match self.verify().await {
                Ok(VerifyOutcome::Consistent { .. }) => {}
                Ok(VerifyOutcome::Blocked) => {}
                Ok(VerifyOutcome::Diverged { local, remote }) => {
                    return Err(SyncError::Diverged { local, remote });
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(error = %e, "verify will be retried next interval");
                }
                Err(e) => return Err(e),
            }

            tokio::time::sleep(self.config.verify_interval).await;
        }
    }

    /// Apply queued deltas until the store reaches `target`.
    async fn catch_up(&self, target: Timestamp) -> Result<DrainReport> {
        let deadline = tokio::time::Instant::now() + self.config.catch_up_timeout;
        let mut report = DrainReport::default();

        loop {
            let notified = self.queued.notified();
            tokio::pin!(notified);
            // Register before checking so a delta queued in between is not missed.
            notified.as_mut().enable();

            {
                let mut state = self.lock_state();
                report += state.queue.drain_into(&self.store, Some(target));
                if self.store.timestamp() >= target {
                    return Ok(report);
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(SyncError::Timeout(format!(
                    "replica at {} never reached {}",
                    self.store.timestamp(),
                    target
                )));
            }
        }
    }

    async fn request(&self, request: SyncRequest) -> Result<SyncResponse> {
        let timeout = self.config.request_timeout;
        let reply = tokio::time::timeout(timeout, self.channel.request(request.encode()))
            .await
            .map_err(|_| {
                SyncError::Timeout(format!("no {} response within {:?}", request, timeout))
            })??;
        SyncResponse::decode(&reply, request)
    }

    /// Enter `Resyncing`, returning the phase it was entered from.
    fn begin_resync(&self) -> Result<ReplicaPhase> {
        let mut state = self.lock_state();
        let current = state.phase;
        if !current.can_resync() {
            return Err(SyncError::Busy { phase: current });
        }
        state.phase = ReplicaPhase::Resyncing;
        Ok(current)
    }

    /// Leave `Verifying` without a verdict.
    fn resume_active(&self) {
        let mut state = self.lock_state();
        state.queue.drain_into(&self.store, None);
        state.phase = ReplicaPhase::Active;
    }

    fn set_phase(&self, phase: ReplicaPhase) {
        self.lock_state().phase = phase;
    }

    fn may_retry(&self, attempt: u32) -> bool {
        self.config
            .max_resync_attempts
            .map_or(true, |max| attempt < max)
    }

    fn lock_state(&self) -> MutexGuard<'_, ReplicaState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Add up to 50% random jitter.
fn with_jitter(base: Duration) -> Duration {
    let spread = u64::try_from(base.as_millis() / 2).unwrap_or(u64::MAX);
    if spread == 0 {
        return base;
    }
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}
