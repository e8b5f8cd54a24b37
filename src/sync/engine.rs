use crate::error::{DeliveryError, SyncError};
use crate::models::{LocationPoint, StoredPoint, TrackPayload};
use crate::queue::PendingStore;
use crate::sync::connectivity::Connectivity;
use crate::sync::events::{SyncEvent, SyncStatus};
use crate::sync::transport::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Most points sent in one recovery request.
    pub batch_size: usize,
    /// Period of the standing recovery trigger.
    pub recovery_interval: Duration,
    /// Pause before the next pass when a drain leaves points behind.
    pub drain_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            recovery_interval: Duration::from_secs(30),
            drain_delay: Duration::from_millis(100),
        }
    }
}

/// Result of one `recover_pending_points` call.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome {
    /// Another recovery held the single-flight guard.
    AlreadyRunning,
    /// Blank session or empty queue.
    Skipped,
    Recovered { count: usize, remaining: usize },
    Failed(DeliveryError),
}

struct Schedule {
    token: CancellationToken,
    running: bool,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    store: Arc<dyn PendingStore>,
    transport: Arc<dyn Transport>,
    connectivity: Arc<dyn Connectivity>,
    config: SyncConfig,
    session_id: RwLock<String>,
    status: Mutex<SyncStatus>,
    recovering: AtomicBool,
    events: broadcast::Sender<SyncEvent>,
    schedule: Mutex<Schedule>,
}

impl Inner {
    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn set_status(&self, status: SyncStatus) {
        *lock(&self.status) = status;
        self.emit(SyncEvent::StatusChanged { status });
    }

    /// Moves back to idle only if the status is still `from`.
    fn leave_status(&self, from: SyncStatus) {
        let mut current = lock(&self.status);
        if *current != from {
            return;
        }
        *current = SyncStatus::Idle;
        drop(current);
        self.emit(SyncEvent::StatusChanged {
            status: SyncStatus::Idle,
        });
    }
}

/// Resets the live-send status on every exit path.
struct SendingGuard<'a>(&'a Inner);

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        self.0.leave_status(SyncStatus::Sending);
    }
}

/// Releases the single-flight flag on every exit path.
struct RecoveryGuard<'a> {
    inner: &'a Inner,
    entered: bool,
}

impl Drop for RecoveryGuard<'_> {
    fn drop(&mut self) {
        self.inner.recovering.store(false, Ordering::Release);
        if self.entered {
            self.inner.set_status(SyncStatus::Idle);
        }
    }
}

/// Delivery state machine: live send with offline fallback, plus a
/// single-flight recovery loop draining the durable queue.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn PendingStore>,
        transport: Arc<dyn Transport>,
        connectivity: Arc<dyn Connectivity>,
        config: SyncConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                store,
                transport,
                connectivity,
                config,
                session_id: RwLock::new(String::new()),
                status: Mutex::new(SyncStatus::Idle),
                recovering: AtomicBool::new(false),
                events,
                schedule: Mutex::new(Schedule {
                    token: CancellationToken::new(),
                    running: false,
                    task: None,
                }),
            }),
        }
    }

    /// Subscribes to engine events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn set_session_id(&self, session_id: impl Into<String>) {
        *self
            .inner
            .session_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = session_id.into();
    }

    pub fn session_id(&self) -> String {
        self.inner
            .session_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Session id if sending is enabled.
    fn active_session(&self) -> Option<String> {
        let session_id = self.session_id();
        if session_id.trim().is_empty() {
            None
        } else {
            Some(session_id)
        }
    }

    pub fn status(&self) -> SyncStatus {
        *lock(&self.inner.status)
    }

    pub fn is_storage_supported(&self) -> bool {
        self.inner.store.is_supported()
    }

    pub async fn pending_count(&self) -> Result<usize, SyncError> {
        Ok(self.inner.store.size().await?)
    }

    /// Delivers a freshly captured point, buffering it offline on failure.
    ///
    /// Delivery failures are reported as events, not errors. Only a
    /// storage failure while buffering is returned.
    pub async fn handle_location_update(&self, point: LocationPoint) -> Result<(), SyncError> {
        let Some(session_id) = self.active_session() else {
            warn!("No session id set, dropping live point");
            return Ok(());
        };

        self.inner.set_status(SyncStatus::Sending);
        let _guard = SendingGuard(&self.inner);

        let payload = TrackPayload::new(session_id, vec![point.clone()]);
        match self.inner.transport.send(&payload).await {
            Ok(()) => {
                debug!("Delivered point captured at {}", point.timestamp);
                self.inner.emit(SyncEvent::SendSucceeded { point });
                Ok(())
            }
            Err(err) => {
                warn!("Send failed, buffering point offline: {}", err);
                self.inner.store.save_point(&point).await?;
                self.publish_pending_count().await?;
                self.inner.emit(SyncEvent::SendFailed {
                    point,
                    reason: err.to_string(),
                });
                Ok(())
            }
        }
    }

    /// Drains one batch from the queue. Overlapping calls return
    /// [`RecoveryOutcome::AlreadyRunning`] without touching the store.
    pub async fn recover_pending_points(&self) -> Result<RecoveryOutcome, SyncError> {
        if self
            .inner
            .recovering
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Recovery already in progress");
            return Ok(RecoveryOutcome::AlreadyRunning);
        }
        let mut guard = RecoveryGuard {
            inner: &self.inner,
            entered: false,
        };
        let scheduler = self.schedule_token();

        let Some(session_id) = self.active_session() else {
            return Ok(RecoveryOutcome::Skipped);
        };
        let pending = self.inner.store.size().await?;
        if pending == 0 {
            return Ok(RecoveryOutcome::Skipped);
        }

        guard.entered = true;
        self.inner.set_status(SyncStatus::Recovering);
        self.inner.emit(SyncEvent::RecoveryStarted { pending });

        let batch = self
            .inner
            .store
            .get_pending_points(self.inner.config.batch_size)
            .await?;
        if batch.is_empty() {
            // Everything left had expired.
            self.publish_pending_count().await?;
            return Ok(RecoveryOutcome::Skipped);
        }

        let (ids, points): (Vec<Uuid>, Vec<LocationPoint>) = batch
            .iter()
            .map(|stored: &StoredPoint| (stored.id, stored.point.as_offline_buffer()))
            .unzip();
        let count = points.len();

        let payload = TrackPayload::new(session_id, points);
        if let Err(err) = self.inner.transport.send(&payload).await {
            error!("Recovery of {} points failed: {}", count, err);
            self.inner.emit(SyncEvent::RecoveryFailed {
                reason: err.to_string(),
            });
            return Ok(RecoveryOutcome::Failed(err));
        }

        self.inner.store.remove_points(&ids).await?;
        let remaining = self.publish_pending_count().await?;
        info!("Recovered {} points, {} remaining", count, remaining);
        self.inner.emit(SyncEvent::RecoveryFinished { recovered: count });

        if remaining > 0 {
            self.schedule_follow_up(scheduler);
        }
        Ok(RecoveryOutcome::Recovered { count, remaining })
    }

    /// Arms the periodic and network-restored triggers, then kicks off an
    /// immediate pass in the background. Returns without waiting on the
    /// network. Triggers stay armed until [`Self::stop_recovery_loop`].
    pub fn start_recovery_loop(&self) {
        let mut schedule = lock(&self.inner.schedule);
        if schedule.running {
            return;
        }
        schedule.running = true;
        let token = schedule.token.clone();
        info!("Starting recovery loop");

        schedule.task = Some(tokio::spawn(recovery_loop(self.clone(), token.clone())));
        drop(schedule);

        let engine = self.clone();
        tokio::spawn(async move {
            if !token.is_cancelled() {
                engine.run_pass().await;
            }
        });
    }

    /// Tears down the timer, the connectivity subscription and any queued
    /// follow-up pass. In-flight requests complete but nothing is
    /// resubmitted.
    pub fn stop_recovery_loop(&self) {
        let mut schedule = lock(&self.inner.schedule);
        schedule.token.cancel();
        schedule.token = CancellationToken::new();
        if schedule.running {
            info!("Stopped recovery loop");
        }
        schedule.running = false;
        schedule.task = None;
    }

    pub fn is_recovery_loop_running(&self) -> bool {
        lock(&self.inner.schedule).running
    }

    fn schedule_token(&self) -> CancellationToken {
        lock(&self.inner.schedule).token.clone()
    }

    fn schedule_follow_up(&self, token: CancellationToken) {
        if token.is_cancelled() {
            return;
        }
        let engine = self.clone();
        let delay = self.inner.config.drain_delay;
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => engine.run_pass().await,
            }
        });
    }

    async fn run_pass(&self) {
        if let Err(e) = self.recover_pending_points().await {
            error!("Recovery pass aborted: {}", e);
        }
    }

    async fn publish_pending_count(&self) -> Result<usize, SyncError> {
        let count = self.inner.store.size().await?;
        self.inner.emit(SyncEvent::PendingCountChanged { count });
        Ok(count)
    }
}

async fn recovery_loop(engine: SyncEngine, token: CancellationToken) {
    let period = engine.inner.config.recovery_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut reachability = engine.inner.connectivity.subscribe();
    let mut was_online = *reachability.borrow_and_update();
    let mut notifier_alive = true;

    loop {
        let triggered = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            changed = reachability.changed(), if notifier_alive => match changed {
                Ok(()) => {
                    let online = *reachability.borrow_and_update();
                    let restored = online && !was_online;
                    was_online = online;
                    if restored {
                        info!("Network restored, recovering pending points");
                    }
                    restored
                }
                Err(_) => {
                    warn!("Connectivity notifier closed");
                    notifier_alive = false;
                    false
                }
            },
            _ = ticker.tick() => engine.inner.connectivity.is_online(),
        };

        if triggered && !token.is_cancelled() {
            engine.run_pass().await;
        }
    }
    debug!("Recovery loop exited");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
