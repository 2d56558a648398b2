//! Reversal scheduler service
//!
//! Owns the public scheduling surface (`schedule`, `cancel`, `bootstrap`) and
//! the periodic sweep task. The sweep is the timer engine: a fixed-interval
//! ticker plus a request channel, with a single-flight guard so overlapping
//! ticks are dropped rather than queued. Due records are claimed in-flight,
//! grouped by kind, and dispatched as batches with one store delete per
//! batch; failed items are requeued individually with backoff.

use crate::scheduler::{
    ActionGateway, Clock, Dispatcher, Disposition, ReversalKey, ReversalKind, ReversalNotice,
    ReversalRecord, ReversalStore, SchedulerResult, SweepRequest,
};
use chrono::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration as StdDuration;
use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, error, info};

/// Tuning knobs for the sweep engine and retry policy
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the periodic sweep runs
    pub sweep_interval: StdDuration,
    /// Retry delay after a Forbidden or unexpected failure
    pub forbidden_retry: StdDuration,
    /// First retry delay after a rate limit or transient failure; doubles
    /// per attempt
    pub transient_backoff_base: StdDuration,
    /// Upper bound on the transient backoff
    pub transient_backoff_cap: StdDuration,
    /// Maximum failed dispatches before an obligation is abandoned.
    /// `None` retries indefinitely.
    pub max_attempts: Option<u32>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: StdDuration::from_secs(30),
            forbidden_retry: StdDuration::from_secs(3600),
            transient_backoff_base: StdDuration::from_secs(30),
            transient_backoff_cap: StdDuration::from_secs(15 * 60),
            max_attempts: None,
        }
    }
}

/// Service owning the durable store and the sweep task
#[derive(Clone)]
pub struct SchedulerService {
    store: Arc<dyn ReversalStore>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    sweep_running: Arc<AtomicBool>,
    tx: Arc<RwLock<Option<Sender<SweepRequest>>>>,
}

impl SchedulerService {
    #[must_use]
    pub fn new(store: Arc<dyn ReversalStore>, clock: Arc<dyn Clock>, config: SchedulerConfig) -> Self {
        Self {
            store,
            clock,
            config,
            sweep_running: Arc::new(AtomicBool::new(false)),
            tx: Arc::new(RwLock::new(None)),
        }
    }

    /// Schedule a reversal to run after `duration`.
    ///
    /// Re-scheduling an existing key replaces it: last write wins. A zero or
    /// negative duration is valid and means "run at the next opportunity".
    ///
    /// # Errors
    /// Store failures surface here and are not retried; the caller decides
    /// whether to re-issue the administrative action.
    pub async fn schedule(&self, key: ReversalKey, duration: Duration) -> SchedulerResult<()> {
        let now = self.clock.now();
        let execute_at = now + duration;
        let record = ReversalRecord::new(key, execute_at, now);

        self.store.insert(record).await?;
        info!(%key, %execute_at, "Scheduled reversal");

        if execute_at <= now {
            self.request(SweepRequest::CheckKey(key)).await;
        }
        Ok(())
    }

    /// Cancel a pending reversal, e.g. when a moderator reverses the
    /// sanction by hand before its natural expiry.
    ///
    /// Safe to call while a dispatch for the same key is in flight: the
    /// dispatch resolves idempotently and the requeue path yields to the
    /// deletion.
    ///
    /// # Errors
    /// Store failures surface here and are not retried.
    pub async fn cancel(&self, key: ReversalKey) -> SchedulerResult<()> {
        self.store.delete(&key).await?;
        info!(%key, "Cancelled reversal");
        Ok(())
    }

    /// Recover persisted state and start the sweep task.
    ///
    /// Replays the store into the engine (the store is the only durable
    /// truth; the engine state is rebuilt from scratch here) and requests an
    /// immediate sweep so entries that came due during downtime dispatch
    /// right away instead of waiting out a full interval.
    pub async fn bootstrap(
        &self,
        gateway: Arc<dyn ActionGateway>,
        notices: Option<Sender<ReversalNotice>>,
    ) -> SchedulerResult<()> {
        let pending = self.store.list_all();
        info!(count = pending.len(), "Recovered persisted reversals");

        let mut dispatcher = Dispatcher::new(gateway, self.clock.clone(), self.config.clone());
        if let Some(tx) = notices {
            dispatcher = dispatcher.with_notices(tx);
        }

        let (tx, rx) = mpsc::channel::<SweepRequest>(100);
        *self.tx.write().await = Some(tx);

        self.clone().spawn_sweep_task(dispatcher, rx);
        self.request(SweepRequest::SweepNow).await;
        Ok(())
    }

    /// Ask the sweep task to shut down
    pub async fn shutdown(&self) {
        self.request(SweepRequest::Shutdown).await;
    }

    async fn request(&self, request: SweepRequest) {
        let tx = self.tx.read().await.clone();
        match tx {
            Some(tx) => {
                if tx.send(request).await.is_err() {
                    error!("Sweep task is gone, request dropped");
                }
            }
            None => debug!("Sweep task not started, request deferred to bootstrap"),
        }
    }

    fn spawn_sweep_task(self, dispatcher: Dispatcher, rx: Receiver<SweepRequest>) {
        tokio::spawn(async move {
            self.sweep_task(dispatcher, rx).await;
        });
    }

    /// The main loop: serve explicit requests and tick the periodic sweep
    async fn sweep_task(&self, dispatcher: Dispatcher, mut rx: Receiver<SweepRequest>) {
        info!(
            interval_secs = self.config.sweep_interval.as_secs_f64(),
            "Starting reversal sweep task"
        );

        let mut interval = tokio::time::interval(self.config.sweep_interval);

        loop {
            tokio::select! {
                Some(request) = rx.recv() => {
                    match request {
                        SweepRequest::SweepNow => {
                            debug!("Received request to sweep now");
                            self.run_sweep(&dispatcher).await;
                        }
                        SweepRequest::CheckKey(key) => {
                            debug!(%key, "Received request to check one reversal");
                            self.check_key(&dispatcher, key).await;
                        }
                        SweepRequest::Shutdown => {
                            info!("Received shutdown request for sweep task");
                            break;
                        }
                    }
                }
                _ = interval.tick() => {
                    self.run_sweep(&dispatcher).await;
                }
            }
        }

        info!("Reversal sweep task shut down");
    }

    /// One full sweep over all kinds.
    ///
    /// Single-flight: if a sweep is already running the tick is dropped,
    /// not buffered.
    async fn run_sweep(&self, dispatcher: &Dispatcher) {
        if self
            .sweep_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Sweep already in progress, dropping tick");
            return;
        }

        for kind in [
            ReversalKind::Unmute,
            ReversalKind::Unban,
            ReversalKind::RemoveRole,
        ] {
            self.sweep_kind(dispatcher, kind).await;
        }

        self.sweep_running.store(false, Ordering::SeqCst);
    }

    /// Dispatch every due record of one kind as a batch
    async fn sweep_kind(&self, dispatcher: &Dispatcher, kind: ReversalKind) {
        let now = self.clock.now();
        let due: Vec<ReversalRecord> = self
            .store
            .list_by_kind(kind)
            .into_iter()
            .filter(|record| record.is_due(now))
            .collect();

        if due.is_empty() {
            return;
        }
        debug!(%kind, count = due.len(), "Dispatching due reversals");

        let mut resolved = Vec::new();
        for record in due {
            // Claiming can fail when the record was cancelled or picked up
            // since we listed it; those are not ours to dispatch.
            let Some(claimed) = self.store.mark_in_flight(&record.key) else {
                continue;
            };

            match dispatcher.dispatch(&claimed).await {
                Disposition::Resolved => resolved.push(claimed.key),
                Disposition::Retry { execute_at } => {
                    if let Err(e) = self.store.requeue(&claimed.key, execute_at).await {
                        error!(key = %claimed.key, error = %e, "Failed to persist requeue; record stays claimed until restart");
                    }
                }
            }
        }

        if !resolved.is_empty() {
            if let Err(e) = self.store.delete_batch(&resolved).await {
                // The next sweep re-dispatches these; the reversal calls are
                // idempotent, so a duplicate fire observes NotFound.
                error!(%kind, error = %e, "Failed to delete resolved reversals");
            }
        }
    }

    /// Dispatch a single key if it is due
    async fn check_key(&self, dispatcher: &Dispatcher, key: ReversalKey) {
        let now = self.clock.now();
        let Some(record) = self.store.get(&key) else {
            return;
        };
        if !record.is_due(now) {
            return;
        }
        let Some(claimed) = self.store.mark_in_flight(&key) else {
            return;
        };

        match dispatcher.dispatch(&claimed).await {
            Disposition::Resolved => {
                if let Err(e) = self.store.delete(&key).await {
                    error!(%key, error = %e, "Failed to delete resolved reversal");
                }
            }
            Disposition::Retry { execute_at } => {
                if let Err(e) = self.store.requeue(&key, execute_at).await {
                    error!(%key, error = %e, "Failed to persist requeue");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::clock::ManualClock;
    use crate::scheduler::gateway::{GatewayOutcome, MockActionGateway};
    use crate::scheduler::store::YamlReversalStore;
    use crate::scheduler::{ReversalStatus, SystemClock};
    use std::path::PathBuf;
    use std::sync::atomic::AtomicU64;

    static STORE_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_store_path() -> PathBuf {
        let n = STORE_COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "warden-daemon-service-test-{}-{n}.yaml",
            std::process::id()
        ))
    }

    async fn service() -> (SchedulerService, Arc<YamlReversalStore>, Arc<ManualClock>) {
        let store = Arc::new(YamlReversalStore::load(temp_store_path()).await);
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let service = SchedulerService::new(
            store.clone(),
            clock.clone(),
            SchedulerConfig::default(),
        );
        (service, store, clock)
    }

    fn dispatcher_for(
        service: &SchedulerService,
        gateway: MockActionGateway,
        clock: Arc<ManualClock>,
    ) -> Dispatcher {
        Dispatcher::new(Arc::new(gateway), clock, service.config.clone())
    }

    #[tokio::test]
    async fn test_schedule_then_cancel_never_dispatches() {
        let (service, store, clock) = service().await;
        let key = ReversalKey::unmute(1, 2);

        service
            .schedule(key, Duration::milliseconds(100))
            .await
            .unwrap();
        service.cancel(key).await.unwrap();

        // A mock with no expectations panics on any call
        let gateway = MockActionGateway::new();
        let dispatcher = dispatcher_for(&service, gateway, clock.clone());

        clock.advance(Duration::hours(2));
        service.run_sweep(&dispatcher).await;

        assert!(store.get(&key).is_none());

        tokio::fs::remove_file(store.path()).await.ok();
    }

    #[tokio::test]
    async fn test_non_positive_duration_dispatches_on_next_pass() {
        let (service, store, clock) = service().await;
        let key = ReversalKey::unban(1, 2);

        let mut gateway = MockActionGateway::new();
        gateway
            .expect_remove_ban()
            .times(1)
            .returning(|_, _| GatewayOutcome::Success);
        let dispatcher = dispatcher_for(&service, gateway, clock.clone());

        // Already expired at creation time: no negative timer, just due
        service.schedule(key, Duration::seconds(-5)).await.unwrap();
        assert!(store.get(&key).unwrap().is_due(clock.now()));

        service.run_sweep(&dispatcher).await;
        assert!(store.get(&key).is_none());

        tokio::fs::remove_file(store.path()).await.ok();
    }

    #[tokio::test]
    async fn test_reschedule_same_key_last_write_wins() {
        let (service, store, clock) = service().await;
        let key = ReversalKey::unmute(1, 2);

        service.schedule(key, Duration::hours(1)).await.unwrap();
        service.schedule(key, Duration::seconds(10)).await.unwrap();

        assert_eq!(store.list_all().len(), 1);
        assert_eq!(
            store.get(&key).unwrap().execute_at,
            clock.now() + Duration::seconds(10)
        );

        let mut gateway = MockActionGateway::new();
        gateway
            .expect_remove_mute()
            .times(1)
            .returning(|_, _| GatewayOutcome::Success);
        let dispatcher = dispatcher_for(&service, gateway, clock.clone());

        // The most recent executeAt governs; exactly one dispatch happens
        clock.advance(Duration::seconds(11));
        service.run_sweep(&dispatcher).await;
        assert!(store.get(&key).is_none());

        clock.advance(Duration::hours(2));
        service.run_sweep(&dispatcher).await;

        tokio::fs::remove_file(store.path()).await.ok();
    }

    #[tokio::test]
    async fn test_not_found_deletes_and_redispatch_is_noop() {
        let (service, store, clock) = service().await;
        let key = ReversalKey::unban(1, 2);

        let mut gateway = MockActionGateway::new();
        gateway
            .expect_remove_ban()
            .times(1)
            .returning(|_, _| GatewayOutcome::NotFound);
        let dispatcher = dispatcher_for(&service, gateway, clock.clone());

        service.schedule(key, Duration::zero()).await.unwrap();
        service.run_sweep(&dispatcher).await;
        assert!(store.get(&key).is_none());

        // Forcing another pass finds nothing to do
        service.run_sweep(&dispatcher).await;
        service.check_key(&dispatcher, key).await;

        tokio::fs::remove_file(store.path()).await.ok();
    }

    #[tokio::test]
    async fn test_recovery_replays_store_after_restart() {
        let path = temp_store_path();
        let now = chrono::Utc::now();

        // A previous process persisted three reversals and died
        {
            let store = YamlReversalStore::load(&path).await;
            for (key, offset) in [
                (ReversalKey::unmute(1, 2), Duration::minutes(-10)),
                (ReversalKey::unban(1, 3), Duration::seconds(5)),
                (ReversalKey::remove_role(1, 4, 9), Duration::hours(1)),
            ] {
                store
                    .insert(ReversalRecord::new(key, now + offset, now))
                    .await
                    .unwrap();
            }
        }

        let store = Arc::new(YamlReversalStore::load(&path).await);
        let clock = Arc::new(ManualClock::new(now));
        let service =
            SchedulerService::new(store.clone(), clock.clone(), SchedulerConfig::default());

        let mut gateway = MockActionGateway::new();
        gateway
            .expect_remove_mute()
            .times(1)
            .returning(|_, _| GatewayOutcome::Success);
        gateway
            .expect_remove_ban()
            .times(1)
            .returning(|_, _| GatewayOutcome::Success);
        let dispatcher = dispatcher_for(&service, gateway, clock.clone());

        // First pass after restart: only the past-due entry fires
        service.run_sweep(&dispatcher).await;
        assert!(store.get(&ReversalKey::unmute(1, 2)).is_none());
        assert!(store.get(&ReversalKey::unban(1, 3)).is_some());

        // Five seconds later the second comes due; the hour-long one stays
        clock.advance(Duration::seconds(6));
        service.run_sweep(&dispatcher).await;
        assert!(store.get(&ReversalKey::unban(1, 3)).is_none());

        let remaining = store.list_all();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key, ReversalKey::remove_role(1, 4, 9));
        assert_eq!(remaining[0].status, ReversalStatus::Pending);

        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_forbidden_requeues_then_succeeds() {
        let (service, store, clock) = service().await;
        let key = ReversalKey::unmute(1, 2);

        let mut gateway = MockActionGateway::new();
        gateway
            .expect_remove_mute()
            .times(1)
            .returning(|_, _| GatewayOutcome::Forbidden);
        gateway
            .expect_remove_mute()
            .times(1)
            .returning(|_, _| GatewayOutcome::Success);
        let dispatcher = dispatcher_for(&service, gateway, clock.clone());

        service
            .schedule(key, Duration::milliseconds(100))
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
        service.run_sweep(&dispatcher).await;

        // Still owed: one failed attempt, re-armed an hour out
        let record = store.get(&key).expect("entry retained");
        assert_eq!(record.attempts, 1);
        assert_eq!(record.status, ReversalStatus::Pending);
        assert_eq!(record.execute_at, clock.now() + Duration::hours(1));

        // Not due before the backoff elapses
        clock.advance(Duration::minutes(30));
        service.run_sweep(&dispatcher).await;
        assert!(store.get(&key).is_some());

        clock.advance(Duration::minutes(31));
        service.run_sweep(&dispatcher).await;
        assert!(store.get(&key).is_none());

        tokio::fs::remove_file(store.path()).await.ok();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_cancel_and_dispatch() {
        let (service, store, clock) = service().await;
        let key = ReversalKey::unmute(1, 2);

        let mut gateway = MockActionGateway::new();
        // The race decides whether the gateway is reached; both outcomes
        // are legal, double-firing is not.
        gateway
            .expect_remove_mute()
            .times(0..=1)
            .returning(|_, _| GatewayOutcome::Success);
        let dispatcher = dispatcher_for(&service, gateway, clock.clone());

        service.schedule(key, Duration::seconds(-1)).await.unwrap();

        let cancel = service.cancel(key);
        let sweep = service.run_sweep(&dispatcher);
        let (cancelled, ()) = tokio::join!(cancel, sweep);
        cancelled.unwrap();

        assert!(store.get(&key).is_none());

        tokio::fs::remove_file(store.path()).await.ok();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_overlapping_sweeps_dispatch_once() {
        let (service, store, clock) = service().await;
        let key = ReversalKey::unban(1, 2);

        let mut gateway = MockActionGateway::new();
        gateway.expect_remove_ban().times(1).returning(|_, _| {
            std::thread::sleep(std::time::Duration::from_millis(50));
            GatewayOutcome::Success
        });
        let dispatcher = dispatcher_for(&service, gateway, clock.clone());

        service.schedule(key, Duration::seconds(-1)).await.unwrap();

        let first = service.run_sweep(&dispatcher);
        let second = service.run_sweep(&dispatcher);
        tokio::join!(first, second);

        assert!(store.get(&key).is_none());

        tokio::fs::remove_file(store.path()).await.ok();
    }

    #[tokio::test]
    async fn test_bootstrap_starts_task_and_clears_past_due() {
        let path = temp_store_path();
        let now = chrono::Utc::now();

        {
            let store = YamlReversalStore::load(&path).await;
            store
                .insert(ReversalRecord::new(
                    ReversalKey::unban(1, 2),
                    now - Duration::minutes(5),
                    now,
                ))
                .await
                .unwrap();
        }

        let store = Arc::new(YamlReversalStore::load(&path).await);
        let config = SchedulerConfig {
            sweep_interval: StdDuration::from_millis(50),
            ..SchedulerConfig::default()
        };
        let service = SchedulerService::new(store.clone(), Arc::new(SystemClock), config);

        let mut gateway = MockActionGateway::new();
        gateway
            .expect_remove_ban()
            .times(1)
            .returning(|_, _| GatewayOutcome::Success);

        service.bootstrap(Arc::new(gateway), None).await.unwrap();

        let mut cleared = false;
        for _ in 0..100 {
            if store.get(&ReversalKey::unban(1, 2)).is_none() {
                cleared = true;
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(20)).await;
        }
        assert!(cleared, "past-due reversal not dispatched after bootstrap");

        service.shutdown().await;
        tokio::fs::remove_file(&path).await.ok();
    }
}
