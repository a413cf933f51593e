use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use cadence_core::config::SchedulerConfig;
use cadence_core::ScheduleTime;
use cadence_sessions::{SessionStore, SessionView, StatusUpdate, StoreError};
use chrono::{DateTime, FixedOffset, Utc};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{
    cadence::Cadence,
    clock::{Clock, SystemClock},
    cycle::{reference_date, resolve_cycle},
    error::{Result, SchedulerError},
    status::{phase_at, SessionPhase},
    transition::plan_transition,
    types::{RecomputeReport, ResultPendingNotice, SchedulerStatus, StartOutcome, SweepReport},
};

/// Tunables for a [`SweepScheduler`].
#[derive(Debug, Clone)]
pub struct SweepSettings {
    /// Fixed offset of the reference timezone.
    pub offset: FixedOffset,
    pub sweep_every: Duration,
    /// Wall-clock mark of the daily cycle recompute.
    pub daily_recompute_at: ScheduleTime,
    /// Bound on every individual store call.
    pub store_timeout: Duration,
}

impl SweepSettings {
    pub fn from_config(config: &SchedulerConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| SchedulerError::InvalidSettings(e.to_string()))?;
        let offset = config
            .offset()
            .map_err(|e| SchedulerError::InvalidSettings(e.to_string()))?;
        let daily_recompute_at = config
            .daily_recompute_time()
            .map_err(|e| SchedulerError::InvalidSettings(e.to_string()))?;
        Ok(Self {
            offset,
            sweep_every: Duration::from_secs(config.sweep_interval_secs),
            daily_recompute_at,
            store_timeout: Duration::from_millis(config.store_timeout_ms),
        })
    }

    pub fn sweep_cadence(&self) -> Cadence {
        Cadence::Every(self.sweep_every)
    }

    pub fn recompute_cadence(&self) -> Cadence {
        Cadence::DailyAt(self.daily_recompute_at)
    }
}

/// Last-known timer state, read by `status()`.
#[derive(Default)]
struct Telemetry {
    next_sweep_at: Option<DateTime<Utc>>,
    next_recompute_at: Option<DateTime<Utc>>,
    last_sweep: Option<SweepReport>,
    last_recompute: Option<RecomputeReport>,
}

struct Inner {
    store: Arc<dyn SessionStore>,
    settings: SweepSettings,
    clock: Arc<dyn Clock>,
    /// If set, raised result flags are announced here.
    result_tx: Option<mpsc::Sender<ResultPendingNotice>>,
    /// Serialises sweep passes; timer ticks skip while it is held.
    sweep_gate: Mutex<()>,
    recompute_gate: Mutex<()>,
    telemetry: StdMutex<Telemetry>,
}

/// Handles of the two recurring jobs while the scheduler runs.
struct Running {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

/// Periodically reconciles every active session's persisted status with
/// the status its schedule implies right now.
///
/// Construct one per service and share it by reference; `start`/`stop`
/// are owned by the host's startup and shutdown sequence.
pub struct SweepScheduler {
    inner: Arc<Inner>,
    running: Mutex<Option<Running>>,
}

impl SweepScheduler {
    /// Create a scheduler on the system clock.
    ///
    /// Pass `Some(tx)` to receive a [`ResultPendingNotice`] whenever a pass
    /// raises a result flag. The sender is non-blocking (`try_send`) so a
    /// slow consumer never stalls a pass.
    pub fn new(
        store: Arc<dyn SessionStore>,
        settings: SweepSettings,
        result_tx: Option<mpsc::Sender<ResultPendingNotice>>,
    ) -> Self {
        Self::with_clock(store, settings, result_tx, Arc::new(SystemClock))
    }

    /// Same as [`SweepScheduler::new`] with an injected clock, e.g. a
    /// [`crate::ManualClock`].
    pub fn with_clock(
        store: Arc<dyn SessionStore>,
        settings: SweepSettings,
        result_tx: Option<mpsc::Sender<ResultPendingNotice>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                settings,
                clock,
                result_tx,
                sweep_gate: Mutex::new(()),
                recompute_gate: Mutex::new(()),
                telemetry: StdMutex::new(Telemetry::default()),
            }),
            running: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &SweepSettings {
        &self.inner.settings
    }

    /// Run one sweep immediately, then arm the sweep and daily recompute timers.
    ///
    /// Calling it again while running is a no-op that reports `AlreadyRunning`.
    pub async fn start(&self) -> StartOutcome {
        let mut running = self.running.lock().await;
        if running.is_some() {
            info!("sweep scheduler already running");
            return StartOutcome::AlreadyRunning;
        }

        let settings = &self.inner.settings;
        info!(
            cadence = %settings.sweep_cadence(),
            recompute = %settings.recompute_cadence(),
            "starting sweep scheduler"
        );

        {
            let _gate = self.inner.sweep_gate.lock().await;
            if let Err(e) = self.inner.sweep_pass().await {
                error!("initial sweep failed: {e}");
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweep = tokio::spawn(sweep_loop(Arc::clone(&self.inner), shutdown_rx.clone()));
        let recompute = tokio::spawn(recompute_loop(Arc::clone(&self.inner), shutdown_rx));
        *running = Some(Running {
            shutdown_tx,
            tasks: vec![sweep, recompute],
        });
        info!("sweep scheduler started");
        StartOutcome::Started
    }

    /// Cancel both timers and wait for an in-flight pass to finish.
    ///
    /// Returns `false` when the scheduler was not running.
    pub async fn stop(&self) -> bool {
        let Some(running) = self.running.lock().await.take() else {
            debug!("stop requested but sweep scheduler is not running");
            return false;
        };
        let _ = running.shutdown_tx.send(true);
        for task in running.tasks {
            if let Err(e) = task.await {
                warn!("scheduler task ended abnormally: {e}");
            }
        }
        self.inner.with_telemetry(|t| {
            t.next_sweep_at = None;
            t.next_recompute_at = None;
        });
        info!("sweep scheduler stopped");
        true
    }

    /// Run one sweep pass now. Waits for an in-flight pass rather than overlapping it.
    pub async fn trigger_sweep_now(&self) -> Result<SweepReport> {
        let _gate = self.inner.sweep_gate.lock().await;
        self.inner.sweep_pass().await
    }

    /// Recompute cached cycle instants for the current reference day.
    ///
    /// With `force_all = false` only sessions whose cache is missing or
    /// differs from the freshly resolved cycle are written.
    pub async fn recompute_cycle_instants_now(&self, force_all: bool) -> Result<RecomputeReport> {
        self.inner.recompute(force_all).await
    }

    pub async fn status(&self) -> SchedulerStatus {
        let is_running = self.running.lock().await.is_some();
        let settings = &self.inner.settings;
        self.inner.with_telemetry(|t| SchedulerStatus {
            is_running,
            cadence: settings.sweep_cadence(),
            daily_recompute: settings.recompute_cadence(),
            next_sweep_at: t.next_sweep_at,
            next_recompute_at: t.next_recompute_at,
            last_sweep: t.last_sweep.clone(),
            last_recompute: t.last_recompute.clone(),
        })
    }
}

impl Inner {
    fn with_telemetry<T>(&self, f: impl FnOnce(&mut Telemetry) -> T) -> T {
        let mut telemetry = self.telemetry.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut telemetry)
    }

    /// Await a store call under the configured timeout; elapsed counts as transient.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = cadence_sessions::error::Result<T>>,
    ) -> Result<T> {
        let limit = self.settings.store_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StoreError::Transient(format!(
                "store call exceeded {}ms",
                limit.as_millis()
            ))
            .into()),
        }
    }

    fn target_phase(&self, session: &SessionView, now: DateTime<Utc>) -> Result<SessionPhase> {
        let schedule = session.schedule.parse()?;
        Ok(phase_at(now, &schedule, self.settings.offset))
    }

    /// One reconciliation pass. Callers must hold `sweep_gate`.
    ///
    /// Only a failure to load the session list fails the pass; per-session
    /// errors are logged, counted and left for the next tick.
    async fn sweep_pass(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::new(now);
        debug!(at = %now, "running sweep");

        let sessions = self.bounded(self.store.list_active()).await?;

        for session in &sessions {
            report.examined += 1;

            let target = match self.target_phase(session, now) {
                Ok(phase) => phase,
                Err(e) => {
                    warn!(session_id = %session.id, name = %session.name, "skipping session, schedule needs correction: {e}");
                    report.malformed += 1;
                    continue;
                }
            };

            let Some(update) = plan_transition(target, session, now) else {
                report.unchanged += 1;
                continue;
            };

            match self.bounded(self.store.apply_status(&session.id, &update)).await {
                Ok(()) => {
                    debug!(session_id = %session.id, %target, write = update.label(), "status written");
                    match update {
                        StatusUpdate::Open { .. } => report.opened += 1,
                        StatusUpdate::Closed { .. } => report.closed += 1,
                        StatusUpdate::ResultPending { at } => {
                            report.result_pending += 1;
                            self.announce_result_pending(session, at);
                        }
                    }
                }
                Err(SchedulerError::Store(StoreError::WriteConflict { .. })) => {
                    debug!(session_id = %session.id, "session changed underneath the sweep; re-evaluating next tick");
                    report.conflicts += 1;
                }
                Err(e) => {
                    error!(session_id = %session.id, write = update.label(), "status write failed: {e}");
                    report.failed += 1;
                }
            }
        }

        info!(
            examined = report.examined,
            opened = report.opened,
            closed = report.closed,
            result_pending = report.result_pending,
            malformed = report.malformed,
            failed = report.failed,
            "sweep summary"
        );
        self.with_telemetry(|t| t.last_sweep = Some(report.clone()));
        Ok(report)
    }

    fn announce_result_pending(&self, session: &SessionView, at: DateTime<Utc>) {
        let Some(ref tx) = self.result_tx else {
            return;
        };
        let notice = ResultPendingNotice {
            session_id: session.id.clone(),
            name: session.name.clone(),
            flagged_at: at,
        };
        // try_send never blocks the pass; log a warning if the channel is full.
        if tx.try_send(notice).is_err() {
            warn!(session_id = %session.id, "result notice channel full or closed, notice dropped");
        }
    }

    async fn recompute(&self, force_all: bool) -> Result<RecomputeReport> {
        let _gate = self.recompute_gate.lock().await;
        let now = self.clock.now();
        let anchor = reference_date(now, self.settings.offset);
        let mut report = RecomputeReport {
            anchor,
            forced: force_all,
            examined: 0,
            updated: 0,
            unchanged: 0,
            malformed: 0,
            failed: 0,
        };
        info!(%anchor, force_all, "recomputing cycle instants");

        let sessions = self.bounded(self.store.list_active()).await?;
        for session in &sessions {
            report.examined += 1;
            let schedule = match session.schedule.parse() {
                Ok(s) => s,
                Err(e) => {
                    warn!(session_id = %session.id, "cannot resolve cycle: {e}");
                    report.malformed += 1;
                    continue;
                }
            };

            let instants = resolve_cycle(anchor, &schedule, self.settings.offset);
            if !force_all && session.cached == Some(instants) {
                report.unchanged += 1;
                continue;
            }

            match self
                .bounded(self.store.update_cached_instants(&session.id, &instants))
                .await
            {
                Ok(()) => {
                    debug!(
                        session_id = %session.id,
                        start = %instants.start,
                        end = %instants.end,
                        result = %instants.result,
                        "cycle instants cached"
                    );
                    report.updated += 1;
                }
                Err(e) => {
                    error!(session_id = %session.id, "caching cycle instants failed: {e}");
                    report.failed += 1;
                }
            }
        }

        info!(
            updated = report.updated,
            unchanged = report.unchanged,
            failed = report.failed,
            "cycle instants recomputed"
        );
        self.with_telemetry(|t| t.last_recompute = Some(report.clone()));
        Ok(report)
    }
}

/// Fire a sweep every `sweep_every` until shutdown. The first tick is one
/// period out because `start` has already swept.
async fn sweep_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let cadence = inner.settings.sweep_cadence();
    let period = inner.settings.sweep_every;
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    inner.with_telemetry(|t| {
        t.next_sweep_at = Some(cadence.next_fire(inner.clock.now(), inner.settings.offset))
    });

    loop {
        tokio::select! {
            _ = interval.tick() => {
                inner.with_telemetry(|t| {
                    t.next_sweep_at = Some(cadence.next_fire(inner.clock.now(), inner.settings.offset))
                });
                match inner.sweep_gate.try_lock() {
                    Ok(_gate) => {
                        if let Err(e) = inner.sweep_pass().await {
                            error!("sweep failed: {e}");
                        }
                    }
                    Err(_) => debug!("previous sweep still running, tick skipped"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("sweep timer shutting down");
                    break;
                }
            }
        }
    }
}

/// Sleep until the next daily mark, recompute every active session, repeat.
async fn recompute_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let cadence = inner.settings.recompute_cadence();

    loop {
        let now = inner.clock.now();
        let next = cadence.next_fire(now, inner.settings.offset);
        inner.with_telemetry(|t| t.next_recompute_at = Some(next));
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        debug!(next = %next, "daily recompute armed");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                if let Err(e) = inner.recompute(true).await {
                    error!("daily cycle recompute failed: {e}");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("recompute timer shutting down");
                    break;
                }
            }
        }
    }
}
