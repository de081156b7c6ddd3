// ── Monitor ──
//
// Full lifecycle management for one alert backend: the push connection,
// periodic polling, resolve round-trips, and reactive view publishing.
// One engine task owns the `ReconciliationEngine`; everything else talks
// to it through the command channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use skywatch_api::transport::{TlsMode, TransportConfig};
use skywatch_api::{AlertClient, AlertPayload, ConnectionState, WebSocketHandle};

use crate::config::{MonitorConfig, TlsVerification};
use crate::engine::{
    PollOutcome, PollStatus, PushOutcome, ReconciledView, ReconciliationEngine, ResolveStart,
};
use crate::error::CoreError;
use crate::model::{
    Alert, AlertFilter, AlertId, AlertOrigin, AlertStats, SourcedStats, StatsSource,
};
use crate::stream::ViewStream;

const COMMAND_CHANNEL_SIZE: usize = 64;
const NOTIFICATION_CHANNEL_SIZE: usize = 256;

// ── ResolveOutcome ───────────────────────────────────────────────

/// Result of [`Monitor::resolve`]. Backend rejections are errors instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveOutcome {
    /// The backend accepted the resolution.
    Resolved,
    /// Nothing to do; no backend call was made.
    AlreadyResolved,
    /// Another resolve for the same alert is still in flight.
    InProgress,
    /// No alert with this id is in the current view's sources.
    NotFound,
}

// ── Engine commands ──────────────────────────────────────────────

enum EngineCommand {
    ApplyPoll {
        alerts: Vec<Alert>,
        filter: AlertFilter,
        reply: oneshot::Sender<PollOutcome>,
    },
    PollFailed {
        filter: AlertFilter,
        message: String,
    },
    SetFilter {
        filter: AlertFilter,
        reply: oneshot::Sender<bool>,
    },
    BeginResolve {
        id: AlertId,
        reply: oneshot::Sender<ResolveStart>,
    },
    FinishResolve {
        id: AlertId,
        accepted: bool,
        reply: oneshot::Sender<()>,
    },
    ComputeStats {
        window_hours: u32,
        now: DateTime<Utc>,
        reply: oneshot::Sender<AlertStats>,
    },
}

// ── Monitor ──────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<MonitorInner>`. Call [`start()`](Self::start)
/// to spawn the background tasks and [`stop()`](Self::stop) to tear them
/// down; a stopped monitor cannot be restarted.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    config: MonitorConfig,
    client: AlertClient,
    authorization: Option<String>,
    started: AtomicBool,
    view_tx: watch::Sender<Arc<ReconciledView>>,
    connection_state: watch::Sender<ConnectionState>,
    poll_status: watch::Sender<PollStatus>,
    filter_tx: watch::Sender<AlertFilter>,
    notification_tx: broadcast::Sender<Arc<Alert>>,
    command_tx: mpsc::Sender<EngineCommand>,
    command_rx: Mutex<Option<mpsc::Receiver<EngineCommand>>>,
    cancel: CancellationToken,
    ws_handle: Mutex<Option<WebSocketHandle>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Monitor {
    /// Create a monitor. Does NOT connect or poll until
    /// [`start()`](Self::start).
    pub fn new(config: MonitorConfig) -> Result<Self, CoreError> {
        let transport = build_transport(&config);
        let client = AlertClient::new(config.api_url.clone(), &transport)?;
        let authorization = transport.authorization();

        let initial_view = ReconciledView {
            alerts: Vec::new(),
            filter: config.filter.clone(),
        };
        let (view_tx, _) = watch::channel(Arc::new(initial_view));
        // A push-enabled monitor is on its way to connecting until `start()`.
        let initial_state = if config.push_enabled {
            ConnectionState::Connecting
        } else {
            ConnectionState::Disconnected
        };
        let (connection_state, _) = watch::channel(initial_state);
        let (poll_status, _) = watch::channel(PollStatus::default());
        let (filter_tx, _) = watch::channel(config.filter.clone());
        let (notification_tx, _) = broadcast::channel(NOTIFICATION_CHANNEL_SIZE);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);

        Ok(Self {
            inner: Arc::new(MonitorInner {
                config,
                client,
                authorization,
                started: AtomicBool::new(false),
                view_tx,
                connection_state,
                poll_status,
                filter_tx,
                notification_tx,
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
                cancel: CancellationToken::new(),
                ws_handle: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Access the monitor configuration.
    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Spawn the engine task, the poll task (if `poll_interval_secs > 0`,
    /// polling immediately) and the push connection (if enabled).
    pub async fn start(&self) -> Result<(), CoreError> {
        let config = &self.inner.config;
        let push_url = if config.push_enabled {
            Some(config.push_url()?)
        } else {
            None
        };

        let Some(command_rx) = self.inner.command_rx.lock().await.take() else {
            return Err(CoreError::Internal("monitor already started".into()));
        };
        self.inner.started.store(true, Ordering::Release);

        let mut push_rx = None;
        let mut ws_state = None;
        if let Some(url) = push_url {
            let handle = WebSocketHandle::connect(
                url,
                config.reconnect.clone(),
                self.inner.cancel.child_token(),
                self.inner.authorization.clone(),
            );
            push_rx = Some(handle.subscribe());
            let state_rx = handle.connection_state();
            self.inner.connection_state.send_replace(*state_rx.borrow());
            ws_state = Some(state_rx);
            *self.inner.ws_handle.lock().await = Some(handle);
        }

        let engine = ReconciliationEngine::new(config.filter.clone());
        let mut handles = self.inner.task_handles.lock().await;
        handles.push(tokio::spawn(engine_task(
            self.clone(),
            engine,
            command_rx,
            push_rx,
            ws_state,
        )));

        if config.poll_interval_secs > 0 {
            handles.push(tokio::spawn(poll_task(
                self.clone(),
                config.poll_interval_secs,
                self.inner.cancel.clone(),
            )));
        }

        info!(
            api = %config.api_url,
            push = config.push_enabled,
            poll_interval_secs = config.poll_interval_secs,
            "monitor started"
        );
        Ok(())
    }

    /// Cancel background tasks, close the push connection and wait for
    /// everything to wind down.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();

        if let Some(handle) = self.inner.ws_handle.lock().await.take() {
            handle.shutdown();
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        self.inner.started.store(false, Ordering::Release);
        self.inner
            .connection_state
            .send_replace(ConnectionState::Disconnected);
        debug!("monitor stopped");
    }

    // ── One-shot convenience ─────────────────────────────────────

    /// One-shot: start, run closure, stop.
    ///
    /// Optimized for CLI: no push connection and no poll timer. Call
    /// [`refresh()`](Self::refresh) inside the closure to load data.
    pub async fn oneshot<F, Fut, T>(config: MonitorConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Monitor) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.push_enabled = false;
        cfg.poll_interval_secs = 0;

        let monitor = Monitor::new(cfg)?;
        monitor.start().await?;
        let result = f(monitor.clone()).await;
        monitor.stop().await;
        result
    }

    // ── Operations ───────────────────────────────────────────────

    /// Poll the backend once under the active filter.
    pub async fn refresh(&self) -> Result<PollOutcome, CoreError> {
        self.ensure_started()?;
        self.poll_once().await
    }

    /// Switch the active filter. A running poll task re-polls right away;
    /// any response still in flight for the old filter is discarded.
    pub async fn set_filter(&self, filter: AlertFilter) -> Result<(), CoreError> {
        let changed = self
            .request(|reply| EngineCommand::SetFilter {
                filter: filter.clone(),
                reply,
            })
            .await?;

        if changed {
            self.inner.filter_tx.send_replace(filter);
        }
        Ok(())
    }

    /// Resolve an alert: optimistic mark, backend call, then confirm or
    /// revert.
    pub async fn resolve(&self, id: &AlertId) -> Result<ResolveOutcome, CoreError> {
        let start = self
            .request(|reply| EngineCommand::BeginResolve {
                id: id.clone(),
                reply,
            })
            .await?;

        match start {
            ResolveStart::NotFound => Ok(ResolveOutcome::NotFound),
            ResolveStart::AlreadyResolved => Ok(ResolveOutcome::AlreadyResolved),
            ResolveStart::InProgress => Ok(ResolveOutcome::InProgress),
            ResolveStart::Pending => {
                let result = self.inner.client.resolve_alert(id.as_str()).await;
                let accepted = result.is_ok();

                self.request(|reply| EngineCommand::FinishResolve {
                    id: id.clone(),
                    accepted,
                    reply,
                })
                .await?;

                match result {
                    Ok(()) => {
                        info!(%id, "alert resolved");
                        Ok(ResolveOutcome::Resolved)
                    }
                    Err(e) => {
                        warn!(%id, error = %e, "resolve rejected, reverting");
                        Err(resolve_error(id, e))
                    }
                }
            }
        }
    }

    /// Alert counts for the trailing window. Asks the backend first and
    /// falls back to [`local_stats`](Self::local_stats) on failure.
    ///
    /// The fallback needs a view that has been polled at least once. If no
    /// poll has succeeded yet, one is attempted; when that fails too, the
    /// original backend error is returned instead of empty counts.
    pub async fn stats(&self, window_hours: u32) -> Result<SourcedStats, CoreError> {
        self.ensure_started()?;
        let err = match self.inner.client.alert_stats(window_hours).await {
            Ok(raw) => {
                return Ok(SourcedStats {
                    source: StatsSource::Backend,
                    stats: AlertStats::from(raw),
                });
            }
            Err(e) => CoreError::from(e),
        };

        warn!(error = %err, "backend stats unavailable, counting the local view");
        if self.poll_status().last_success.is_none() {
            self.poll_once().await.map_err(|poll_err| {
                debug!(error = %poll_err, "no polled view to count");
                err
            })?;
        }

        Ok(SourcedStats {
            source: StatsSource::Local,
            stats: self.local_stats(window_hours).await?,
        })
    }

    /// Alert counts computed from the current view.
    pub async fn local_stats(&self, window_hours: u32) -> Result<AlertStats, CoreError> {
        self.request(|reply| EngineCommand::ComputeStats {
            window_hours,
            now: Utc::now(),
            reply,
        })
        .await
    }

    // ── State observation ────────────────────────────────────────

    /// The latest reconciled view.
    pub fn view(&self) -> Arc<ReconciledView> {
        self.inner.view_tx.borrow().clone()
    }

    /// Subscribe to view changes.
    pub fn subscribe_view(&self) -> ViewStream {
        ViewStream::new(self.inner.view_tx.subscribe())
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.connection_state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    pub fn poll_status(&self) -> PollStatus {
        self.inner.poll_status.borrow().clone()
    }

    /// The active filter.
    pub fn filter(&self) -> AlertFilter {
        self.inner.filter_tx.borrow().clone()
    }

    /// One message per newly arrived push alert.
    pub fn notifications(&self) -> broadcast::Receiver<Arc<Alert>> {
        self.inner.notification_tx.subscribe()
    }

    // ── Internals ────────────────────────────────────────────────

    fn ensure_started(&self) -> Result<(), CoreError> {
        if self.inner.started.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CoreError::NotRunning)
        }
    }

    /// Send a command to the engine task and await its reply.
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T, CoreError> {
        self.ensure_started()?;
        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(make(tx))
            .await
            .map_err(|_| CoreError::NotRunning)?;
        rx.await.map_err(|_| CoreError::NotRunning)
    }

    async fn poll_once(&self) -> Result<PollOutcome, CoreError> {
        let filter = self.inner.filter_tx.borrow().clone();
        let query = filter.to_query(self.inner.config.window_hours, self.inner.config.poll_limit);

        match self.inner.client.list_alerts(&query).await {
            Ok(payloads) => {
                let alerts: Vec<Alert> = payloads
                    .into_iter()
                    .map(|p| Alert::from_payload(p, AlertOrigin::Polled))
                    .collect();
                let count = alerts.len();
                let outcome = self
                    .request(|reply| EngineCommand::ApplyPoll {
                        alerts,
                        filter,
                        reply,
                    })
                    .await?;
                debug!(count, ?outcome, "poll complete");
                Ok(outcome)
            }
            Err(e) => {
                let err = CoreError::from(e);
                self.inner
                    .command_tx
                    .send(EngineCommand::PollFailed {
                        filter,
                        message: err.to_string(),
                    })
                    .await
                    .map_err(|_| CoreError::NotRunning)?;
                Err(err)
            }
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Owns the engine. Applies commands and push alerts, publishes views.
async fn engine_task(
    monitor: Monitor,
    mut engine: ReconciliationEngine,
    mut commands: mpsc::Receiver<EngineCommand>,
    mut push_rx: Option<broadcast::Receiver<Arc<AlertPayload>>>,
    mut ws_state: Option<watch::Receiver<ConnectionState>>,
) {
    let inner = &monitor.inner;
    let cancel = inner.cancel.clone();
    publish(inner, &engine);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            cmd = commands.recv() => {
                let Some(cmd) = cmd else { break };
                apply_command(inner, &mut engine, cmd);
            }
            state = next_state(&mut ws_state) => match state {
                Some(state) => {
                    debug!(%state, "connection state changed");
                    inner.connection_state.send_replace(state);
                }
                None => ws_state = None,
            },
            event = next_push(&mut push_rx) => match event {
                Ok(payload) => {
                    let alert = Alert::from_payload((*payload).clone(), AlertOrigin::Push);
                    let outcome = engine.on_push_alert(alert.clone());
                    debug!(?outcome, city = %alert.city, "push alert applied");
                    publish(inner, &engine);
                    if outcome == PushOutcome::Inserted {
                        let _ = inner.notification_tx.send(Arc::new(alert));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "push receiver lagged, alerts dropped");
                }
                Err(RecvError::Closed) => push_rx = None,
            },
        }
    }

    debug!("engine task exiting");
}

fn apply_command(inner: &MonitorInner, engine: &mut ReconciliationEngine, cmd: EngineCommand) {
    match cmd {
        EngineCommand::ApplyPoll {
            alerts,
            filter,
            reply,
        } => {
            let outcome = engine.on_poll_result(alerts, &filter);
            if outcome == PollOutcome::Applied {
                publish(inner, engine);
            }
            let _ = reply.send(outcome);
        }
        EngineCommand::PollFailed { filter, message } => {
            warn!(%filter, error = %message, "alert poll failed");
            engine.on_poll_failed(&filter, message);
            inner.poll_status.send_replace(engine.poll_status().clone());
        }
        EngineCommand::SetFilter { filter, reply } => {
            let changed = engine.set_filter(filter);
            if changed {
                publish(inner, engine);
            }
            let _ = reply.send(changed);
        }
        EngineCommand::BeginResolve { id, reply } => {
            let start = engine.begin_resolve(&id);
            if start == ResolveStart::Pending {
                publish(inner, engine);
            }
            let _ = reply.send(start);
        }
        EngineCommand::FinishResolve {
            id,
            accepted,
            reply,
        } => {
            engine.finish_resolve(&id, accepted);
            publish(inner, engine);
            let _ = reply.send(());
        }
        EngineCommand::ComputeStats {
            window_hours,
            now,
            reply,
        } => {
            let _ = reply.send(engine.compute_stats(window_hours, now));
        }
    }
}

fn publish(inner: &MonitorInner, engine: &ReconciliationEngine) {
    inner.view_tx.send_replace(Arc::new(engine.compute_view()));
    inner.poll_status.send_replace(engine.poll_status().clone());
}

async fn next_push(
    rx: &mut Option<broadcast::Receiver<Arc<AlertPayload>>>,
) -> Result<Arc<AlertPayload>, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_state(rx: &mut Option<watch::Receiver<ConnectionState>>) -> Option<ConnectionState> {
    match rx {
        Some(rx) => {
            rx.changed().await.ok()?;
            Some(*rx.borrow_and_update())
        }
        None => std::future::pending().await,
    }
}

/// Poll immediately, then every `interval_secs`, and again whenever the
/// filter changes.
async fn poll_task(monitor: Monitor, interval_secs: u64, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut filter_rx = monitor.inner.filter_tx.subscribe();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Ok(()) = filter_rx.changed() => interval.reset(),
            _ = interval.tick() => {}
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = monitor.poll_once() => {
                if let Err(e) = result {
                    debug!(error = %e, "scheduled poll failed");
                }
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Build a [`TransportConfig`] from the monitor configuration.
fn build_transport(config: &MonitorConfig) -> TransportConfig {
    TransportConfig {
        tls: tls_to_transport(&config.tls),
        timeout: config.timeout,
        bearer_token: config.token.clone(),
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}

fn resolve_error(id: &AlertId, err: skywatch_api::Error) -> CoreError {
    if err.is_not_found() {
        return CoreError::AlertNotFound { id: id.to_string() };
    }
    let reason = match err {
        skywatch_api::Error::Api { message, .. } => message,
        other => other.to_string(),
    };
    CoreError::ResolveRejected {
        id: id.to_string(),
        reason,
    }
}
