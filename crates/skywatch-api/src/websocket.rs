//! Live alert push stream with auto-reconnect.
//!
//! Connects to the backend's `/ws` endpoint and streams decoded alerts
//! through a [`tokio::sync::broadcast`] channel. The connection state is
//! published on a [`tokio::sync::watch`] channel. Reconnection follows a
//! [`ReconnectConfig`] schedule, either the fixed delay of the reference
//! client or capped exponential backoff with jitter.
//!
//! # Example
//!
//! ```rust,ignore
//! use skywatch_api::websocket::{ReconnectConfig, WebSocketHandle};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let ws_url = Url::parse("ws://localhost:8000/ws")?;
//! let handle = WebSocketHandle::connect(ws_url, ReconnectConfig::default(), CancellationToken::new(), None);
//! let mut rx = handle.subscribe();
//!
//! while let Ok(alert) = rx.recv().await {
//!     println!("{}: {}", alert.city, alert.message);
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::models::{AlertPayload, decode_alert};

// ── Broadcast channel capacity ───────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 256;

// ── ConnectionState ──────────────────────────────────────────────────

/// State of the push connection. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Establishing the connection. Initial state.
    Connecting,
    /// Handshake succeeded; alerts are flowing.
    Connected,
    /// The connection ended (remote close or stream end). Waiting to retry.
    Disconnected,
    /// A transport error ended the connection. Waiting to retry.
    Errored,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// True while push alerts can not arrive, i.e. the view may be stale.
    pub fn is_offline(self) -> bool {
        matches!(self, Self::Disconnected | Self::Errored)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::Errored => "Error",
        };
        f.write_str(label)
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Backoff configuration for WebSocket reconnection.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 3s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 60s.
    pub max_delay: Duration,

    /// Growth factor per consecutive failure. `1.0` gives a fixed delay.
    pub multiplier: f64,

    /// Spread delays by up to +-25%.
    pub jitter: bool,

    /// Maximum consecutive failed attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
            max_retries: None,
        }
    }
}

impl ReconnectConfig {
    /// Constant delay between attempts, no jitter.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter: false,
            max_retries: None,
        }
    }
}

// ── WebSocketHandle ──────────────────────────────────────────────────

/// Handle to a running push connection.
///
/// The background task lives until [`shutdown`](Self::shutdown) is called,
/// the cancellation token fires, or the handle is dropped.
pub struct WebSocketHandle {
    event_rx: broadcast::Receiver<Arc<AlertPayload>>,
    state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl WebSocketHandle {
    /// Spawn the connection loop and return immediately.
    ///
    /// The first connection attempt happens asynchronously. `authorization`
    /// is sent verbatim as the `Authorization` header of the upgrade request.
    pub fn connect(
        ws_url: Url,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
        authorization: Option<String>,
    ) -> Self {
        let (event_tx, event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            ws_loop(
                ws_url,
                event_tx,
                state_tx,
                reconnect,
                task_cancel,
                authorization,
            )
            .await;
        });

        Self {
            event_rx,
            state_rx,
            cancel,
        }
    }

    /// Get a new broadcast receiver for decoded alerts.
    ///
    /// If a consumer falls behind, it receives
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<AlertPayload>> {
        self.event_rx.resubscribe()
    }

    /// Watch the connection state.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Signal the background task to shut down. Cancels any pending retry.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WebSocketHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on close or error, wait → reconnect.
async fn ws_loop(
    ws_url: Url,
    event_tx: broadcast::Sender<Arc<AlertPayload>>,
    state_tx: watch::Sender<ConnectionState>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
    authorization: Option<String>,
) {
    let mut attempt: u32 = 0;

    loop {
        state_tx.send_replace(ConnectionState::Connecting);

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&ws_url, &event_tx, &state_tx, &cancel, authorization.as_deref()) => result,
        };

        if cancel.is_cancelled() {
            break;
        }

        // A session that reached Connected resets the failure counter.
        if state_tx.borrow().is_connected() {
            attempt = 0;
        }

        match result {
            Ok(()) => {
                tracing::info!("WebSocket disconnected");
                state_tx.send_replace(ConnectionState::Disconnected);
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "WebSocket error");
                state_tx.send_replace(ConnectionState::Errored);
            }
        }

        if let Some(max) = reconnect.max_retries {
            if attempt >= max {
                tracing::error!(
                    max_retries = max,
                    "WebSocket reconnection limit reached, giving up"
                );
                break;
            }
        }

        let delay = calculate_backoff(attempt, &reconnect);
        tracing::info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "Waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
    }

    state_tx.send_replace(ConnectionState::Disconnected);
    tracing::debug!("WebSocket loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish a single WebSocket connection, read frames until it drops.
///
/// Returns `Ok(())` on a clean close (or cancellation) and `Err` on any
/// transport failure, before or after the handshake.
async fn connect_and_read(
    url: &Url,
    event_tx: &broadcast::Sender<Arc<AlertPayload>>,
    state_tx: &watch::Sender<ConnectionState>,
    cancel: &CancellationToken,
    authorization: Option<&str>,
) -> Result<(), Error> {
    tracing::info!(url = %url, "Connecting to WebSocket");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(value) = authorization {
        request = request.with_header("Authorization", value);
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    state_tx.send_replace(ConnectionState::Connected);
    tracing::info!("WebSocket connected");

    let (_write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        decode_and_broadcast(&text, event_tx);
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!("WebSocket ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "WebSocket close frame received"
                            );
                        } else {
                            tracing::info!("WebSocket close frame received (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!("WebSocket stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

// ── Frame decoding ───────────────────────────────────────────────────

/// Decode one text frame and broadcast it. Malformed frames are dropped.
fn decode_and_broadcast(text: &str, event_tx: &broadcast::Sender<Arc<AlertPayload>>) {
    match decode_alert(text) {
        Ok(alert) => {
            tracing::debug!(id = ?alert.id, city = %alert.city, "push alert received");
            // Ignore send errors -- just means no active subscribers right now
            let _ = event_tx.send(Arc::new(alert));
        }
        Err(e) => {
            tracing::debug!(error = %e, "dropping malformed push frame");
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Capped exponential backoff with optional jitter.
///
/// `delay = min(initial * multiplier^attempt, max) * jitter`
///
/// Jitter is +-25%, seeded deterministically from the attempt number.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * config.multiplier.max(1.0).powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    if !config.jitter {
        return Duration::from_secs_f64(capped.max(0.0));
    }

    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}

// ── Tests ────────────────────────────────────────────────────────────
