// ── Runtime monitor configuration ──
//
// Describes *where* the alert backend lives and how aggressively to poll.
// Carries the optional bearer token but never touches disk: the CLI
// builds a `MonitorConfig` from its profile and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use skywatch_api::ReconnectConfig;
use url::Url;

use crate::error::CoreError;
use crate::model::AlertFilter;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed dev backends).
    DangerAcceptInvalid,
}

/// Reference poll cadence: every five minutes.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
/// Reference look-back window.
pub const DEFAULT_WINDOW_HOURS: u32 = 24;
/// Reference page size for alert polls.
pub const DEFAULT_POLL_LIMIT: u32 = 20;

/// Configuration for monitoring one alert backend.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Backend root (e.g., `http://localhost:8000`).
    pub api_url: Url,
    /// Push endpoint. Derived from `api_url` when `None`.
    pub ws_url: Option<Url>,
    /// Bearer token for both HTTP and the WebSocket upgrade.
    pub token: Option<SecretString>,
    pub tls: TlsVerification,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Seconds between alert polls. 0 = poll only on demand.
    pub poll_interval_secs: u64,
    /// Look-back window for polls and stats.
    pub window_hours: u32,
    /// Maximum alerts per poll.
    pub poll_limit: u32,
    /// Open the push connection on `start()`.
    pub push_enabled: bool,
    pub reconnect: ReconnectConfig,
    /// Filter active at start.
    pub filter: AlertFilter,
}

impl MonitorConfig {
    /// Reference settings for the given backend.
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            ws_url: None,
            token: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(10),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            window_hours: DEFAULT_WINDOW_HOURS,
            poll_limit: DEFAULT_POLL_LIMIT,
            push_enabled: true,
            reconnect: ReconnectConfig::default(),
            filter: AlertFilter::default(),
        }
    }

    /// The push endpoint: `ws_url` if set, otherwise `{api_url}/ws` with
    /// the scheme switched to `ws`/`wss`.
    pub fn push_url(&self) -> Result<Url, CoreError> {
        if let Some(ref url) = self.ws_url {
            return Ok(url.clone());
        }
        derive_ws_url(&self.api_url)
    }
}

fn derive_ws_url(api_url: &Url) -> Result<Url, CoreError> {
    let scheme = match api_url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(CoreError::Config {
                message: format!("unsupported URL scheme for push endpoint: {other}"),
            });
        }
    };

    let mut url = api_url.clone();
    url.set_scheme(scheme).map_err(|()| CoreError::Config {
        message: format!("cannot derive push URL from {api_url}"),
    })?;
    let path = format!("{}/ws", api_url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
