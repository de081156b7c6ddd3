//! Shared configuration for the skywatch CLI.
//!
//! TOML profiles, token resolution (env + plaintext), and translation to
//! `skywatch_core::MonitorConfig`. Core never sees these types; the CLI
//! adds flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use skywatch_core::{MonitorConfig, ReconnectConfig, TlsVerification};

/// Backend assumed when no profile is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Profile used when neither `--profile` nor `default_profile` is set.
pub const DEFAULT_PROFILE: &str = "default";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found in config")]
    UnknownProfile { name: String },

    #[error("token variable '{var}' for profile '{profile}' is not set")]
    MissingTokenEnv { profile: String, var: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some(DEFAULT_PROFILE.into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Pick the profile name: explicit request, then `default_profile`.
    pub fn active_profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| DEFAULT_PROFILE.into())
    }

    /// Look up a profile by name.
    ///
    /// An unconfigured `default` profile resolves to the local reference
    /// backend so a fresh install works without a config file.
    pub fn profile(&self, name: &str) -> Result<Profile, ConfigError> {
        if let Some(profile) = self.profiles.get(name) {
            return Ok(profile.clone());
        }
        if name == DEFAULT_PROFILE {
            return Ok(Profile::new(DEFAULT_API_URL));
        }
        Err(ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
            poll_interval_secs: default_poll_interval(),
            window_hours: default_window_hours(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    10
}
fn default_poll_interval() -> u64 {
    skywatch_core::config::DEFAULT_POLL_INTERVAL_SECS
}
fn default_window_hours() -> u32 {
    skywatch_core::config::DEFAULT_WINDOW_HOURS
}

/// A named backend profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Backend base URL (e.g., "http://localhost:8000").
    pub api_url: String,

    /// Push endpoint. Derived from `api_url` when absent.
    pub ws_url: Option<String>,

    /// Bearer token (plaintext, prefer `token_env`).
    pub token: Option<String>,

    /// Environment variable name containing the bearer token.
    pub token_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout.
    pub timeout: Option<u64>,

    pub poll_interval_secs: Option<u64>,
    pub window_hours: Option<u32>,
    pub poll_limit: Option<u32>,

    /// First reconnect delay in seconds.
    pub reconnect_delay_secs: Option<u64>,
    /// Reconnect backoff ceiling in seconds.
    pub reconnect_max_delay_secs: Option<u64>,
}

impl Profile {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "skywatch", "skywatch").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("skywatch");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. A missing file yields the defaults.
///
/// Environment overrides use `SKYWATCH_` with `__` as the nesting
/// separator, e.g. `SKYWATCH_DEFAULTS__TIMEOUT=5`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SKYWATCH_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

/// Resolve the bearer token: `token_env` lookup, then plaintext.
///
/// A profile without either runs unauthenticated. A named `token_env`
/// that is unset is an error rather than a silent fallback.
pub fn resolve_token(
    profile: &Profile,
    profile_name: &str,
) -> Result<Option<SecretString>, ConfigError> {
    if let Some(ref var) = profile.token_env {
        return match std::env::var(var) {
            Ok(val) if !val.is_empty() => Ok(Some(SecretString::from(val))),
            _ => Err(ConfigError::MissingTokenEnv {
                profile: profile_name.into(),
                var: var.clone(),
            }),
        };
    }

    Ok(profile
        .token
        .as_ref()
        .filter(|t| !t.is_empty())
        .map(|t| SecretString::from(t.clone())))
}

// ── Translation ─────────────────────────────────────────────────────

fn parse_url(field: &str, raw: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let url: Url = raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: format!("expected {} URL, got {raw}", schemes.join("/")),
        });
    }
    Ok(url)
}

/// Build a `MonitorConfig` from a profile and the global defaults.
///
/// Profile fields win over `defaults`; anything neither sets falls back
/// to the monitor's reference settings.
pub fn profile_to_monitor_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<MonitorConfig, ConfigError> {
    let api_url = parse_url("api_url", &profile.api_url, &["http", "https"])?;
    let mut config = MonitorConfig::new(api_url);

    config.ws_url = profile
        .ws_url
        .as_deref()
        .map(|raw| parse_url("ws_url", raw, &["ws", "wss"]))
        .transpose()?;

    config.token = resolve_token(profile, profile_name)?;

    config.tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.poll_interval_secs = profile
        .poll_interval_secs
        .unwrap_or(defaults.poll_interval_secs);
    config.window_hours = profile.window_hours.unwrap_or(defaults.window_hours);
    if let Some(limit) = profile.poll_limit {
        config.poll_limit = limit;
    }

    config.reconnect = reconnect_for(profile)?;
    Ok(config)
}

fn reconnect_for(profile: &Profile) -> Result<ReconnectConfig, ConfigError> {
    let mut reconnect = ReconnectConfig::default();
    if let Some(secs) = profile.reconnect_delay_secs {
        reconnect.initial_delay = Duration::from_secs(secs);
    }
    if let Some(secs) = profile.reconnect_max_delay_secs {
        reconnect.max_delay = Duration::from_secs(secs);
    }
    if reconnect.max_delay < reconnect.initial_delay {
        return Err(ConfigError::Validation {
            field: "reconnect_max_delay_secs".into(),
            reason: format!(
                "must be at least reconnect_delay_secs ({}s)",
                reconnect.initial_delay.as_secs()
            ),
        });
    }
    Ok(reconnect)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn unconfigured_default_profile_points_at_local_backend() {
        let cfg = Config::default();
        let name = cfg.active_profile_name(None);
        assert_eq!(name, "default");
        assert_eq!(cfg.profile(&name).unwrap().api_url, DEFAULT_API_URL);
    }

    #[test]
    fn unknown_named_profile_is_an_error() {
        let cfg = Config::default();
        assert!(matches!(
            cfg.profile("staging"),
            Err(ConfigError::UnknownProfile { name }) if name == "staging"
        ));
    }

    #[test]
    fn profile_overrides_defaults() {
        let mut profile = Profile::new("https://alerts.example.com");
        profile.timeout = Some(3);
        profile.window_hours = Some(6);
        profile.poll_limit = Some(50);

        let cfg = profile_to_monitor_config(&profile, "p", &Defaults::default()).unwrap();
        assert_eq!(cfg.timeout, Duration::from_secs(3));
        assert_eq!(cfg.window_hours, 6);
        assert_eq!(cfg.poll_limit, 50);
        assert_eq!(cfg.poll_interval_secs, 300);
        assert_eq!(cfg.tls, TlsVerification::SystemDefaults);
        assert!(cfg.token.is_none());
    }

    #[test]
    fn insecure_default_applies_without_profile_override() {
        let defaults = Defaults {
            insecure: true,
            ..Defaults::default()
        };
        let mut profile = Profile::new("https://alerts.example.com");
        let cfg = profile_to_monitor_config(&profile, "p", &defaults).unwrap();
        assert_eq!(cfg.tls, TlsVerification::DangerAcceptInvalid);

        profile.insecure = Some(false);
        profile.ca_cert = Some(PathBuf::from("/etc/ca.pem"));
        let cfg = profile_to_monitor_config(&profile, "p", &defaults).unwrap();
        assert_eq!(cfg.tls, TlsVerification::CustomCa("/etc/ca.pem".into()));
    }

    #[test]
    fn rejects_non_http_api_url_and_non_ws_push_url() {
        let bad_api = Profile::new("ws://localhost:8000");
        assert!(matches!(
            profile_to_monitor_config(&bad_api, "p", &Defaults::default()),
            Err(ConfigError::Validation { field, .. }) if field == "api_url"
        ));

        let mut bad_ws = Profile::new("http://localhost:8000");
        bad_ws.ws_url = Some("http://localhost:8000/ws".into());
        assert!(matches!(
            profile_to_monitor_config(&bad_ws, "p", &Defaults::default()),
            Err(ConfigError::Validation { field, .. }) if field == "ws_url"
        ));
    }

    #[test]
    fn plaintext_token_is_used() {
        let mut profile = Profile::new(DEFAULT_API_URL);
        profile.token = Some("s3cret".into());
        let token = resolve_token(&profile, "p").unwrap().unwrap();
        assert_eq!(token.expose_secret(), "s3cret");
    }

    #[test]
    fn unset_token_env_is_reported() {
        let mut profile = Profile::new(DEFAULT_API_URL);
        profile.token_env = Some("SKYWATCH_TEST_TOKEN_THAT_IS_NEVER_SET".into());
        profile.token = Some("ignored".into());
        assert!(matches!(
            resolve_token(&profile, "p"),
            Err(ConfigError::MissingTokenEnv { var, .. })
                if var == "SKYWATCH_TEST_TOKEN_THAT_IS_NEVER_SET"
        ));
    }

    #[test]
    fn reconnect_bounds_are_validated() {
        let mut profile = Profile::new(DEFAULT_API_URL);
        profile.reconnect_delay_secs = Some(5);
        profile.reconnect_max_delay_secs = Some(30);
        let cfg = profile_to_monitor_config(&profile, "p", &Defaults::default()).unwrap();
        assert_eq!(cfg.reconnect.initial_delay, Duration::from_secs(5));
        assert_eq!(cfg.reconnect.max_delay, Duration::from_secs(30));

        profile.reconnect_max_delay_secs = Some(1);
        assert!(profile_to_monitor_config(&profile, "p", &Defaults::default()).is_err());
    }
}
