//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use skywatch_config::{Config, ConfigError};
use skywatch_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the alert backend at {url}")]
    #[diagnostic(
        code(skywatch::connection_failed),
        help(
            "Check that the backend is running and accessible.\n\
             Reason: {reason}\n\
             Try: skywatch --api-url http://localhost:8000 alerts list"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Request timed out")]
    #[diagnostic(
        code(skywatch::timeout),
        help("Increase timeout with --timeout or check backend responsiveness.")
    )]
    Timeout,

    // ── Authentication ───────────────────────────────────────────────
    #[error("The backend refused the request ({status})")]
    #[diagnostic(
        code(skywatch::auth_failed),
        help(
            "Set a bearer token with --token, SKYWATCH_TOKEN, or token_env in your profile."
        )
    )]
    AuthFailed { status: u16 },

    // ── Alerts ───────────────────────────────────────────────────────
    #[error("Alert '{id}' not found")]
    #[diagnostic(
        code(skywatch::not_found),
        help(
            "Only alerts inside the look-back window can be resolved.\n\
             Run: skywatch alerts list --hours 168 to widen the search"
        )
    )]
    AlertNotFound { id: String },

    #[error("Could not resolve alert '{id}': {reason}")]
    #[diagnostic(code(skywatch::resolve_rejected))]
    ResolveRejected { id: String, reason: String },

    #[error("A resolve for alert '{id}' is already in progress")]
    #[diagnostic(code(skywatch::conflict))]
    ResolveInProgress { id: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error: {message}")]
    #[diagnostic(code(skywatch::api_error))]
    ApiError { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(skywatch::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(skywatch::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Add one under [profiles.{name}] in: {path}"
        )
    )]
    ProfileNotFound {
        name: String,
        available: String,
        path: String,
    },

    #[error("{source}")]
    #[diagnostic(
        code(skywatch::config),
        help("Check the config file at: {path}")
    )]
    Config {
        #[source]
        source: ConfigError,
        path: String,
    },

    // ── Internal ─────────────────────────────────────────────────────
    #[error("{0}")]
    #[diagnostic(code(skywatch::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(skywatch::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render YAML: {0}")]
    #[diagnostic(code(skywatch::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout => exit_code::TIMEOUT,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::AlertNotFound { .. } => exit_code::NOT_FOUND,
            Self::ResolveInProgress { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::Config { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }

    /// Unknown profile, listing the ones that do exist.
    pub fn profile_not_found(name: String, config: &Config) -> Self {
        let mut available: Vec<_> = config.profiles.keys().cloned().collect();
        available.sort();
        Self::ProfileNotFound {
            name,
            available: if available.is_empty() {
                "(none)".into()
            } else {
                available.join(", ")
            },
            path: skywatch_config::config_path().display().to_string(),
        }
    }

    /// Wrap a config-layer error, remembering which file was involved.
    pub fn config(source: ConfigError) -> Self {
        match source {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            source => Self::Config {
                source,
                path: skywatch_config::config_path().display().to_string(),
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::config(err)
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::Timeout { .. } => CliError::Timeout,

            CoreError::AlertNotFound { id } => CliError::AlertNotFound { id },

            CoreError::ResolveRejected { id, reason } => CliError::ResolveRejected { id, reason },

            CoreError::Api {
                status: Some(status @ (401 | 403)),
                ..
            } => CliError::AuthFailed { status },

            CoreError::Api { message, .. } | CoreError::InvalidResponse { message } => {
                CliError::ApiError { message }
            }

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::NotRunning => CliError::Internal("monitor is not running".into()),

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}
