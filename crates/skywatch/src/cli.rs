//! Clap derive structures for the `skywatch` CLI.
//!
//! Defines the command tree, global flags, and shared value types.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use skywatch_core::AlertCategory;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// skywatch -- live weather threshold alerts in your terminal
#[derive(Debug, Parser)]
#[command(
    name = "skywatch",
    version,
    about = "Monitor and resolve live weather alerts",
    long_about = "Follows a weather alert backend over its push channel and periodic\n\
        polls, merges both into one deduplicated view, and resolves alerts.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Backend profile to use
    #[arg(long, short = 'p', env = "SKYWATCH_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Backend base URL (overrides profile)
    #[arg(long, short = 'u', env = "SKYWATCH_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Push endpoint URL (derived from the API URL by default)
    #[arg(long, env = "SKYWATCH_WS_URL", global = true)]
    pub ws_url: Option<String>,

    /// Bearer token
    #[arg(long, env = "SKYWATCH_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "SKYWATCH_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "SKYWATCH_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "SKYWATCH_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

/// Alert category as accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CategoryArg {
    Temperature,
    Humidity,
    /// Air quality index
    #[value(alias = "air-quality", alias = "air_quality")]
    Aqi,
}

impl From<CategoryArg> for AlertCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Temperature => Self::Temperature,
            CategoryArg::Humidity => Self::Humidity,
            CategoryArg::Aqi => Self::AirQuality,
        }
    }
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow alerts live (push + polling) until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// List and resolve alerts
    #[command(alias = "a")]
    Alerts(AlertsArgs),

    /// Alert counts for a trailing window
    Stats(StatsArgs),

    /// Inspect CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared Filter Arguments ──────────────────────────────────────────

/// Filter flags shared by `watch` and `alerts list`.
#[derive(Debug, Args)]
pub struct FilterArgs {
    /// Only alerts of this category
    #[arg(long, short = 'c')]
    pub category: Option<CategoryArg>,

    /// Only alerts for this city (case-insensitive)
    #[arg(long)]
    pub city: Option<String>,

    /// Only resolved (true) or unresolved (false) alerts
    #[arg(long)]
    pub resolved: Option<bool>,
}

/// Longest accepted look-back window: ten years.
const MAX_WINDOW_HOURS: i64 = 87_600;

fn window_hours() -> clap::builder::RangedI64ValueParser<u32> {
    clap::value_parser!(u32).range(1..=MAX_WINDOW_HOURS)
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Time between polls (e.g. "30s", "5m"); "0s" disables polling
    #[arg(long, value_parser = humantime::parse_duration)]
    pub poll_interval: Option<Duration>,

    /// Look-back window in hours for polls
    #[arg(long, value_parser = window_hours())]
    pub hours: Option<u32>,

    /// Poll only; do not open the push connection
    #[arg(long)]
    pub no_push: bool,
}

// ── Alerts ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AlertsArgs {
    #[command(subcommand)]
    pub command: AlertsCommand,
}

#[derive(Debug, Subcommand)]
pub enum AlertsCommand {
    /// Fetch recent alerts
    #[command(alias = "ls")]
    List(AlertsListArgs),

    /// Mark an alert as resolved
    Resolve {
        /// Alert id
        id: String,

        /// Look-back window in hours used to find the alert
        #[arg(long, value_parser = window_hours())]
        hours: Option<u32>,
    },
}

#[derive(Debug, Args)]
pub struct AlertsListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Look-back window in hours
    #[arg(long, value_parser = window_hours())]
    pub hours: Option<u32>,

    /// Maximum alerts to fetch
    #[arg(long, short = 'l')]
    pub limit: Option<u32>,
}

// ── Stats ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Look-back window in hours
    #[arg(long, value_parser = window_hours())]
    pub hours: Option<u32>,

    /// Count the locally fetched alerts instead of asking the backend
    #[arg(long)]
    pub local: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration (tokens redacted)
    Show,

    /// Print the config file location
    Path,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
