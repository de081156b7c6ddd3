//! Command dispatch: bridges CLI args -> monitor operations -> output formatting.

pub mod alerts;
pub mod config_cmd;
pub mod stats;
pub mod util;
pub mod watch;

use skywatch_core::MonitorConfig;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a backend-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    config: MonitorConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(config, args, global).await,
        Command::Alerts(args) => alerts::handle(config, args, global).await,
        Command::Stats(args) => stats::handle(config, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "command does not need a backend connection".into(),
        )),
    }
}
