//! Alert command handlers.

use serde::Serialize;

use skywatch_core::{AlertFilter, AlertId, Monitor, MonitorConfig, ResolveOutcome};

use crate::cli::{AlertsArgs, AlertsCommand, AlertsListArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

/// Page size used when looking up the alert to resolve.
const RESOLVE_SEARCH_LIMIT: u32 = 100;

#[derive(Debug, Serialize)]
struct ResolveReport {
    id: AlertId,
    outcome: ResolveOutcome,
}

fn resolve_detail(report: &ResolveReport) -> String {
    match report.outcome {
        ResolveOutcome::Resolved => format!("Alert {} resolved", report.id),
        ResolveOutcome::AlreadyResolved => format!("Alert {} was already resolved", report.id),
        ResolveOutcome::InProgress | ResolveOutcome::NotFound => {
            format!("Alert {}: {:?}", report.id, report.outcome)
        }
    }
}

pub async fn handle(
    config: MonitorConfig,
    args: AlertsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        AlertsCommand::List(list) => list_alerts(config, list, global).await,
        AlertsCommand::Resolve { id, hours } => resolve_alert(config, &id, hours, global).await,
    }
}

async fn list_alerts(
    mut config: MonitorConfig,
    args: AlertsListArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    config.filter = util::filter_from_args(&args.filter);
    if let Some(hours) = args.hours {
        config.window_hours = hours;
    }
    if let Some(limit) = args.limit {
        config.poll_limit = limit;
    }

    let view = Monitor::oneshot(config, |monitor| async move {
        monitor.refresh().await?;
        Ok(monitor.view())
    })
    .await?;

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &view.alerts,
        |alert| util::AlertRow::new(alert, color),
        util::alert_id,
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

async fn resolve_alert(
    mut config: MonitorConfig,
    raw_id: &str,
    hours: Option<u32>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = AlertId::from(raw_id.trim());
    if id.as_str().is_empty() {
        return Err(CliError::Validation {
            field: "id".into(),
            reason: "alert id cannot be empty".into(),
        });
    }

    config.filter = AlertFilter::all();
    config.poll_limit = config.poll_limit.max(RESOLVE_SEARCH_LIMIT);
    if let Some(hours) = hours {
        config.window_hours = hours;
    }

    let target = id.clone();
    let outcome = Monitor::oneshot(config, |monitor| async move {
        monitor.refresh().await?;
        monitor.resolve(&target).await
    })
    .await?;

    match outcome {
        ResolveOutcome::NotFound => {
            return Err(CliError::AlertNotFound { id: id.to_string() });
        }
        ResolveOutcome::InProgress => {
            return Err(CliError::ResolveInProgress { id: id.to_string() });
        }
        ResolveOutcome::Resolved | ResolveOutcome::AlreadyResolved => {}
    }

    let report = ResolveReport { id, outcome };
    let out = output::render_single(&global.output, &report, resolve_detail, |r| {
        r.id.to_string()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
