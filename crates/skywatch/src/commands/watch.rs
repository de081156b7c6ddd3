//! Live alert feed: push notifications plus periodic polls until Ctrl-C.

use std::collections::HashSet;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use skywatch_core::{
    Alert, AlertFilter, AlertId, AlertOrigin, CompositeKey, Monitor, MonitorConfig, ReconciledView,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, PartialEq, Eq, Hash)]
enum SeenKey {
    Id(AlertId),
    Composite(CompositeKey),
}

impl SeenKey {
    fn of(alert: &Alert) -> Self {
        alert
            .id
            .clone()
            .map_or_else(|| Self::Composite(alert.composite_key()), Self::Id)
    }
}

/// Prints each alert once, in the selected format.
struct Feed {
    format: OutputFormat,
    color: bool,
    quiet: bool,
    filter: AlertFilter,
    seen: HashSet<SeenKey>,
}

impl Feed {
    fn render(&self, alert: &Alert, live: bool) -> Result<String, CliError> {
        Ok(match self.format {
            OutputFormat::Table => {
                let line = util::alert_line(alert, self.color);
                if live { format!("NEW  {line}") } else { format!("     {line}") }
            }
            OutputFormat::Json | OutputFormat::JsonCompact => output::render_json_compact(alert)?,
            OutputFormat::Yaml => format!("---\n{}", serde_yaml::to_string(alert)?),
            OutputFormat::Plain => util::alert_id(alert),
        })
    }

    /// Forget alerts that left the view, so `seen` stays bounded by it.
    fn retain_live(&mut self, view: &ReconciledView) {
        let live: HashSet<SeenKey> = view
            .iter()
            .flat_map(|a| {
                let composite = SeenKey::Composite(a.composite_key());
                [a.id.clone().map(SeenKey::Id), Some(composite)]
            })
            .flatten()
            .collect();
        self.seen.retain(|key| live.contains(key));
    }

    /// Returns `false` if the alert was already printed or is filtered out.
    fn emit(&mut self, alert: &Alert, live: bool) -> Result<bool, CliError> {
        if !self.filter.matches(alert) || !self.seen.insert(SeenKey::of(alert)) {
            return Ok(false);
        }
        let text = self.render(alert, live)?;
        output::print_output(text.trim_end(), self.quiet);
        Ok(true)
    }
}

pub async fn handle(
    mut config: MonitorConfig,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    config.filter = util::filter_from_args(&args.filter);
    if let Some(interval) = args.poll_interval {
        config.poll_interval_secs = interval.as_secs();
    }
    if let Some(hours) = args.hours {
        config.window_hours = hours;
    }
    if args.no_push {
        config.push_enabled = false;
    }

    let color = output::should_color(&global.color);
    let mut feed = Feed {
        format: global.output.clone(),
        color,
        quiet: global.quiet,
        filter: config.filter.clone(),
        seen: HashSet::new(),
    };

    if !global.quiet {
        eprintln!(
            "Watching {} (filter: {}); press Ctrl-C to stop",
            config.api_url, config.filter
        );
    }

    let monitor = Monitor::new(config)?;
    let mut notifications = monitor.notifications();
    let mut states = monitor.subscribe_connection_state();
    let mut views = monitor.subscribe_view();
    monitor.start().await?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("interrupted");
                break Ok(());
            }
            note = notifications.recv() => match note {
                Ok(alert) => {
                    if let Err(e) = feed.emit(&alert, true) {
                        break Err(e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "notification feed lagged"),
                Err(RecvError::Closed) => break Ok(()),
            },
            changed = states.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let state = *states.borrow_and_update();
                if !global.quiet {
                    eprintln!("push: {}", output::paint_state(state, color));
                }
            }
            view = views.changed() => {
                let Some(view) = view else { break Ok(()) };
                feed.retain_live(&view);
                let polled = view
                    .iter()
                    .filter(|a| a.origin == AlertOrigin::Polled)
                    .try_for_each(|a| feed.emit(a, false).map(drop));
                if let Err(e) = polled {
                    break Err(e);
                }
            }
        }
    };

    monitor.stop().await;
    result
}
