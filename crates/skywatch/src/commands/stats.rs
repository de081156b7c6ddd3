//! Statistics command handler.

use serde::Serialize;

use skywatch_core::{AlertCategory, Monitor, MonitorConfig, SourcedStats, StatsSource};

use crate::cli::{GlobalOpts, StatsArgs};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct StatsReport {
    window_hours: u32,
    #[serde(flatten)]
    stats: SourcedStats,
}

fn detail(report: &StatsReport, color: bool) -> String {
    let s = &report.stats.stats;
    let source = match report.stats.source {
        StatsSource::Backend => "backend",
        StatsSource::Local => "local view",
    };
    let mut lines = vec![
        format!("Window:     last {}h ({source})", report.window_hours),
        format!("Total:      {}", s.total),
        format!("Resolved:   {}", s.resolved),
        format!("Unresolved: {}", s.unresolved),
    ];
    for category in [
        AlertCategory::Temperature,
        AlertCategory::Humidity,
        AlertCategory::AirQuality,
        AlertCategory::Other,
    ] {
        let count = s.by_category.get(category);
        if count > 0 || category != AlertCategory::Other {
            lines.push(format!(
                "  {:<12}{count}",
                output::paint_category(category, color)
            ));
        }
    }
    lines.join("\n")
}

pub async fn handle(
    mut config: MonitorConfig,
    args: StatsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if let Some(hours) = args.hours {
        config.window_hours = hours;
    }
    let window_hours = config.window_hours;
    let local = args.local;

    let stats = Monitor::oneshot(config, |monitor| async move {
        if local {
            monitor.refresh().await?;
            Ok(SourcedStats {
                source: StatsSource::Local,
                stats: monitor.local_stats(window_hours).await?,
            })
        } else {
            monitor.stats(window_hours).await
        }
    })
    .await?;

    let report = StatsReport {
        window_hours,
        stats,
    };
    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &report,
        |r| detail(r, color),
        |r| r.stats.stats.total.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use skywatch_core::{AlertStats, CategoryCounts};

    use super::*;

    #[test]
    fn detail_hides_empty_other_bucket() {
        let report = StatsReport {
            window_hours: 24,
            stats: SourcedStats {
                source: StatsSource::Local,
                stats: AlertStats {
                    total: 3,
                    resolved: 1,
                    unresolved: 2,
                    by_category: CategoryCounts {
                        temperature: 2,
                        humidity: 1,
                        air_quality: 0,
                        other: 0,
                    },
                },
            },
        };
        let text = detail(&report, false);
        assert!(text.contains("(local view)"));
        assert!(text.contains("Total:      3"));
        assert!(text.contains("AQI"));
        assert!(!text.contains("OTHER"));
    }
}
