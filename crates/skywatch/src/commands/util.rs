//! Shared helpers for command handlers.

use chrono::{DateTime, Utc};
use tabled::Tabled;

use skywatch_core::{Alert, AlertFilter};

use crate::cli::FilterArgs;
use crate::output;

/// Translate filter flags into the monitor's filter.
pub fn filter_from_args(args: &FilterArgs) -> AlertFilter {
    AlertFilter {
        category: args.category.map(Into::into),
        city: args
            .city
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_owned),
        resolved: args.resolved,
    }
}

pub fn format_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_value(value: Option<f64>) -> String {
    value.map_or_else(|| "-".into(), |v| format!("{v:.1}"))
}

/// Identifier for plain output; id-less push alerts print `-`.
pub fn alert_id(alert: &Alert) -> String {
    alert
        .id
        .as_ref()
        .map_or_else(|| "-".into(), ToString::to_string)
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct AlertRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    category: String,
    #[tabled(rename = "City")]
    city: String,
    #[tabled(rename = "Actual")]
    actual: String,
    #[tabled(rename = "Threshold")]
    threshold: String,
    #[tabled(rename = "Time (UTC)")]
    time: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl AlertRow {
    pub fn new(alert: &Alert, color: bool) -> Self {
        Self {
            id: alert_id(alert),
            category: output::paint_category(alert.category, color),
            city: alert.city.clone(),
            actual: format_value(alert.actual_value),
            threshold: format_value(alert.threshold_value),
            time: format_time(alert.event_time),
            status: if alert.resolved { "resolved" } else { "active" }.into(),
        }
    }
}

/// One-line rendering used by `watch` in table mode.
pub fn alert_line(alert: &Alert, color: bool) -> String {
    let mut line = format!(
        "{}  {:<11} {:<14} {}",
        format_time(alert.event_time),
        output::paint_category(alert.category, color),
        alert.city,
        alert.message
    );
    if let Some(ref id) = alert.id {
        line.push_str(&format!("  [#{id}]"));
    }
    if alert.resolved {
        line.push_str("  (resolved)");
    }
    line
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use skywatch_core::{AlertCategory, AlertOrigin};

    use super::*;
    use crate::cli::CategoryArg;

    fn alert() -> Alert {
        Alert {
            id: Some("7".into()),
            category: AlertCategory::Humidity,
            city: "Manila".into(),
            message: "Humidity above 90%".into(),
            event_time: Utc.with_ymd_and_hms(2024, 6, 15, 8, 0, 0).unwrap(),
            threshold_value: Some(90.0),
            actual_value: Some(94.26),
            resolved: false,
            resolved_at: None,
            origin: AlertOrigin::Polled,
        }
    }

    #[test]
    fn blank_city_flag_means_any_city() {
        let filter = filter_from_args(&FilterArgs {
            category: Some(CategoryArg::Aqi),
            city: Some("  ".into()),
            resolved: Some(false),
        });
        assert_eq!(filter.category, Some(AlertCategory::AirQuality));
        assert_eq!(filter.city, None);
        assert_eq!(filter.resolved, Some(false));
    }

    #[test]
    fn watch_line_carries_id_and_message() {
        let line = alert_line(&alert(), false);
        assert!(line.starts_with("2024-06-15 08:00:00"));
        assert!(line.contains("HUMIDITY"));
        assert!(line.contains("Humidity above 90%"));
        assert!(line.ends_with("[#7]"));
    }

    #[test]
    fn row_formats_values() {
        let row = AlertRow::new(&alert(), false);
        assert_eq!(row.actual, "94.3");
        assert_eq!(row.status, "active");
    }
}
