// ── Aggregate alert counts ──

use serde::{Deserialize, Serialize};

use super::alert::{Alert, AlertCategory};

/// Totals over a time window, from the backend or computed locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStats {
    pub total: u64,
    pub resolved: u64,
    pub unresolved: u64,
    pub by_category: CategoryCounts,
}

/// Where a set of counts came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsSource {
    /// The backend's stats endpoint.
    Backend,
    /// Counted from the local view.
    Local,
}

/// [`AlertStats`] tagged with their [`StatsSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourcedStats {
    pub source: StatsSource,
    #[serde(flatten)]
    pub stats: AlertStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub temperature: u64,
    pub humidity: u64,
    pub air_quality: u64,
    pub other: u64,
}

impl CategoryCounts {
    pub fn get(&self, category: AlertCategory) -> u64 {
        match category {
            AlertCategory::Temperature => self.temperature,
            AlertCategory::Humidity => self.humidity,
            AlertCategory::AirQuality => self.air_quality,
            AlertCategory::Other => self.other,
        }
    }

    fn increment(&mut self, category: AlertCategory) {
        let slot = match category {
            AlertCategory::Temperature => &mut self.temperature,
            AlertCategory::Humidity => &mut self.humidity,
            AlertCategory::AirQuality => &mut self.air_quality,
            AlertCategory::Other => &mut self.other,
        };
        *slot += 1;
    }
}

impl AlertStats {
    /// Count a set of alerts.
    pub fn tally<'a>(alerts: impl IntoIterator<Item = &'a Alert>) -> Self {
        let mut stats = Self::default();
        for alert in alerts {
            stats.total += 1;
            if alert.resolved {
                stats.resolved += 1;
            } else {
                stats.unresolved += 1;
            }
            stats.by_category.increment(alert.category);
        }
        stats
    }
}
