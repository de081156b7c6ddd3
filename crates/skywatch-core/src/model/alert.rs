// ── Alert domain types ──

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString};

// ── AlertId ─────────────────────────────────────────────────────────

/// Stable backend key of a persisted alert.
///
/// The backend hands out integers, but push frames and older records may
/// carry strings, so the id is kept as an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(String);

impl AlertId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AlertId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().to_owned()))
    }
}

impl From<String> for AlertId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AlertId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<u64> for AlertId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

// ── AlertCategory ───────────────────────────────────────────────────

/// What kind of threshold the alert reports.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AlertCategory {
    Temperature,
    Humidity,
    #[serde(alias = "aqi")]
    #[strum(serialize = "air_quality", serialize = "aqi", serialize = "air-quality")]
    AirQuality,
    Other,
}

impl AlertCategory {
    /// Map a backend `alert_type` to a category. Unknown values become `Other`.
    pub fn from_wire(raw: &str) -> Self {
        raw.trim().parse().unwrap_or(Self::Other)
    }

    /// The value the backend expects in `alert_type` query parameters.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::AirQuality => "aqi",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::AirQuality => "air_quality",
            Self::Other => "other",
        };
        f.write_str(label)
    }
}

// ── AlertOrigin ─────────────────────────────────────────────────────

/// Which source(s) contributed a view entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertOrigin {
    /// Seen only on the push stream.
    Push,
    /// Seen only in a poll response.
    Polled,
    /// Seen on both; fields come from the poll.
    Merged,
}

impl AlertOrigin {
    /// Push-origin entries sort ahead of polled-only ones on equal timestamps.
    pub(crate) fn tie_rank(self) -> u8 {
        match self {
            Self::Push | Self::Merged => 0,
            Self::Polled => 1,
        }
    }
}

// ── Alert ───────────────────────────────────────────────────────────

/// A threshold breach for one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// `None` for push alerts the backend has not persisted yet.
    pub id: Option<AlertId>,
    pub category: AlertCategory,
    pub city: String,
    pub message: String,
    pub event_time: DateTime<Utc>,
    pub threshold_value: Option<f64>,
    pub actual_value: Option<f64>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub origin: AlertOrigin,
}

impl Alert {
    /// Fallback identity for alerts without an id.
    pub fn composite_key(&self) -> CompositeKey {
        CompositeKey {
            city: self.city.clone(),
            category: self.category,
            event_time: self.event_time,
            message: self.message.clone(),
        }
    }

    /// Same underlying alert: ids equal when both have one, otherwise
    /// the composite keys match.
    pub fn is_same_alert(&self, other: &Self) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self.has_same_composite(other),
        }
    }

    pub(crate) fn has_same_composite(&self, other: &Self) -> bool {
        self.city == other.city
            && self.category == other.category
            && self.event_time == other.event_time
            && self.message == other.message
    }
}

/// `{city, category, event_time, message}`.
///
/// Two distinct alerts with identical fields collapse under this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    pub city: String,
    pub category: AlertCategory,
    pub event_time: DateTime<Utc>,
    pub message: String,
}

// ── AlertFilter ─────────────────────────────────────────────────────

/// Restricts both the poll query and the view.
///
/// Equality doubles as the stale-response guard: a poll answered under a
/// different filter than the active one is discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<AlertCategory>,

    /// Case-insensitive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<bool>,
}

impl AlertFilter {
    /// Everything.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_category(category: AlertCategory) -> Self {
        Self {
            category: Some(category),
            ..Self::default()
        }
    }

    pub fn matches(&self, alert: &Alert) -> bool {
        if self.category.is_some_and(|c| c != alert.category) {
            return false;
        }
        if let Some(ref city) = self.city {
            if !city.eq_ignore_ascii_case(&alert.city) {
                return false;
            }
        }
        self.resolved.is_none_or(|r| r == alert.resolved)
    }

    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.city.is_none() && self.resolved.is_none()
    }
}

impl fmt::Display for AlertFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("all");
        }
        let mut parts = Vec::new();
        if let Some(category) = self.category {
            parts.push(format!("category={category}"));
        }
        if let Some(ref city) = self.city {
            parts.push(format!("city={city}"));
        }
        if let Some(resolved) = self.resolved {
            parts.push(format!("resolved={resolved}"));
        }
        f.write_str(&parts.join(","))
    }
}
