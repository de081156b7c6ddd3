// Wire types for the alert backend.
//
// Both the push stream and the query endpoint deliver loosely-shaped
// JSON. Everything is decoded here into one strict payload type so the
// layers above never look at raw JSON.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};

use crate::error::Error;

// ── AlertPayload ─────────────────────────────────────────────────────

/// A single alert as delivered by the backend, from either source.
///
/// The push stream uses `type` / `timestamp`, the query endpoint uses
/// `alert_type` / `created_at`. Either spelling is accepted; when a frame
/// carries both, the query-endpoint name wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAlertPayload")]
pub struct AlertPayload {
    /// Backend-assigned key. Numbers and strings are both accepted;
    /// `null`, missing and empty all mean "not yet persisted".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// `"temperature"`, `"humidity"`, `"aqi"`, ...
    pub alert_type: String,

    pub city: String,

    pub message: String,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_value: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_value: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_resolved: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Wire shape before the alternate field names are collapsed.
#[derive(Deserialize)]
struct RawAlertPayload {
    #[serde(default, deserialize_with = "deserialize_id")]
    id: Option<String>,
    #[serde(default)]
    alert_type: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    city: String,
    message: String,
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    threshold_value: Option<f64>,
    #[serde(default)]
    actual_value: Option<f64>,
    #[serde(default)]
    is_resolved: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<RawAlertPayload> for AlertPayload {
    type Error = String;

    fn try_from(raw: RawAlertPayload) -> Result<Self, Self::Error> {
        let alert_type = raw
            .alert_type
            .or(raw.kind)
            .ok_or("missing field `alert_type` (or `type`)")?;
        let created_at = raw
            .created_at
            .or(raw.timestamp)
            .ok_or("missing field `created_at` (or `timestamp`)")?;
        Ok(Self {
            id: raw.id,
            alert_type,
            city: raw.city,
            message: raw.message,
            created_at,
            threshold_value: raw.threshold_value,
            actual_value: raw.actual_value,
            is_resolved: raw.is_resolved,
            resolved_at: raw.resolved_at,
        })
    }
}

/// Strictly decode one alert from a text frame or response item.
pub fn decode_alert(text: &str) -> Result<AlertPayload, Error> {
    serde_json::from_str(text).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: text.to_owned(),
    })
}

/// Decode an already-parsed JSON value (one item of a query response).
pub fn decode_alert_value(value: serde_json::Value) -> Result<AlertPayload, Error> {
    serde_json::from_value(value.clone()).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: value.to_string(),
    })
}

/// Parse a backend timestamp.
///
/// Accepts RFC 3339 (`2024-06-15T10:30:00+00:00`) and naive ISO-8601
/// (`2024-06-15T10:30:00.123456`), the latter interpreted as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "alert id must be a string or number, got {other}"
        ))),
    }
}

fn deserialize_opt_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}"))),
    }
}

// ── Query ────────────────────────────────────────────────────────────

/// Query parameters for `GET /api/alerts/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<bool>,

    /// Look-back window.
    pub hours: u32,

    pub limit: u32,
}

impl Default for AlertQuery {
    fn default() -> Self {
        Self {
            alert_type: None,
            city: None,
            resolved: None,
            hours: 24,
            limit: 20,
        }
    }
}

// ── Stats ────────────────────────────────────────────────────────────

/// Response of `GET /api/alerts/stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStatsResponse {
    #[serde(alias = "total")]
    pub total_alerts: u64,

    #[serde(alias = "resolved")]
    pub resolved_alerts: u64,

    #[serde(alias = "unresolved")]
    pub unresolved_alerts: u64,

    #[serde(alias = "by_category", default)]
    pub by_type: AlertTypeCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertTypeCounts {
    #[serde(default)]
    pub temperature: u64,

    #[serde(default)]
    pub humidity: u64,

    #[serde(default, alias = "air_quality", alias = "air-quality")]
    pub aqi: u64,
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn decode_push_frame_shape() {
        let raw = r#"{
            "id": 17,
            "type": "temperature",
            "message": "High temperature alert: 47.2°C in Dubai",
            "city": "Dubai",
            "timestamp": "2024-06-15T10:30:00.123456+00:00"
        }"#;

        let alert = decode_alert(raw).unwrap();
        assert_eq!(alert.id.as_deref(), Some("17"));
        assert_eq!(alert.alert_type, "temperature");
        assert_eq!(alert.city, "Dubai");
        assert_eq!(
            alert.created_at.timestamp(),
            Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap().timestamp()
        );
        assert!(alert.is_resolved.is_none());
    }

    #[test]
    fn decode_query_item_shape() {
        let raw = r#"{
            "id": 3,
            "alert_type": "aqi",
            "threshold_value": 150.0,
            "actual_value": 180.0,
            "city": "Mumbai",
            "message": "Poor air quality alert: AQI 180 in Mumbai",
            "is_resolved": true,
            "created_at": "2024-06-15T08:00:00",
            "resolved_at": "2024-06-15T09:00:00"
        }"#;

        let alert = decode_alert(raw).unwrap();
        assert_eq!(alert.alert_type, "aqi");
        assert_eq!(alert.threshold_value, Some(150.0));
        assert_eq!(alert.actual_value, Some(180.0));
        assert_eq!(alert.is_resolved, Some(true));
        assert_eq!(
            alert.resolved_at,
            Some(Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn frames_with_both_spellings_prefer_query_names() {
        let raw = r#"{
            "id": 8,
            "alert_type": "humidity",
            "type": "temperature",
            "city": "Manila",
            "message": "m",
            "created_at": "2024-06-15T08:00:00",
            "timestamp": "2024-06-15T09:00:00+00:00"
        }"#;

        let alert = decode_alert(raw).unwrap();
        assert_eq!(alert.alert_type, "humidity");
        assert_eq!(alert.created_at, Utc.with_ymd_and_hms(2024, 6, 15, 8, 0, 0).unwrap());
    }

    #[test]
    fn null_and_empty_ids_mean_unpersisted() {
        let null_id = r#"{"id":null,"type":"humidity","city":"Paris","message":"m","timestamp":"2024-01-01T00:00:00Z"}"#;
        let empty_id = r#"{"id":"","type":"humidity","city":"Paris","message":"m","timestamp":"2024-01-01T00:00:00Z"}"#;
        let missing = r#"{"type":"humidity","city":"Paris","message":"m","timestamp":"2024-01-01T00:00:00Z"}"#;

        for raw in [null_id, empty_id, missing] {
            assert!(decode_alert(raw).unwrap().id.is_none(), "{raw}");
        }
    }

    #[test]
    fn string_ids_pass_through() {
        let raw = r#"{"id":"A1","type":"temperature","city":"Paris","message":"m","timestamp":"2024-01-01T00:00:00Z"}"#;
        assert_eq!(decode_alert(raw).unwrap().id.as_deref(), Some("A1"));
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let cases = [
            "not json at all",
            r#"{"type":"temperature","city":"Paris","message":"m"}"#,
            r#"{"type":"temperature","city":"Paris","message":"m","timestamp":"yesterday"}"#,
            r#"{"id":[1],"type":"temperature","city":"Paris","message":"m","timestamp":"2024-01-01T00:00:00Z"}"#,
            r#"{"city":"Paris","message":"m","timestamp":"2024-01-01T00:00:00Z"}"#,
        ];

        for raw in cases {
            let err = decode_alert(raw).unwrap_err();
            assert!(
                matches!(err, Error::Deserialization { ref body, .. } if body == raw),
                "expected Deserialization for {raw}, got {err:?}"
            );
        }
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let parsed = parse_timestamp("2024-06-15 10:30:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap());
        assert!(parse_timestamp("15/06/2024").is_none());
    }

    #[test]
    fn query_serializes_only_set_fields() {
        let query = AlertQuery {
            alert_type: Some("humidity".into()),
            ..AlertQuery::default()
        };
        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "alert_type": "humidity", "hours": 24, "limit": 20 })
        );
    }

    #[test]
    fn stats_accepts_backend_and_short_names() {
        let backend: AlertStatsResponse = serde_json::from_value(serde_json::json!({
            "total_alerts": 5,
            "resolved_alerts": 2,
            "unresolved_alerts": 3,
            "by_type": { "temperature": 3, "humidity": 1, "aqi": 1 }
        }))
        .unwrap();

        let short: AlertStatsResponse = serde_json::from_value(serde_json::json!({
            "total": 5,
            "resolved": 2,
            "unresolved": 3,
            "by_category": { "temperature": 3, "humidity": 1, "air_quality": 1 }
        }))
        .unwrap();

        assert_eq!(backend, short);
    }
}
