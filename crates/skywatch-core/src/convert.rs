// ── API-to-domain type conversions ──
//
// Bridges `skywatch_api` wire types into `skywatch_core::model` types and
// back into query parameters.

use skywatch_api::{AlertPayload, AlertQuery, AlertStatsResponse};

use crate::model::{
    Alert, AlertCategory, AlertFilter, AlertId, AlertOrigin, AlertStats, CategoryCounts,
};

// ── Alert ──────────────────────────────────────────────────────────

impl Alert {
    /// Build a domain alert from a decoded payload.
    ///
    /// Ids are trimmed; a whitespace-only id counts as absent.
    pub fn from_payload(payload: AlertPayload, origin: AlertOrigin) -> Self {
        let id = payload
            .id
            .map(|raw| raw.trim().to_owned())
            .filter(|raw| !raw.is_empty())
            .map(AlertId::from);

        Self {
            id,
            category: AlertCategory::from_wire(&payload.alert_type),
            city: payload.city,
            message: payload.message,
            event_time: payload.created_at,
            threshold_value: payload.threshold_value,
            actual_value: payload.actual_value,
            resolved: payload.is_resolved.unwrap_or(false),
            resolved_at: payload.resolved_at,
            origin,
        }
    }
}

// ── Stats ──────────────────────────────────────────────────────────

impl From<AlertStatsResponse> for AlertStats {
    fn from(raw: AlertStatsResponse) -> Self {
        let known = raw.by_type.temperature + raw.by_type.humidity + raw.by_type.aqi;
        Self {
            total: raw.total_alerts,
            resolved: raw.resolved_alerts,
            unresolved: raw.unresolved_alerts,
            by_category: CategoryCounts {
                temperature: raw.by_type.temperature,
                humidity: raw.by_type.humidity,
                air_quality: raw.by_type.aqi,
                other: raw.total_alerts.saturating_sub(known),
            },
        }
    }
}

// ── Filter → query ─────────────────────────────────────────────────

impl AlertFilter {
    /// Query parameters for polling under this filter.
    pub fn to_query(&self, window_hours: u32, limit: u32) -> AlertQuery {
        AlertQuery {
            alert_type: self.category.map(|c| c.wire_name().to_owned()),
            city: self.city.clone(),
            resolved: self.resolved,
            hours: window_hours,
            limit,
        }
    }
}
