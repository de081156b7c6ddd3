// ── Push retention buffer ──
//
// Bounded, newest-first store of alerts received on the push stream.
// Independent of the polled snapshot: a large poll never evicts pushes.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use super::PushOutcome;
use crate::model::{Alert, AlertId};

/// Number of push alerts kept for the view.
pub const PUSH_RETENTION: usize = 50;

#[derive(Debug, Clone)]
pub struct RetentionBuffer {
    entries: VecDeque<Alert>,
    capacity: usize,
}

impl Default for RetentionBuffer {
    fn default() -> Self {
        Self::with_capacity(PUSH_RETENTION)
    }
}

impl RetentionBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert a push alert.
    ///
    /// A redelivery of a known alert replaces it in place: an id-less copy
    /// keeps the known id and the resolved flag never goes back to false.
    /// Anything else is prepended, evicting the oldest entry past capacity.
    pub fn insert(&mut self, mut alert: Alert) -> PushOutcome {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.is_same_alert(&alert)) {
            if alert.id.is_none() {
                alert.id = existing.id.take();
            }
            alert.resolved |= existing.resolved;
            if alert.resolved_at.is_none() {
                alert.resolved_at = existing.resolved_at;
            }
            *existing = alert;
            return PushOutcome::Replaced;
        }

        self.entries.push_front(alert);
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_back() {
                tracing::trace!(city = %evicted.city, "push alert aged out");
            }
        }
        PushOutcome::Inserted
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Alert> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains_id(&self, id: &AlertId) -> bool {
        self.entries.iter().any(|e| e.id.as_ref() == Some(id))
    }

    /// Set the resolved flag on every entry with this id.
    pub(crate) fn mark_resolved(&mut self, id: &AlertId, at: DateTime<Utc>) {
        for entry in self.entries.iter_mut().filter(|e| e.id.as_ref() == Some(id)) {
            entry.resolved = true;
            entry.resolved_at.get_or_insert(at);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::model::{AlertCategory, AlertOrigin};

    fn push(id: Option<&str>, city: &str, minute: i64) -> Alert {
        Alert {
            id: id.map(AlertId::from),
            category: AlertCategory::Temperature,
            city: city.into(),
            message: format!("High temperature alert in {city}"),
            event_time: Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap()
                + Duration::minutes(minute),
            threshold_value: None,
            actual_value: None,
            resolved: false,
            resolved_at: None,
            origin: AlertOrigin::Push,
        }
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut buffer = RetentionBuffer::default();
        for i in 0..120 {
            let id = i.to_string();
            buffer.insert(push(Some(&id), "Dubai", i));
            assert!(buffer.len() <= PUSH_RETENTION);
        }
        assert_eq!(buffer.len(), PUSH_RETENTION);

        // Holds the most recent 50, newest first.
        let ids: Vec<_> = buffer.iter().map(|a| a.id.clone().unwrap()).collect();
        assert_eq!(ids.first(), Some(&AlertId::from("119")));
        assert_eq!(ids.last(), Some(&AlertId::from("70")));
    }

    #[test]
    fn redelivery_replaces_in_place() {
        let mut buffer = RetentionBuffer::with_capacity(3);
        assert_eq!(buffer.insert(push(Some("1"), "Paris", 0)), PushOutcome::Inserted);
        assert_eq!(buffer.insert(push(Some("2"), "Lyon", 1)), PushOutcome::Inserted);

        let mut again = push(Some("1"), "Paris", 0);
        again.actual_value = Some(44.0);
        assert_eq!(buffer.insert(again), PushOutcome::Replaced);

        assert_eq!(buffer.len(), 2);
        let oldest = buffer.iter().last().unwrap();
        assert_eq!(oldest.id, Some(AlertId::from("1")));
        assert_eq!(oldest.actual_value, Some(44.0));
    }

    #[test]
    fn idless_redelivery_keeps_id_and_resolution() {
        let mut buffer = RetentionBuffer::default();
        let mut first = push(Some("A1"), "Paris", 0);
        first.resolved = true;
        buffer.insert(first);

        assert_eq!(buffer.insert(push(None, "Paris", 0)), PushOutcome::Replaced);

        let only = buffer.iter().next().unwrap();
        assert_eq!(only.id, Some(AlertId::from("A1")));
        assert!(only.resolved);
    }

    #[test]
    fn distinct_idless_alerts_stay_distinct() {
        let mut buffer = RetentionBuffer::default();
        buffer.insert(push(None, "Paris", 0));
        buffer.insert(push(None, "Paris", 1));
        buffer.insert(push(None, "Oslo", 0));
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn mark_resolved_sets_timestamp_once() {
        let mut buffer = RetentionBuffer::default();
        buffer.insert(push(Some("9"), "Paris", 0));

        let at = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        buffer.mark_resolved(&AlertId::from("9"), at);
        buffer.mark_resolved(&AlertId::from("9"), at + Duration::hours(1));

        let entry = buffer.iter().next().unwrap();
        assert!(entry.resolved);
        assert_eq!(entry.resolved_at, Some(at));
    }
}
