// ── Alert reconciliation engine ──
//
// Single-owner, synchronous state behind the monitor: the push retention
// buffer, the latest polled snapshot, the active filter, and the resolve
// bookkeeping. Every mutation is a method call; the view is derived on
// demand and never stored.

mod retention;
mod view;

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::model::{Alert, AlertFilter, AlertId, AlertOrigin, AlertStats};

pub use retention::{PUSH_RETENTION, RetentionBuffer};
pub use view::ReconciledView;

// ── Outcomes ────────────────────────────────────────────────────────

/// Result of [`ReconciliationEngine::on_push_alert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// A new alert entered the buffer.
    Inserted,
    /// A known alert was redelivered and updated in place.
    Replaced,
}

/// Result of [`ReconciliationEngine::on_poll_result`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
    /// The polled snapshot replaced the previous one.
    Applied,
    /// The response belonged to an older filter and was discarded.
    Stale,
}

/// Result of [`ReconciliationEngine::begin_resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStart {
    /// No alert with this id is known. Nothing changed.
    NotFound,
    /// Already resolved. No backend call needed.
    AlreadyResolved,
    /// Another resolve for this id is in flight.
    InProgress,
    /// Optimistically marked resolved; the backend call should follow.
    Pending,
}

/// Freshness of the polled snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollStatus {
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

// ── ReconciliationEngine ────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ReconciliationEngine {
    push: RetentionBuffer,
    polled: Vec<Alert>,
    filter: AlertFilter,
    confirmed_resolved: HashSet<AlertId>,
    pending_resolves: HashSet<AlertId>,
    poll_status: PollStatus,
}

impl ReconciliationEngine {
    pub fn new(filter: AlertFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn filter(&self) -> &AlertFilter {
        &self.filter
    }

    pub fn poll_status(&self) -> &PollStatus {
        &self.poll_status
    }

    pub fn push_buffer(&self) -> &RetentionBuffer {
        &self.push
    }

    // ── Inputs ──────────────────────────────────────────────────────

    pub fn on_push_alert(&mut self, mut alert: Alert) -> PushOutcome {
        alert.origin = AlertOrigin::Push;
        // Outlives the buffer entry, so eviction cannot un-resolve it.
        if let (true, Some(id)) = (alert.resolved, alert.id.as_ref()) {
            self.confirmed_resolved.insert(id.clone());
        }
        self.push.insert(alert)
    }

    /// Replace the polled snapshot, unless `filter` is no longer active.
    pub fn on_poll_result(&mut self, alerts: Vec<Alert>, filter: &AlertFilter) -> PollOutcome {
        if *filter != self.filter {
            tracing::debug!(
                response_filter = %filter,
                active_filter = %self.filter,
                "discarding stale poll response"
            );
            return PollOutcome::Stale;
        }

        self.polled = alerts
            .into_iter()
            .map(|mut a| {
                a.origin = AlertOrigin::Polled;
                a
            })
            .collect();

        // The server is authoritative about resolutions it reports.
        for alert in &self.polled {
            if let (true, Some(id)) = (alert.resolved, alert.id.as_ref()) {
                self.confirmed_resolved.insert(id.clone());
            }
        }
        self.prune_confirmed();

        self.poll_status.last_success = Some(Utc::now());
        self.poll_status.last_error = None;
        PollOutcome::Applied
    }

    /// Record a failed poll. The previous snapshot stays.
    pub fn on_poll_failed(&mut self, filter: &AlertFilter, message: impl Into<String>) {
        if *filter != self.filter {
            return;
        }
        self.poll_status.last_error = Some(message.into());
    }

    /// Change the active filter. Returns `false` if it was already active.
    pub fn set_filter(&mut self, filter: AlertFilter) -> bool {
        if filter == self.filter {
            return false;
        }
        tracing::debug!(from = %self.filter, to = %filter, "filter changed");
        self.filter = filter;
        true
    }

    // ── Resolution ──────────────────────────────────────────────────

    pub fn begin_resolve(&mut self, id: &AlertId) -> ResolveStart {
        if !self.is_known(id) {
            return ResolveStart::NotFound;
        }
        if self.pending_resolves.contains(id) {
            return ResolveStart::InProgress;
        }
        if self.is_resolved(id) {
            return ResolveStart::AlreadyResolved;
        }
        self.pending_resolves.insert(id.clone());
        ResolveStart::Pending
    }

    /// Settle a pending resolve. A rejection reverts only this id.
    pub fn finish_resolve(&mut self, id: &AlertId, accepted: bool) {
        if !self.pending_resolves.remove(id) {
            tracing::debug!(%id, "finish_resolve without a pending resolve");
        }
        if !accepted {
            return;
        }

        let now = Utc::now();
        self.confirmed_resolved.insert(id.clone());
        self.push.mark_resolved(id, now);
        for alert in self.polled.iter_mut().filter(|a| a.id.as_ref() == Some(id)) {
            alert.resolved = true;
            alert.resolved_at.get_or_insert(now);
        }
    }

    /// Resolved on the server, or optimistically resolved here.
    pub fn is_resolved(&self, id: &AlertId) -> bool {
        self.is_marked_resolved(id)
            || self
                .push
                .iter()
                .chain(self.polled.iter())
                .any(|a| a.id.as_ref() == Some(id) && a.resolved)
    }

    fn is_marked_resolved(&self, id: &AlertId) -> bool {
        self.confirmed_resolved.contains(id) || self.pending_resolves.contains(id)
    }

    fn is_known(&self, id: &AlertId) -> bool {
        self.push.contains_id(id) || self.polled.iter().any(|a| a.id.as_ref() == Some(id))
    }

    /// Forget confirmations for ids that left both sources.
    fn prune_confirmed(&mut self) {
        let live: HashSet<&AlertId> = self
            .push
            .iter()
            .chain(self.polled.iter())
            .filter_map(|a| a.id.as_ref())
            .chain(self.pending_resolves.iter())
            .collect();
        self.confirmed_resolved.retain(|id| live.contains(id));
    }

    // ── Derived ─────────────────────────────────────────────────────

    pub fn compute_view(&self) -> ReconciledView {
        view::reconcile(&self.push, &self.polled, &self.filter, |id| {
            self.is_marked_resolved(id)
        })
    }

    /// Counts over the current view within the trailing window.
    pub fn compute_stats(&self, window_hours: u32, now: DateTime<Utc>) -> AlertStats {
        let since = now
            .checked_sub_signed(Duration::hours(i64::from(window_hours)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let view = self.compute_view();
        AlertStats::tally(view.iter().filter(|a| a.event_time >= since))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::AlertCategory;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn alert(id: Option<&str>, category: AlertCategory, city: &str, minute: i64) -> Alert {
        Alert {
            id: id.map(AlertId::from),
            category,
            city: city.into(),
            message: format!("{category} alert in {city}"),
            event_time: at(minute),
            threshold_value: None,
            actual_value: None,
            resolved: false,
            resolved_at: None,
            origin: AlertOrigin::Push,
        }
    }

    fn temp(id: &str, city: &str, minute: i64) -> Alert {
        alert(Some(id), AlertCategory::Temperature, city, minute)
    }

    #[test]
    fn push_buffer_is_capped() {
        let mut engine = ReconciliationEngine::default();
        for i in 0..75 {
            engine.on_push_alert(temp(&i.to_string(), "Dubai", i));
        }
        assert_eq!(engine.push_buffer().len(), PUSH_RETENTION);
        assert_eq!(engine.compute_view().len(), PUSH_RETENTION);
    }

    #[test]
    fn large_poll_does_not_evict_pushes() {
        let mut engine = ReconciliationEngine::default();
        engine.on_push_alert(temp("p", "Dubai", 0));

        let polled: Vec<_> = (0..200).map(|i| temp(&format!("q{i}"), "Oslo", i)).collect();
        engine.on_poll_result(polled, &AlertFilter::all());

        assert_eq!(engine.push_buffer().len(), 1);
        assert_eq!(engine.compute_view().len(), 201);
    }

    #[test]
    fn push_then_poll_same_id_yields_one_entry() {
        let mut engine = ReconciliationEngine::default();
        engine.on_push_alert(temp("42", "Cairo", 0));
        engine.on_poll_result(vec![temp("42", "Cairo", 0)], &AlertFilter::all());

        let view = engine.compute_view();
        assert_eq!(view.len(), 1);
        assert_eq!(view.alerts[0].origin, AlertOrigin::Merged);
    }

    #[test]
    fn paris_push_without_id_merges_with_polled_a1() {
        let mut engine = ReconciliationEngine::default();
        engine.on_push_alert(alert(None, AlertCategory::Temperature, "Paris", 0));
        engine.on_poll_result(
            vec![alert(Some("A1"), AlertCategory::Temperature, "Paris", 0)],
            &AlertFilter::all(),
        );

        let view = engine.compute_view();
        let paris: Vec<_> = view.iter().filter(|a| a.city == "Paris").collect();
        assert_eq!(paris.len(), 1);
        assert_eq!(paris[0].id, Some(AlertId::from("A1")));
    }

    #[test]
    fn stale_humidity_poll_is_discarded() {
        let humidity = AlertFilter::for_category(AlertCategory::Humidity);
        let temperature = AlertFilter::for_category(AlertCategory::Temperature);

        let mut engine = ReconciliationEngine::new(humidity.clone());
        assert!(engine.set_filter(temperature.clone()));

        let late = vec![alert(Some("h1"), AlertCategory::Humidity, "Manila", 0)];
        assert_eq!(engine.on_poll_result(late, &humidity), PollOutcome::Stale);
        assert!(engine.poll_status().last_success.is_none());

        let fresh = vec![temp("t1", "Dubai", 0)];
        assert_eq!(engine.on_poll_result(fresh, &temperature), PollOutcome::Applied);

        let view = engine.compute_view();
        assert_eq!(view.len(), 1);
        assert!(view.iter().all(|a| a.category == AlertCategory::Temperature));
    }

    #[test]
    fn failed_poll_keeps_previous_snapshot() {
        let mut engine = ReconciliationEngine::default();
        engine.on_poll_result(vec![temp("1", "Lima", 0)], &AlertFilter::all());
        engine.on_poll_failed(&AlertFilter::all(), "connection refused");

        assert_eq!(engine.compute_view().len(), 1);
        assert_eq!(
            engine.poll_status().last_error.as_deref(),
            Some("connection refused")
        );
        assert!(engine.poll_status().last_success.is_some());

        // A later success clears the error.
        engine.on_poll_result(vec![temp("1", "Lima", 0)], &AlertFilter::all());
        assert!(engine.poll_status().last_error.is_none());
    }

    #[test]
    fn resolve_is_optimistic_then_confirmed() {
        let mut engine = ReconciliationEngine::default();
        engine.on_poll_result(vec![temp("9", "Lima", 0)], &AlertFilter::all());
        let id = AlertId::from("9");

        assert_eq!(engine.begin_resolve(&id), ResolveStart::Pending);
        assert!(engine.compute_view().get(&id).unwrap().resolved);
        assert_eq!(engine.begin_resolve(&id), ResolveStart::InProgress);

        engine.finish_resolve(&id, true);
        assert!(engine.compute_view().get(&id).unwrap().resolved);
        assert_eq!(engine.begin_resolve(&id), ResolveStart::AlreadyResolved);
    }

    #[test]
    fn rejected_resolve_reverts_only_target() {
        let mut engine = ReconciliationEngine::default();
        engine.on_poll_result(
            vec![temp("1", "Lima", 0), temp("2", "Quito", 1)],
            &AlertFilter::all(),
        );
        let one = AlertId::from("1");
        let two = AlertId::from("2");

        assert_eq!(engine.begin_resolve(&one), ResolveStart::Pending);
        assert_eq!(engine.begin_resolve(&two), ResolveStart::Pending);
        engine.finish_resolve(&two, true);
        engine.finish_resolve(&one, false);

        let view = engine.compute_view();
        assert!(!view.get(&one).unwrap().resolved);
        assert!(view.get(&two).unwrap().resolved);
    }

    #[test]
    fn resolve_unknown_id_is_not_found() {
        let mut engine = ReconciliationEngine::default();
        engine.on_push_alert(temp("1", "Lima", 0));
        let before = engine.compute_view();

        assert_eq!(engine.begin_resolve(&AlertId::from("999")), ResolveStart::NotFound);
        assert_eq!(engine.compute_view(), before);
    }

    #[test]
    fn resolution_survives_later_unresolved_poll() {
        let mut engine = ReconciliationEngine::default();
        engine.on_poll_result(vec![temp("5", "Lima", 0)], &AlertFilter::all());
        let id = AlertId::from("5");
        engine.begin_resolve(&id);
        engine.finish_resolve(&id, true);

        // Backend replica lag: the next poll still says unresolved.
        engine.on_poll_result(vec![temp("5", "Lima", 0)], &AlertFilter::all());
        assert!(engine.compute_view().get(&id).unwrap().resolved);

        // A push redelivery does not regress it either.
        engine.on_push_alert(temp("5", "Lima", 0));
        assert!(engine.compute_view().get(&id).unwrap().resolved);
    }

    #[test]
    fn push_resolution_survives_eviction() {
        let mut engine = ReconciliationEngine::default();
        let id = AlertId::from("X");
        let mut resolved = temp("X", "Lima", 0);
        resolved.resolved = true;
        engine.on_push_alert(resolved);
        engine.on_poll_result(vec![temp("X", "Lima", 0)], &AlertFilter::all());
        assert!(engine.compute_view().get(&id).unwrap().resolved);

        for i in 0..PUSH_RETENTION {
            engine.on_push_alert(temp(&format!("n{i}"), "Oslo", 10));
        }
        assert!(!engine.push_buffer().contains_id(&id));

        engine.on_poll_result(vec![temp("X", "Lima", 0)], &AlertFilter::all());
        let view = engine.compute_view();
        let entry = view.get(&id).unwrap();
        assert_eq!(entry.origin, AlertOrigin::Polled);
        assert!(entry.resolved);
        assert_eq!(engine.begin_resolve(&id), ResolveStart::AlreadyResolved);
    }

    #[test]
    fn compute_view_is_deterministic() {
        let mut engine = ReconciliationEngine::default();
        engine.on_push_alert(alert(None, AlertCategory::Humidity, "Oslo", 3));
        engine.on_push_alert(temp("2", "Rome", 3));
        engine.on_poll_result(
            vec![temp("2", "Rome", 3), temp("1", "Rome", 3), temp("3", "Bern", 1)],
            &AlertFilter::all(),
        );

        assert_eq!(engine.compute_view(), engine.compute_view());
    }

    #[test]
    fn stats_count_the_window() {
        let mut engine = ReconciliationEngine::default();
        let mut resolved = alert(Some("1"), AlertCategory::AirQuality, "Delhi", 0);
        resolved.resolved = true;
        engine.on_poll_result(
            vec![
                resolved,
                alert(Some("2"), AlertCategory::Humidity, "Manila", 30),
                temp("3", "Dubai", 60),
            ],
            &AlertFilter::all(),
        );

        let now = at(60);
        let day = engine.compute_stats(24, now);
        assert_eq!(day.total, 3);
        assert_eq!(day.resolved, 1);
        assert_eq!(day.unresolved, 2);
        assert_eq!(day.by_category.air_quality, 1);

        let last_hour = engine.compute_stats(1, now + Duration::minutes(1));
        assert_eq!(last_hour.total, 2);
        assert_eq!(last_hour.by_category.air_quality, 0);
    }

    #[test]
    fn stats_window_larger_than_the_calendar_counts_everything() {
        let mut engine = ReconciliationEngine::default();
        engine.on_poll_result(vec![temp("1", "Lima", 0)], &AlertFilter::all());

        let stats = engine.compute_stats(u32::MAX, Utc::now());
        assert_eq!(stats.total, 1);

        let empty =
            ReconciliationEngine::default().compute_stats(u32::MAX, DateTime::<Utc>::MIN_UTC);
        assert_eq!(empty.total, 0);
    }
}
