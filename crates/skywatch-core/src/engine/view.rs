// ── View reconciliation ──
//
// Merges the push buffer and the polled snapshot into one ordered,
// deduplicated list. Pure: identical inputs always give identical output.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::retention::RetentionBuffer;
use crate::model::{Alert, AlertFilter, AlertId, AlertOrigin, CompositeKey};

/// The merged alert list consumers render.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciledView {
    /// Newest `event_time` first.
    pub alerts: Vec<Alert>,
    /// The filter this view was computed under.
    pub filter: AlertFilter,
}

impl ReconciledView {
    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter()
    }

    pub fn get(&self, id: &AlertId) -> Option<&Alert> {
        self.alerts.iter().find(|a| a.id.as_ref() == Some(id))
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(|a| !a.resolved)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ViewKey {
    Id(AlertId),
    Composite(CompositeKey),
}

impl ViewKey {
    fn of(alert: &Alert) -> Self {
        match alert.id {
            Some(ref id) => Self::Id(id.clone()),
            None => Self::Composite(alert.composite_key()),
        }
    }
}

/// Build the view.
///
/// `is_marked_resolved` reports confirmed or in-flight resolutions kept
/// outside the records themselves.
pub(crate) fn reconcile(
    push: &RetentionBuffer,
    polled: &[Alert],
    filter: &AlertFilter,
    is_marked_resolved: impl Fn(&AlertId) -> bool,
) -> ReconciledView {
    let mut entries: Vec<Alert> = Vec::with_capacity(push.len() + polled.len());
    let mut index: HashMap<ViewKey, usize> = HashMap::new();

    // Push records first, newest first.
    for alert in push.iter() {
        let key = ViewKey::of(alert);
        if index.contains_key(&key) {
            continue;
        }
        index.insert(key, entries.len());
        entries.push(alert.clone());
    }

    // Polled records merge into matching push records or append.
    let mut seen_polled: HashSet<ViewKey> = HashSet::new();
    for alert in polled {
        let key = ViewKey::of(alert);
        if !seen_polled.insert(key.clone()) {
            tracing::trace!(?key, "duplicate alert in poll response");
            continue;
        }

        match find_merge_target(&index, &entries, alert, &key) {
            Some(idx) => {
                if let Some(slot) = entries.get_mut(idx) {
                    *slot = merge(slot, alert);
                }
                index.insert(key, idx);
            }
            None => {
                index.insert(key, entries.len());
                let mut entry = alert.clone();
                entry.origin = AlertOrigin::Polled;
                entries.push(entry);
            }
        }
    }

    for entry in &mut entries {
        if entry.id.as_ref().is_some_and(&is_marked_resolved) {
            entry.resolved = true;
        }
    }

    entries.retain(|a| filter.matches(a));

    // Stable: construction order survives among equal keys.
    entries.sort_by(|a, b| {
        b.event_time
            .cmp(&a.event_time)
            .then_with(|| a.origin.tie_rank().cmp(&b.origin.tie_rank()))
    });

    ReconciledView {
        alerts: entries,
        filter: filter.clone(),
    }
}

/// A polled record merges with a push record sharing its id, or with an
/// id-less push record sharing its composite key.
fn find_merge_target(
    index: &HashMap<ViewKey, usize>,
    entries: &[Alert],
    polled: &Alert,
    key: &ViewKey,
) -> Option<usize> {
    if let Some(&idx) = index.get(key) {
        return Some(idx);
    }

    if polled.id.is_none() {
        return None;
    }

    let idx = *index.get(&ViewKey::Composite(polled.composite_key()))?;
    entries
        .get(idx)
        .filter(|e| e.id.is_none() && e.origin == AlertOrigin::Push)
        .map(|_| idx)
}

/// Polled fields win; resolution is sticky across both.
fn merge(push: &Alert, polled: &Alert) -> Alert {
    Alert {
        id: polled.id.clone().or_else(|| push.id.clone()),
        resolved: polled.resolved || push.resolved,
        resolved_at: polled.resolved_at.or(push.resolved_at),
        origin: AlertOrigin::Merged,
        ..polled.clone()
    }
}
