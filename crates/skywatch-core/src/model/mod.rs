// ── Domain model ──
//
// Canonical alert types shared by the engine, the monitor and consumers.
// Wire payloads from `skywatch_api` are converted into these in `convert`.

pub mod alert;
pub mod stats;

pub use alert::{Alert, AlertCategory, AlertFilter, AlertId, AlertOrigin, CompositeKey};
pub use stats::{AlertStats, CategoryCounts, SourcedStats, StatsSource};
