// skywatch-core: Alert reconciliation and live monitoring between skywatch-api and consumers.

pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod model;
pub mod monitor;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{MonitorConfig, TlsVerification};
pub use engine::{
    PUSH_RETENTION, PollOutcome, PollStatus, PushOutcome, ReconciledView, ReconciliationEngine,
    ResolveStart, RetentionBuffer,
};
pub use error::CoreError;
pub use monitor::{Monitor, ResolveOutcome};
pub use stream::{ViewStream, ViewWatchStream};

// The push connection state is owned by the API layer.
pub use skywatch_api::{ConnectionState, ReconnectConfig};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Alert, AlertCategory, AlertFilter, AlertId, AlertOrigin, AlertStats, CategoryCounts,
    CompositeKey, SourcedStats, StatsSource,
};
