// skywatch-api: Async Rust client for the weather alert backend (HTTP + push WebSocket)

pub mod client;
pub mod error;
pub mod models;
pub mod transport;
pub mod websocket;

pub use client::AlertClient;
pub use error::Error;
pub use models::{AlertPayload, AlertQuery, AlertStatsResponse, AlertTypeCounts};
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{ConnectionState, ReconnectConfig, WebSocketHandle};
