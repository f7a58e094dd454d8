//! The Prometheus-compatible HTTP API: a public surface backed by the
//! replicated querier and rule manager, and a `/private` mirror backed
//! directly by this node's local store and rule manager.

pub mod client;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use client::HttpPeerClient;
pub use router::router;
pub use state::AppState;
