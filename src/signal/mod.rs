//! Signal ingestion: wire types, HTTP provider, and freshness tracking.

mod client;
mod freshness;
mod types;

pub use client::{HttpSignalProvider, SignalApiError, SignalProvider};
pub use freshness::{FreshnessState, FreshnessTracker};
pub use types::{sort_batch, Signal};
