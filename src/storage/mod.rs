//! Run persistence.
//!
//! Provides JSON-based storage for finished runs with lookup by name or id.

mod run_store;

pub use run_store::{RunStore, RunSummary};
