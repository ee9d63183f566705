//! Application layer: the services and background work that orchestrate the
//! domain through its ports.
//!
//! Services take their collaborators as `Arc<dyn Port>` handles at construction,
//! so the same code runs against the in-memory adapters, the sandbox processor
//! or RocksDB-backed storage.

pub mod batch;
pub mod events;
pub mod jobs;
pub mod orders;
pub mod payouts;
pub mod pipeline;
pub mod schedule;
pub mod worker;
