//! autoscaler-state — domain types and embedded state store.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for scaling policies, per-instance metric history, and service
//! bindings.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{app_id}:{metric}:{collected_at}:{index}`) enable
//! prefix scans for an application's history.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod schedule;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
