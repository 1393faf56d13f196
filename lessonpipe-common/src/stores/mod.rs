//! Typed gateways to the two persisted stores
//!
//! The operational store (classes, users) is a SQL database reached through
//! `sqlx`; the analytical store (transcript artifacts, exercise sets) is a
//! REST row store reached through the [`AnalyticalStore`] trait. The split
//! follows the failure-domain boundary: classroom data and pipeline
//! artifacts never share a transaction, and each side is linearizable on
//! its own via conditional updates.

pub mod analytical;
pub mod memory;
pub mod operational;
pub mod rest;

pub use analytical::{AnalyticalStore, InsertOutcome};
pub use memory::MemoryAnalyticalStore;
pub use rest::RestAnalyticalStore;
