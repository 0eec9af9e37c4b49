//! MemoryStore trait: per-session durable conversation history.
//!
//! A store is an ordered, append-only log of opaque strings scoped to a
//! single session. The runtime folds the log into the system prompt at
//! the start of a run and writes the finished turn back at the end.
//! Capacity and retention policy belong to the concrete backend, not to
//! this abstraction.

use async_trait::async_trait;

use crate::error::MemoryError;

/// The memory capability.
///
/// Implementations: in-memory (tests, single process), PostgreSQL keyed
/// by session id.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g. "in_memory", "postgres").
    fn name(&self) -> &str;

    /// Append one entry to the log.
    async fn add(&self, entry: &str) -> Result<(), MemoryError>;

    /// The full log in insertion order.
    async fn get_all(&self) -> Result<Vec<String>, MemoryError>;
}
