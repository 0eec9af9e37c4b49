//! Memory and retrieval backends.
//!
//! Session memory is an append-only transcript per session id; the
//! vector side stores embedded document chunks for retrieval-augmented
//! prompts. Both persistent backends live in PostgreSQL, the chunk
//! store behind the pgvector extension.

pub mod in_memory;
pub mod postgres;
pub mod vector;

pub use in_memory::InMemoryStore;
pub use postgres::{PgMemoryStore, migrate};
pub use vector::{PgVectorRetriever, PgVectorStore};
