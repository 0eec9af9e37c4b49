//! In-memory store for tests and ephemeral sessions.

use async_trait::async_trait;
use tokio::sync::RwLock;

use colloquy_core::error::MemoryError;
use colloquy_core::memory::MemoryStore;

/// A store that keeps entries in a Vec for the life of the process.
pub struct InMemoryStore {
    entries: RwLock<Vec<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn add(&self, entry: &str) -> Result<(), MemoryError> {
        self.entries.write().await.push(entry.to_string());
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<String>, MemoryError> {
        Ok(self.entries.read().await.clone())
    }
}
