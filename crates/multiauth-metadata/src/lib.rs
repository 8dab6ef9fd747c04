//! Account and group storage for Multiauth
//!
//! Supports a SQLite backend and an in-memory backend.

pub mod memory;
pub mod repository;

pub use memory::MemoryStore;
pub use repository::SqliteStore;

use multiauth_core::{GroupStore, Result, UserStore};
use std::sync::Arc;

/// Account and group stores opened from one database URL
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub groups: Arc<dyn GroupStore>,
}

impl Stores {
    /// Open `memory` or a `sqlite:` URL
    pub async fn open(url: &str, max_connections: u32) -> Result<Self> {
        if url == "memory" {
            let store = Arc::new(MemoryStore::new());
            return Ok(Self {
                users: store.clone(),
                groups: store,
            });
        }

        let store = Arc::new(SqliteStore::new(url, max_connections).await?);
        Ok(Self {
            users: store.clone(),
            groups: store,
        })
    }
}
