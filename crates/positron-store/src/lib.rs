pub mod firestore;
pub mod local;
pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use positron_types::models::{ChatRecord, ChatSummary, Message};

pub use firestore::FirestoreStore;
pub use local::SqliteStore;

/// The signed-in user a store call acts for. `token` is the caller's
/// identity token; remote stores forward it so their own access rules apply.
#[derive(Debug, Clone)]
pub struct Owner {
    pub uid: String,
    pub token: String,
}

/// Per-user collection of saved conversations.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// All chats of `owner`, newest first.
    async fn list_chats(&self, owner: &Owner) -> Result<Vec<ChatSummary>>;

    async fn get_chat(&self, owner: &Owner, chat_id: &str) -> Result<Option<ChatRecord>>;

    /// Create or replace a chat. An existing record keeps its creation timestamp.
    async fn upsert_chat(
        &self,
        owner: &Owner,
        chat_id: &str,
        title: &str,
        messages: &[Message],
    ) -> Result<ChatRecord>;

    /// Returns false when there was nothing to delete.
    async fn delete_chat(&self, owner: &Owner, chat_id: &str) -> Result<bool>;
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }
}
