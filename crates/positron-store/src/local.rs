use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use positron_types::models::{ChatRecord, ChatSummary, Message};

use crate::models::{ChatRow, ChatSummaryRow};
use crate::{ChatStore, Database, Owner};

/// SQLite-backed store for local development. Tokens are not checked here;
/// the caller has already been verified.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db: Arc::new(db) }
    }

    /// Run a blocking DB call off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(db.as_ref()))
            .await
            .context("spawn_blocking join error")?
    }
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn list_chats(&self, owner: &Owner) -> Result<Vec<ChatSummary>> {
        let uid = owner.uid.clone();
        let rows = self.blocking(move |db| db.list_chats(&uid)).await?;
        rows.into_iter().map(summary_from_row).collect()
    }

    async fn get_chat(&self, owner: &Owner, chat_id: &str) -> Result<Option<ChatRecord>> {
        let uid = owner.uid.clone();
        let id = chat_id.to_string();
        let row = self.blocking(move |db| db.get_chat(&uid, &id)).await?;
        row.map(record_from_row).transpose()
    }

    async fn upsert_chat(
        &self,
        owner: &Owner,
        chat_id: &str,
        title: &str,
        messages: &[Message],
    ) -> Result<ChatRecord> {
        let uid = owner.uid.clone();
        let id = chat_id.to_string();
        let title = title.to_string();
        let messages = serde_json::to_string(messages)?;
        let now = format_timestamp(Utc::now());

        let row = self
            .blocking(move |db| db.upsert_chat(&uid, &id, &title, &messages, &now))
            .await?;
        record_from_row(row)
    }

    async fn delete_chat(&self, owner: &Owner, chat_id: &str) -> Result<bool> {
        let uid = owner.uid.clone();
        let id = chat_id.to_string();
        self.blocking(move |db| db.delete_chat(&uid, &id)).await
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("corrupt chat timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

fn record_from_row(row: ChatRow) -> Result<ChatRecord> {
    let messages: Vec<Message> = serde_json::from_str(&row.messages)
        .with_context(|| format!("corrupt messages on chat '{}' of '{}'", row.id, row.user_id))?;
    Ok(ChatRecord {
        timestamp: parse_timestamp(&row.timestamp)?,
        id: row.id,
        title: row.title,
        messages,
    })
}

fn summary_from_row(row: ChatSummaryRow) -> Result<ChatSummary> {
    Ok(ChatSummary {
        timestamp: parse_timestamp(&row.timestamp)?,
        id: row.id,
        title: row.title,
    })
}
