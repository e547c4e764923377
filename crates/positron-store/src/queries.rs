use crate::models::{ChatRow, ChatSummaryRow};
use crate::Database;
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Chats --

    /// Insert a chat or replace its title and messages. The stored
    /// timestamp of an existing row is left alone.
    pub fn upsert_chat(
        &self,
        user_id: &str,
        id: &str,
        title: &str,
        messages_json: &str,
        timestamp: &str,
    ) -> Result<ChatRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chats (user_id, id, title, messages, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id, id) DO UPDATE SET title = excluded.title, messages = excluded.messages",
                rusqlite::params![user_id, id, title, messages_json, timestamp],
            )?;
            query_chat(conn, user_id, id)?
                .ok_or_else(|| anyhow::anyhow!("chat {} vanished after upsert", id))
        })
    }

    pub fn get_chat(&self, user_id: &str, id: &str) -> Result<Option<ChatRow>> {
        self.with_conn(|conn| query_chat(conn, user_id, id))
    }

    /// Chats of one user, newest first.
    pub fn list_chats(&self, user_id: &str) -> Result<Vec<ChatSummaryRow>> {
        self.with_conn(|conn| query_chat_summaries(conn, user_id))
    }

    pub fn delete_chat(&self, user_id: &str, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM chats WHERE user_id = ?1 AND id = ?2",
                (user_id, id),
            )?;
            Ok(removed > 0)
        })
    }
}

fn query_chat(conn: &Connection, user_id: &str, id: &str) -> Result<Option<ChatRow>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, id, title, messages, timestamp FROM chats WHERE user_id = ?1 AND id = ?2",
    )?;

    let row = stmt
        .query_row([user_id, id], |row| {
            Ok(ChatRow {
                user_id: row.get(0)?,
                id: row.get(1)?,
                title: row.get(2)?,
                messages: row.get(3)?,
                timestamp: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_chat_summaries(conn: &Connection, user_id: &str) -> Result<Vec<ChatSummaryRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, timestamp
         FROM chats
         WHERE user_id = ?1
         ORDER BY timestamp DESC, id DESC",
    )?;

    let rows = stmt
        .query_map([user_id], |row| {
            Ok(ChatSummaryRow {
                id: row.get(0)?,
                title: row.get(1)?,
                timestamp: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
