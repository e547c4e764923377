use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS chats (
            user_id     TEXT NOT NULL,
            id          TEXT NOT NULL,
            title       TEXT NOT NULL,
            messages    TEXT NOT NULL,
            timestamp   TEXT NOT NULL,
            PRIMARY KEY (user_id, id)
        );

        CREATE INDEX IF NOT EXISTS idx_chats_user_time
            ON chats(user_id, timestamp);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
