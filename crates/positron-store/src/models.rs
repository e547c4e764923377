/// Database row types. These map directly to SQLite rows.
/// `messages` is the JSON-encoded message list; `timestamp` is RFC 3339
/// with millisecond precision so it sorts as text.

pub struct ChatRow {
    pub user_id: String,
    pub id: String,
    pub title: String,
    pub messages: String,
    pub timestamp: String,
}

pub struct ChatSummaryRow {
    pub id: String,
    pub title: String,
    pub timestamp: String,
}
