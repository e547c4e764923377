use positron_types::models::ChatSummary;

pub const SIDEBAR_HEADING: &str = "My Chats";

/// Collapsible list of the signed-in user's chats.
#[derive(Debug, Default)]
pub struct Sidebar {
    open: bool,
    chats: Vec<ChatSummary>,
    selected: Option<String>,
}

impl Sidebar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn toggle(&mut self) {
        self.open = !self.open;
    }

    pub fn chats(&self) -> &[ChatSummary] {
        &self.chats
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Replace the list with a pushed snapshot, newest first.
    pub fn apply_snapshot(&mut self, mut chats: Vec<ChatSummary>) {
        chats.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(sel) = &self.selected {
            if !chats.iter().any(|c| &c.id == sel) {
                self.selected = None;
            }
        }
        self.chats = chats;
    }

    /// Drop a chat from the visible list. Returns false if it was not listed.
    pub fn remove(&mut self, chat_id: &str) -> bool {
        let before = self.chats.len();
        self.chats.retain(|c| c.id != chat_id);
        if self.selected.as_deref() == Some(chat_id) {
            self.selected = None;
        }
        self.chats.len() != before
    }

    pub fn select(&mut self, chat_id: &str) -> Option<&ChatSummary> {
        let chat = self.chats.iter().find(|c| c.id == chat_id)?;
        self.selected = Some(chat.id.clone());
        Some(chat)
    }

    pub fn deselect(&mut self) {
        self.selected = None;
    }

    /// Forget everything, e.g. on sign-out.
    pub fn clear(&mut self) {
        self.chats.clear();
        self.selected = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn summary(id: &str, secs: i64) -> ChatSummary {
        ChatSummary {
            id: id.into(),
            title: format!("chat {}", id),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    fn ids(sidebar: &Sidebar) -> Vec<&str> {
        sidebar.chats().iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn snapshot_sorted_newest_first() {
        let mut sidebar = Sidebar::new();
        sidebar.apply_snapshot(vec![summary("a", 10), summary("c", 30), summary("b", 20)]);
        assert_eq!(ids(&sidebar), vec!["c", "b", "a"]);
    }

    #[test]
    fn remove_hides_chat() {
        let mut sidebar = Sidebar::new();
        sidebar.apply_snapshot(vec![summary("a", 10), summary("b", 20)]);
        sidebar.select("a");

        assert!(sidebar.remove("a"));
        assert_eq!(ids(&sidebar), vec!["b"]);
        assert!(sidebar.selected().is_none());
        assert!(!sidebar.remove("a"));
    }

    #[test]
    fn select_unknown_is_none() {
        let mut sidebar = Sidebar::new();
        sidebar.apply_snapshot(vec![summary("a", 10)]);
        assert!(sidebar.select("zz").is_none());
        assert_eq!(sidebar.select("a").map(|c| c.id.as_str()), Some("a"));
        assert_eq!(sidebar.selected(), Some("a"));
    }

    #[test]
    fn snapshot_without_selected_clears_selection() {
        let mut sidebar = Sidebar::new();
        sidebar.apply_snapshot(vec![summary("a", 10)]);
        sidebar.select("a");
        sidebar.apply_snapshot(vec![summary("b", 20)]);
        assert!(sidebar.selected().is_none());
    }

    #[test]
    fn toggle_flips() {
        let mut sidebar = Sidebar::new();
        assert!(!sidebar.is_open());
        sidebar.toggle();
        assert!(sidebar.is_open());
        sidebar.toggle();
        assert!(!sidebar.is_open());
    }
}
