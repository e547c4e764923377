//! Chat window state: the visible history, the input line, the loading flag
//! and the error line.

use tracing::error;

use positron_types::models::{Message, Role};

use crate::error::{ClientError, USER_FACING_ERROR};

/// Shown under the input box.
pub const DISCLAIMER: &str = "Chats are not private. Do not enter private/confidential information.";

pub const INPUT_PLACEHOLDER: &str = "Chat with Data";

#[derive(Debug, Default)]
pub struct Conversation {
    history: Vec<Message>,
    input: String,
    loading: bool,
    error: Option<String>,
    /// Running concatenation of the chunks of the turn in flight.
    streamed: String,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Start a turn from the current input.
    ///
    /// Returns the history to send to the relay, or `None` when nothing should
    /// be sent: blank input is discarded, and a submission while a reply is
    /// still streaming is dropped.
    pub fn submit(&mut self) -> Option<Vec<Message>> {
        if self.loading {
            return None;
        }
        if self.input.trim().is_empty() {
            self.input.clear();
            return None;
        }

        let text = std::mem::take(&mut self.input);
        self.history.push(Message::new(Role::User, text));
        self.loading = true;
        self.error = None;
        self.streamed.clear();
        Some(self.history.clone())
    }

    /// Apply one streamed chunk. The in-progress model bubble is rewritten
    /// with the running text, or created if the turn has none yet.
    pub fn append_chunk(&mut self, text: &str) {
        self.streamed.push_str(text);

        if let Some(last) = self.history.last_mut().filter(|m| m.role == Role::Model) {
            last.set_text(self.streamed.as_str());
        } else {
            self.history
                .push(Message::new(Role::Model, self.streamed.as_str()));
        }
    }

    /// End the turn successfully.
    pub fn finish(&mut self) {
        self.loading = false;
    }

    /// End the turn with an error. Streamed text stays visible.
    pub fn fail(&mut self, err: &ClientError) {
        error!("Chat turn failed: {}", err);
        self.error = Some(USER_FACING_ERROR.to_string());
        self.loading = false;
    }

    /// Replace the visible history with a stored chat, verbatim.
    pub fn load(&mut self, messages: Vec<Message>) {
        self.history = messages;
        self.error = None;
        self.streamed.clear();
    }

    /// Start over with an empty window.
    pub fn clear(&mut self) {
        self.history.clear();
        self.input.clear();
        self.error = None;
        self.streamed.clear();
    }
}
