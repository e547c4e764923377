use chrono::Utc;
use tracing::{debug, error, info};

use positron_types::models::ChatSummary;

use crate::chats::{ChatSubscription, ChatsClient};
use crate::conversation::Conversation;
use crate::error::ClientError;
use crate::identity::{AuthSession, FirebaseIdentity};
use crate::relay::RelayClient;
use crate::sidebar::Sidebar;

/// One chat window: conversation, sidebar, sign-in state and the id of the
/// stored chat the conversation is saved under.
pub struct ChatSession {
    relay: RelayClient,
    chats: ChatsClient,
    identity: Option<FirebaseIdentity>,
    auth: Option<AuthSession>,
    chat_id: Option<String>,
    pub conversation: Conversation,
    pub sidebar: Sidebar,
}

impl ChatSession {
    pub fn new(relay: RelayClient, chats: ChatsClient) -> Self {
        Self {
            relay,
            chats,
            identity: None,
            auth: None,
            chat_id: None,
            conversation: Conversation::new(),
            sidebar: Sidebar::new(),
        }
    }

    /// Enables Google sign-in and token refresh.
    pub fn with_identity(mut self, identity: FirebaseIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn is_signed_in(&self) -> bool {
        self.auth.is_some()
    }

    pub fn user(&self) -> Option<&AuthSession> {
        self.auth.as_ref()
    }

    /// Id of the stored chat the conversation is saved under, if any.
    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    pub async fn sign_in_with_google(&mut self, google_id_token: &str) -> Result<(), ClientError> {
        let identity = self.identity.as_ref().ok_or(ClientError::NotSignedIn)?;
        let auth = identity.sign_in_with_google(google_id_token).await?;
        self.sign_in(auth);
        Ok(())
    }

    /// Adopt an already established session.
    pub fn sign_in(&mut self, auth: AuthSession) {
        info!("Session signed in as {}", auth.uid);
        self.auth = Some(auth);
    }

    pub fn sign_out(&mut self) {
        if let Some(auth) = self.auth.take() {
            info!("Session signed out ({})", auth.uid);
        }
        self.chat_id = None;
        self.sidebar.clear();
    }

    /// Current ID token, refreshed first when it is about to expire.
    pub async fn id_token(&mut self) -> Result<String, ClientError> {
        let auth = self.auth.as_ref().ok_or(ClientError::NotSignedIn)?;
        if let Some(identity) = &self.identity {
            if auth.needs_refresh(Utc::now()) {
                debug!("Refreshing identity token");
                let refreshed = identity.refresh(auth).await?;
                self.auth = Some(refreshed);
            }
        }
        self.auth
            .as_ref()
            .map(|a| a.id_token.clone())
            .ok_or(ClientError::NotSignedIn)
    }

    /// Submit the input line and stream the reply.
    ///
    /// Returns false when nothing was sent (blank input or a reply already
    /// in flight). While signed in the conversation is saved on submit and
    /// again once the turn is over. Relay failures are shown on the
    /// conversation; save failures are only logged.
    pub async fn send(&mut self) -> bool {
        let Some(history) = self.conversation.submit() else {
            return false;
        };

        self.persist().await;
        // The failure is already on the conversation's error line.
        let _ = self.relay.run_turn(&mut self.conversation, &history).await;
        self.persist().await;
        true
    }

    async fn persist(&mut self) {
        if !self.is_signed_in() {
            return;
        }
        if let Err(e) = self.save().await {
            error!("Saving chat failed: {}", e);
        }
    }

    /// Upsert the visible history. The first save creates the stored chat
    /// and caches its id.
    pub async fn save(&mut self) -> Result<(), ClientError> {
        let token = self.id_token().await?;
        let messages = self.conversation.history();

        let record = match &self.chat_id {
            Some(id) => self.chats.save(&token, id, messages).await?,
            None => self.chats.create(&token, messages).await?,
        };
        if self.chat_id.is_none() {
            debug!("Conversation stored as {}", record.id);
            self.chat_id = Some(record.id);
        }
        Ok(())
    }

    /// Show a stored chat and continue it under its id.
    pub async fn select_chat(&mut self, chat_id: &str) -> Result<bool, ClientError> {
        let token = self.id_token().await?;
        let Some(record) = self.chats.get(&token, chat_id).await? else {
            self.sidebar.remove(chat_id);
            return Ok(false);
        };

        self.sidebar.select(&record.id);
        self.conversation.load(record.messages);
        self.chat_id = Some(record.id);
        Ok(true)
    }

    /// Delete a stored chat and drop it from the sidebar.
    pub async fn delete_chat(&mut self, chat_id: &str) -> Result<(), ClientError> {
        let token = self.id_token().await?;
        if !self.chats.delete(&token, chat_id).await? {
            debug!("Chat {} was already gone", chat_id);
        }
        self.sidebar.remove(chat_id);
        if self.chat_id.as_deref() == Some(chat_id) {
            self.chat_id = None;
        }
        Ok(())
    }

    /// Empty window; the next save starts a new stored chat.
    pub fn new_chat(&mut self) {
        self.conversation.clear();
        self.sidebar.deselect();
        self.chat_id = None;
    }

    /// Fetch the chat list once, without the gateway.
    pub async fn load_chats(&mut self) -> Result<(), ClientError> {
        let token = self.id_token().await?;
        let chats = self.chats.list(&token).await?;
        self.sidebar.apply_snapshot(chats);
        Ok(())
    }

    /// Open the live chat list. Feed its snapshots to [`Self::apply_snapshot`].
    pub async fn subscribe(&mut self) -> Result<ChatSubscription, ClientError> {
        let token = self.id_token().await?;
        self.chats.subscribe(&token).await
    }

    pub fn apply_snapshot(&mut self, chats: Vec<ChatSummary>) {
        if self.is_signed_in() {
            self.sidebar.apply_snapshot(chats);
        }
    }
}
