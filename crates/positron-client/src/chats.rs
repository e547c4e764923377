//! Saved-chat access: REST calls for reads and writes, and the gateway
//! subscription that keeps the sidebar current.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, StatusCode};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};
use url::Url;

use positron_types::api::SaveChatRequest;
use positron_types::events::{GatewayCommand, GatewayEvent};
use positron_types::models::{ChatRecord, ChatSummary, Message};

use crate::error::{ClientError, check_status};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct ChatsClient {
    http: Client,
    server: Url,
}

impl ChatsClient {
    pub fn new(http: Client, server: Url) -> Self {
        Self { http, server }
    }

    fn chats_url(&self, chat_id: Option<&str>) -> Result<Url, ClientError> {
        let path = match chat_id {
            Some(id) => format!("api/chats/{}", id),
            None => "api/chats".to_string(),
        };
        Ok(self.server.join(&path)?)
    }

    pub async fn list(&self, token: &str) -> Result<Vec<ChatSummary>, ClientError> {
        let resp = self
            .http
            .get(self.chats_url(None)?)
            .bearer_auth(token)
            .send()
            .await?;
        Ok(check_status(resp).await?.json().await?)
    }

    pub async fn get(&self, token: &str, chat_id: &str) -> Result<Option<ChatRecord>, ClientError> {
        let resp = self
            .http
            .get(self.chats_url(Some(chat_id))?)
            .bearer_auth(token)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(check_status(resp).await?.json().await?))
    }

    /// First save of a conversation; the server picks the id.
    pub async fn create(&self, token: &str, messages: &[Message]) -> Result<ChatRecord, ClientError> {
        let resp = self
            .http
            .post(self.chats_url(None)?)
            .bearer_auth(token)
            .json(&save_body(messages))
            .send()
            .await?;
        Ok(check_status(resp).await?.json().await?)
    }

    pub async fn save(
        &self,
        token: &str,
        chat_id: &str,
        messages: &[Message],
    ) -> Result<ChatRecord, ClientError> {
        let resp = self
            .http
            .put(self.chats_url(Some(chat_id))?)
            .bearer_auth(token)
            .json(&save_body(messages))
            .send()
            .await?;
        Ok(check_status(resp).await?.json().await?)
    }

    /// Returns false when the chat was already gone.
    pub async fn delete(&self, token: &str, chat_id: &str) -> Result<bool, ClientError> {
        let resp = self
            .http
            .delete(self.chats_url(Some(chat_id))?)
            .bearer_auth(token)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(resp).await?;
        Ok(true)
    }

    /// Open the gateway and identify. Resolves once the server sent `Ready`.
    pub async fn subscribe(&self, token: &str) -> Result<ChatSubscription, ClientError> {
        let mut ws_url = self.server.join("gateway")?;
        let scheme = if ws_url.scheme() == "https" { "wss" } else { "ws" };
        ws_url
            .set_scheme(scheme)
            .map_err(|_| ClientError::Protocol(format!("cannot use {} for the gateway", ws_url)))?;

        let (ws_stream, _) = connect_async(ws_url.as_str()).await?;
        let (tx, rx) = ws_stream.split();
        let mut sub = ChatSubscription {
            tx,
            rx,
            uid: String::new(),
        };

        sub.send(&GatewayCommand::Identify {
            token: token.to_string(),
        })
        .await?;

        match sub.next_event().await? {
            Some(GatewayEvent::Ready { uid }) => {
                info!("Gateway ready for {}", uid);
                sub.uid = uid;
                Ok(sub)
            }
            Some(other) => Err(ClientError::Protocol(format!(
                "expected Ready, got {:?}",
                other
            ))),
            None => Err(ClientError::Protocol("gateway closed before Ready".into())),
        }
    }
}

fn save_body(messages: &[Message]) -> SaveChatRequest {
    SaveChatRequest {
        title: None,
        messages: messages.to_vec(),
    }
}

/// Live chat list of one user.
pub struct ChatSubscription {
    tx: SplitSink<WsStream, WsMessage>,
    rx: SplitStream<WsStream>,
    uid: String,
}

impl ChatSubscription {
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Wait for the next chat list. `None` once the gateway is gone.
    pub async fn next_snapshot(&mut self) -> Result<Option<Vec<ChatSummary>>, ClientError> {
        loop {
            match self.next_event().await? {
                Some(GatewayEvent::ChatsSnapshot { chats }) => return Ok(Some(chats)),
                Some(GatewayEvent::Ready { .. }) => continue,
                None => return Ok(None),
            }
        }
    }

    /// Ask the server to push a fresh snapshot.
    pub async fn refresh(&mut self) -> Result<(), ClientError> {
        self.send(&GatewayCommand::Refresh).await
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.tx.send(WsMessage::Close(None)).await?;
        Ok(())
    }

    async fn send(&mut self, cmd: &GatewayCommand) -> Result<(), ClientError> {
        let json = serde_json::to_string(cmd)?;
        self.tx.send(WsMessage::text(json)).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<GatewayEvent>, ClientError> {
        while let Some(msg) = self.rx.next().await {
            match msg? {
                WsMessage::Text(text) => return Ok(Some(serde_json::from_str(text.as_str())?)),
                WsMessage::Close(_) => {
                    debug!("Gateway closed the connection");
                    return Ok(None);
                }
                _ => {}
            }
        }
        Ok(None)
    }
}
