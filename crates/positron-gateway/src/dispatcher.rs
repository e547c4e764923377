use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::{debug, error};

use positron_store::{ChatStore, Owner};
use positron_types::events::GatewayEvent;

/// A gateway event addressed to every connection of one user.
#[derive(Debug, Clone)]
pub struct ScopedEvent {
    pub owner: String,
    pub event: GatewayEvent,
}

/// Fans chat list changes out to connected clients.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// All connections receive all events and keep only their owner's.
    broadcast_tx: broadcast::Sender<ScopedEvent>,

    /// Open gateway connections per user id
    connections: RwLock<HashMap<String, usize>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScopedEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Send an event to every connection of `uid`.
    pub fn send_to_user(&self, uid: &str, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(ScopedEvent {
            owner: uid.to_string(),
            event,
        });
    }

    pub async fn user_connected(&self, uid: &str) {
        *self
            .inner
            .connections
            .write()
            .await
            .entry(uid.to_string())
            .or_default() += 1;
    }

    pub async fn user_disconnected(&self, uid: &str) {
        let mut connections = self.inner.connections.write().await;
        if let Some(count) = connections.get_mut(uid) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                connections.remove(uid);
            }
        }
    }

    pub async fn connection_count(&self, uid: &str) -> usize {
        self.inner.connections.read().await.get(uid).copied().unwrap_or(0)
    }

    /// Push the owner's current chat list to their open connections.
    /// Skips the store round trip when nobody is listening.
    pub async fn publish_snapshot(&self, store: &dyn ChatStore, owner: &Owner) {
        if self.connection_count(&owner.uid).await == 0 {
            debug!("No gateway connections for {}, skipping snapshot", owner.uid);
            return;
        }

        match store.list_chats(owner).await {
            Ok(chats) => self.send_to_user(&owner.uid, GatewayEvent::ChatsSnapshot { chats }),
            Err(e) => error!("Failed to list chats for {}: {:#}", owner.uid, e),
        }
    }
}
