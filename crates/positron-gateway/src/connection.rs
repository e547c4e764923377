use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use positron_auth::TokenVerifier;
use positron_store::{ChatStore, Owner};
use positron_types::events::{GatewayCommand, GatewayEvent};
use positron_types::models::is_valid_id;

use crate::dispatcher::{Dispatcher, ScopedEvent};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Time a new socket has to send `Identify`.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a gateway connection needs from the server.
#[derive(Clone)]
pub struct GatewayContext {
    pub dispatcher: Dispatcher,
    pub verifier: TokenVerifier,
    pub store: Arc<dyn ChatStore>,
}

/// Handle a single WebSocket connection: Identify, Ready, initial snapshot,
/// then relay the owner's snapshots until either side goes away.
pub async fn handle_connection(socket: WebSocket, ctx: GatewayContext) {
    let (mut sender, mut receiver) = socket.split();

    let owner = match wait_for_identify(&mut receiver, &ctx.verifier).await {
        Some(owner) => owner,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} connected to gateway", owner.uid);

    let ready = GatewayEvent::Ready {
        uid: owner.uid.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    // Subscribe before the first snapshot so no change slips between them.
    let broadcast_rx = ctx.dispatcher.subscribe();
    ctx.dispatcher.user_connected(&owner.uid).await;

    match ctx.store.list_chats(&owner).await {
        Ok(chats) => {
            if send_event(&mut sender, &GatewayEvent::ChatsSnapshot { chats }).await.is_err() {
                ctx.dispatcher.user_disconnected(&owner.uid).await;
                return;
            }
        }
        Err(e) => warn!("Initial snapshot for {} failed: {:#}", owner.uid, e),
    }

    run_connection_loop(sender, receiver, broadcast_rx, &ctx, owner.clone()).await;

    ctx.dispatcher.user_disconnected(&owner.uid).await;
    info!("{} disconnected from gateway", owner.uid);
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut broadcast_rx: tokio::sync::broadcast::Receiver<ScopedEvent>,
    ctx: &GatewayContext,
    owner: Owner,
) {
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward this owner's events to the client, with heartbeat
    let send_uid = owner.uid.clone();
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let scoped = match result {
                        Ok(scoped) => scoped,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if scoped.owner != send_uid {
                        continue;
                    }

                    if send_event(&mut sender, &scoped.event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_ctx = ctx.clone();
    let mut recv_task = tokio::spawn(async move {
        let mut owner = owner;
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_ctx, &mut owner, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            owner.uid,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn handle_command(ctx: &GatewayContext, owner: &mut Owner, cmd: GatewayCommand) {
    match cmd {
        // A later Identify swaps in a fresh token for the same user.
        GatewayCommand::Identify { token } => match ctx.verifier.verify(&token).await {
            Ok(claims) if claims.sub == owner.uid => owner.token = token,
            Ok(claims) => warn!("{} tried to re-identify as {}", owner.uid, claims.sub),
            Err(e) => warn!("{} re-identify failed: {}", owner.uid, e),
        },

        GatewayCommand::Refresh => {
            ctx.dispatcher.publish_snapshot(ctx.store.as_ref(), owner).await;
        }
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode gateway event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    verifier: &TokenVerifier,
) -> Option<Owner> {
    let identify = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    return match verifier.verify(&token).await {
                        Ok(claims) => identified_owner(claims.sub, token),
                        Err(e) => {
                            warn!("Gateway identify rejected: {}", e);
                            None
                        }
                    };
                }
            }
        }
        None
    });

    identify.await.ok().flatten()
}

/// The uid names storage paths, so a token whose subject is not a usable id
/// identifies nobody.
fn identified_owner(uid: String, token: String) -> Option<Owner> {
    if !is_valid_id(&uid) {
        warn!("Gateway identify rejected: unusable uid");
        return None;
    }
    Some(Owner { uid, token })
}
