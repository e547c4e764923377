use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use futures_util::StreamExt;
use reqwest::Client;
use url::Url;

use positron_api::auth::{AppState, AppStateInner};
use positron_api::gemini::{ChatModel, TextStream, UpstreamError};
use positron_auth::{TokenVerifier, issue_token};
use positron_client::chats::ChatsClient;
use positron_client::identity::AuthSession;
use positron_client::relay::RelayClient;
use positron_client::session::ChatSession;
use positron_gateway::connection::{GatewayContext, handle_connection};
use positron_gateway::dispatcher::Dispatcher;
use positron_store::{ChatStore, Database, SqliteStore};
use positron_types::models::{Message, Role};

const SECRET: &str = "client-test-secret";

struct ScriptedModel {
    chunks: Vec<&'static str>,
    refuse: bool,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn stream_reply(
        &self,
        _history: &[Message],
        _prompt: &str,
    ) -> Result<TextStream, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(UpstreamError::Api {
                status: 500,
                message: "backend unavailable".into(),
            });
        }
        let items: Vec<Result<String, UpstreamError>> =
            self.chunks.iter().map(|c| Ok(c.to_string())).collect();
        Ok(futures_util::stream::iter(items).boxed())
    }
}

struct Harness {
    server: Url,
    calls: Arc<AtomicUsize>,
}

async fn ws_upgrade(State(ctx): State<GatewayContext>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, ctx))
}

async fn serve(app: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{}/", addr)).unwrap()
}

/// The real relay and gateway over in-memory SQLite and a scripted model.
async fn spawn_relay(chunks: Vec<&'static str>, refuse: bool) -> Harness {
    let calls = Arc::new(AtomicUsize::new(0));
    let store: Arc<dyn ChatStore> = Arc::new(SqliteStore::new(Database::open_in_memory().unwrap()));
    let verifier = TokenVerifier::SharedSecret(Arc::from(SECRET));
    let dispatcher = Dispatcher::new();

    let state: AppState = Arc::new(AppStateInner {
        model: Arc::new(ScriptedModel {
            chunks,
            refuse,
            calls: calls.clone(),
        }),
        store: store.clone(),
        verifier: verifier.clone(),
        dispatcher: dispatcher.clone(),
    });
    let gateway = GatewayContext {
        dispatcher,
        verifier,
        store,
    };

    let app = positron_api::router(state).merge(
        Router::new()
            .route("/gateway", get(ws_upgrade))
            .with_state(gateway),
    );

    Harness {
        server: serve(app).await,
        calls,
    }
}

fn session(server: &Url) -> ChatSession {
    let http = Client::new();
    ChatSession::new(
        RelayClient::new(http.clone(), server).unwrap(),
        ChatsClient::new(http, server.clone()),
    )
}

fn auth(uid: &str) -> AuthSession {
    AuthSession {
        uid: uid.into(),
        id_token: issue_token(SECRET, uid, None).unwrap(),
        refresh_token: String::new(),
        expires_at: Utc::now() + chrono::Duration::hours(1),
        display_name: None,
        email: None,
    }
}

async fn ask(session: &mut ChatSession, text: &str) -> bool {
    session.conversation.set_input(text);
    session.send().await
}

#[tokio::test]
async fn blank_input_sends_no_request() {
    let harness = spawn_relay(vec!["unused"], false).await;
    let mut session = session(&harness.server);

    assert!(!ask(&mut session, "").await);
    assert!(!ask(&mut session, "  \n\t").await);

    assert!(session.conversation.history().is_empty());
    assert_eq!(harness.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn streamed_chunks_become_one_model_message() {
    let harness = spawn_relay(vec!["I am ", "an android", ". I do not ", "dream."], false).await;
    let mut session = session(&harness.server);

    assert!(ask(&mut session, "Who are you?").await);

    let history = session.conversation.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[1].role, Role::Model);
    assert_eq!(history[1].text(), "I am an android. I do not dream.");
    assert!(!session.conversation.is_loading());
    assert!(session.conversation.error().is_none());
    assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn upstream_failure_shows_static_error() {
    let harness = spawn_relay(vec![], true).await;
    let mut session = session(&harness.server);

    assert!(ask(&mut session, "Hello").await);

    assert_eq!(session.conversation.error(), Some("Something went wrong."));
    assert!(!session.conversation.is_loading());
    assert_eq!(session.conversation.history().len(), 1);
}

#[tokio::test]
async fn malformed_chunk_keeps_streamed_text() {
    async fn broken() -> impl IntoResponse {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/event-stream")],
            "data: {\"text\":\"Spot is \"}\n\ndata: {\"text\":\"a cat\"}\n\ndata: garbage\n\n",
        )
    }
    let server = serve(Router::new().route("/api/generate", post(broken))).await;
    let mut session = session(&server);

    assert!(ask(&mut session, "Tell me about Spot").await);

    assert_eq!(session.conversation.error(), Some("Something went wrong."));
    assert_eq!(session.conversation.history().last().unwrap().text(), "Spot is a cat");
    assert!(!session.conversation.is_loading());
}

#[tokio::test]
async fn signed_in_turns_are_saved_under_one_id() {
    let harness = spawn_relay(vec!["Affirmative."], false).await;
    let mut session = session(&harness.server);
    session.sign_in(auth("data"));

    assert!(ask(&mut session, "Are you operational?").await);
    let chat_id = session.chat_id().unwrap().to_string();

    assert!(ask(&mut session, "Still operational?").await);
    assert_eq!(session.chat_id(), Some(chat_id.as_str()));

    let chats = ChatsClient::new(Client::new(), harness.server.clone());
    let stored = chats
        .get(&auth("data").id_token, &chat_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.title, "Are you operational?");
    assert_eq!(stored.messages, session.conversation.history());

    session.load_chats().await.unwrap();
    assert_eq!(session.sidebar.chats().len(), 1);
}

#[tokio::test]
async fn anonymous_turns_are_not_saved() {
    let harness = spawn_relay(vec!["Hello."], false).await;
    let mut session = session(&harness.server);

    assert!(ask(&mut session, "Hi").await);
    assert!(session.chat_id().is_none());

    let chats = ChatsClient::new(Client::new(), harness.server.clone());
    assert!(chats.list(&auth("data").id_token).await.unwrap().is_empty());
}

#[tokio::test]
async fn selecting_chat_replaces_history_verbatim() {
    let harness = spawn_relay(vec!["Noted."], false).await;
    let mut session = session(&harness.server);
    session.sign_in(auth("data"));

    assert!(ask(&mut session, "First conversation").await);
    let first_id = session.chat_id().unwrap().to_string();
    let first_history = session.conversation.history().to_vec();

    session.new_chat();
    assert!(session.conversation.history().is_empty());
    assert!(ask(&mut session, "Second conversation").await);
    assert_ne!(session.chat_id(), Some(first_id.as_str()));

    session.load_chats().await.unwrap();
    assert!(session.select_chat(&first_id).await.unwrap());

    assert_eq!(session.conversation.history(), first_history.as_slice());
    assert_eq!(session.chat_id(), Some(first_id.as_str()));
    assert_eq!(session.sidebar.selected(), Some(first_id.as_str()));
}

#[tokio::test]
async fn deleting_chat_removes_it_from_sidebar() {
    let harness = spawn_relay(vec!["Acknowledged."], false).await;
    let mut session = session(&harness.server);
    session.sign_in(auth("data"));

    assert!(ask(&mut session, "Keep this").await);
    let keep = session.chat_id().unwrap().to_string();
    session.new_chat();
    assert!(ask(&mut session, "Delete this").await);
    let doomed = session.chat_id().unwrap().to_string();

    session.load_chats().await.unwrap();
    assert_eq!(session.sidebar.chats().len(), 2);

    session.delete_chat(&doomed).await.unwrap();

    let ids: Vec<&str> = session.sidebar.chats().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec![keep.as_str()]);
    assert!(session.chat_id().is_none());

    session.load_chats().await.unwrap();
    assert_eq!(session.sidebar.chats().len(), 1);
}

#[tokio::test]
async fn sign_out_forgets_chat_state() {
    let harness = spawn_relay(vec!["Goodbye."], false).await;
    let mut session = session(&harness.server);
    session.sign_in(auth("data"));

    assert!(ask(&mut session, "Farewell").await);
    session.load_chats().await.unwrap();
    session.sign_out();

    assert!(!session.is_signed_in());
    assert!(session.chat_id().is_none());
    assert!(session.sidebar.chats().is_empty());
}

#[tokio::test]
async fn gateway_pushes_chat_list_changes() {
    let harness = spawn_relay(vec!["Logged."], false).await;
    let mut session = session(&harness.server);
    session.sign_in(auth("data"));

    let mut sub = session.subscribe().await.unwrap();
    assert_eq!(sub.uid(), "data");

    let wait = Duration::from_secs(5);
    let initial = tokio::time::timeout(wait, sub.next_snapshot())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(initial.is_empty());

    assert!(ask(&mut session, "Captain's log").await);

    // Submit and turn end each save once; wait for the list to show the chat.
    let chat_id = session.chat_id().unwrap().to_string();
    loop {
        let chats = tokio::time::timeout(wait, sub.next_snapshot())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        session.apply_snapshot(chats);
        if session.sidebar.chats().iter().any(|c| c.id == chat_id) {
            break;
        }
    }
    assert_eq!(session.sidebar.chats()[0].title, "Captain's log");

    sub.refresh().await.unwrap();
    let refreshed = tokio::time::timeout(wait, sub.next_snapshot())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.len(), 1);

    sub.close().await.unwrap();
}
