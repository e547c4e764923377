mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use positron_api::auth::{AppState, AppStateInner};
use positron_api::gemini::{GeminiClient, GeminiConfig};
use positron_auth::{FirebaseVerifier, TokenVerifier};
use positron_gateway::connection::{self, GatewayContext};
use positron_gateway::dispatcher::Dispatcher;
use positron_store::{ChatStore, Database, FirestoreStore, SqliteStore};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "positron=debug,positron_api=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}.", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let http = reqwest::Client::builder()
        .user_agent(concat!("positron/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let model = GeminiClient::new(
        http.clone(),
        GeminiConfig {
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            base_url: config.gemini_base_url.clone(),
        },
    );

    // Identity and persistence
    let (verifier, store): (TokenVerifier, Arc<dyn ChatStore>) = match &config.firebase_project_id {
        Some(project) => {
            info!("Using Firebase project {} for sign-in and Firestore", project);
            (
                TokenVerifier::Firebase(Arc::new(FirebaseVerifier::new(http.clone(), project))),
                Arc::new(FirestoreStore::new(
                    http.clone(),
                    &config.firestore_base_url,
                    project,
                )),
            )
        }
        None => {
            let verifier = match &config.dev_secret {
                Some(secret) => {
                    warn!("Using shared-secret development tokens; do not expose this server");
                    TokenVerifier::SharedSecret(Arc::from(secret.as_str()))
                }
                None => {
                    warn!("No identity provider configured; chat history is unavailable");
                    TokenVerifier::Disabled
                }
            };
            let db = Database::open(&config.db_path)?;
            (verifier, Arc::new(SqliteStore::new(db)))
        }
    };

    // Shared state
    let dispatcher = Dispatcher::new();
    let app_state: AppState = Arc::new(AppStateInner {
        model: Arc::new(model),
        store: store.clone(),
        verifier: verifier.clone(),
        dispatcher: dispatcher.clone(),
    });

    let gateway = GatewayContext {
        dispatcher,
        verifier,
        store,
    };

    // Routes
    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway);

    let mut app = Router::new()
        .merge(positron_api::router(app_state))
        .merge(ws_route);

    if let Some(dir) = &config.static_dir {
        info!("Serving client assets from {}", dir.display());
        let index = dir.join("index.html");
        app = app.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)));
    }

    let app = app
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Positron server listening on {}", addr);
    info!("Model: {}", config.gemini_model);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn ws_upgrade(
    State(ctx): State<GatewayContext>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, ctx))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
