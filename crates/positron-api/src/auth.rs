use std::sync::Arc;

use axum::{Json, extract::State};
use tracing::info;

use positron_auth::TokenVerifier;
use positron_gateway::dispatcher::Dispatcher;
use positron_store::ChatStore;
use positron_types::api::{DevLoginRequest, DevLoginResponse};
use positron_types::models::is_valid_id;

use crate::error::ApiError;
use crate::gemini::ChatModel;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub model: Arc<dyn ChatModel>,
    pub store: Arc<dyn ChatStore>,
    pub verifier: TokenVerifier,
    pub dispatcher: Dispatcher,
}

/// Issue a token for any uid. Only mounted in shared-secret mode, where
/// there is no external identity provider to sign in against.
pub async fn dev_login(
    State(state): State<AppState>,
    Json(req): Json<DevLoginRequest>,
) -> Result<Json<DevLoginResponse>, ApiError> {
    if !matches!(state.verifier, TokenVerifier::SharedSecret(_)) {
        return Err(ApiError::NotFound);
    }
    if !is_valid_id(&req.uid) {
        return Err(ApiError::BadRequest("uid must be 1-128 of [A-Za-z0-9_-]".into()));
    }

    let token = state
        .verifier
        .issue_dev_token(&req.uid, req.name.as_deref())
        .map_err(|e| ApiError::Internal(format!("issuing dev token: {}", e)))?;

    info!("Issued development token for {}", req.uid);
    Ok(Json(DevLoginResponse { uid: req.uid, token }))
}

