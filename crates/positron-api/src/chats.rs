use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use positron_store::Owner;
use positron_types::api::SaveChatRequest;
use positron_types::models::{ChatRecord, ChatSummary, derive_title, is_valid_id};

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
) -> Result<Json<Vec<ChatSummary>>, ApiError> {
    Ok(Json(state.store.list_chats(&owner).await?))
}

pub async fn get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(owner): Extension<Owner>,
) -> Result<Json<ChatRecord>, ApiError> {
    check_chat_id(&chat_id)?;
    state
        .store
        .get_chat(&owner, &chat_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// `POST /api/chats`: first save of a conversation, under a fresh id.
pub async fn create_chat(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    payload: Result<Json<SaveChatRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let chat_id = Uuid::new_v4().simple().to_string();
    let record = upsert(&state, &owner, &chat_id, req).await?;
    info!("{} created chat {}", owner.uid, chat_id);
    Ok((StatusCode::CREATED, Json(record)))
}

/// `PUT /api/chats/{id}`: upsert under a client-cached id.
pub async fn save_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(owner): Extension<Owner>,
    payload: Result<Json<SaveChatRequest>, JsonRejection>,
) -> Result<Json<ChatRecord>, ApiError> {
    check_chat_id(&chat_id)?;
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Json(upsert(&state, &owner, &chat_id, req).await?))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(owner): Extension<Owner>,
) -> Result<StatusCode, ApiError> {
    check_chat_id(&chat_id)?;
    if !state.store.delete_chat(&owner, &chat_id).await? {
        return Err(ApiError::NotFound);
    }

    info!("{} deleted chat {}", owner.uid, chat_id);
    state.dispatcher.publish_snapshot(state.store.as_ref(), &owner).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn upsert(
    state: &AppState,
    owner: &Owner,
    chat_id: &str,
    req: SaveChatRequest,
) -> Result<ChatRecord, ApiError> {
    let title = req
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| derive_title(&req.messages));

    let record = state
        .store
        .upsert_chat(owner, chat_id, &title, &req.messages)
        .await?;

    state.dispatcher.publish_snapshot(state.store.as_ref(), owner).await;
    Ok(record)
}

fn check_chat_id(chat_id: &str) -> Result<(), ApiError> {
    if is_valid_id(chat_id) {
        Ok(())
    } else {
        Err(ApiError::BadRequest("invalid chat id".into()))
    }
}
