use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
};
use futures_util::StreamExt;
use tracing::{debug, error};

use positron_types::api::{GenerateRequest, StreamChunk};

use crate::auth::AppState;
use crate::error::ApiError;

/// `POST /api/generate`: relay the conversation to the model and stream the
/// reply as `data: {"text": ...}` events.
///
/// Everything but the final message seeds the session; the final message is
/// the prompt. Any failure up to and including the first upstream item is a
/// 500 with the fixed error body. A later failure is logged and ends the
/// stream.
pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::InvalidHistory(e.body_text()))?;

    let (last, prior) = req
        .history
        .split_last()
        .ok_or_else(|| ApiError::InvalidHistory("empty history".into()))?;
    let prompt = last
        .parts
        .first()
        .map(|p| p.text.as_str())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::InvalidHistory("final message has no text".into()))?;

    debug!(turns = req.history.len(), "Relaying generate request");

    let mut upstream = state.model.stream_reply(prior, prompt).await?;

    // Headers go out with the first event, so wait for the first item: an
    // error there still becomes a 500.
    let first = match upstream.next().await {
        Some(Ok(text)) => Some(text),
        Some(Err(e)) => return Err(ApiError::Upstream(e)),
        None => None,
    };

    let events = async_stream::stream! {
        let mut chunks = 0usize;
        if let Some(text) = first {
            chunks += 1;
            yield Event::default().json_data(StreamChunk { text });
        }
        while let Some(item) = upstream.next().await {
            match item {
                Ok(text) => {
                    chunks += 1;
                    yield Event::default().json_data(StreamChunk { text });
                }
                Err(e) => {
                    error!("Upstream failed after {} chunks: {}", chunks, e);
                    break;
                }
            }
        }
        debug!("Stream finished after {} chunks", chunks);
    };

    Ok(Sse::new(events).into_response())
}
