use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use positron_store::Owner;
use positron_types::models::is_valid_id;

use crate::auth::AppState;
use crate::error::ApiError;

/// Verify the bearer identity token and attach the caller as an [`Owner`].
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?
        .to_string();

    let claims = state.verifier.verify(&token).await.map_err(|e| {
        debug!("Rejected identity token: {}", e);
        ApiError::Unauthorized
    })?;

    if !is_valid_id(&claims.sub) {
        debug!("Rejected identity token with unusable uid");
        return Err(ApiError::Unauthorized);
    }

    req.extensions_mut().insert(Owner {
        uid: claims.sub,
        token,
    });
    Ok(next.run(req).await)
}
