use thiserror::Error;

/// The only failure text a user ever sees.
pub const USER_FACING_ERROR: &str = "Something went wrong.";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("gateway error: {0}")]
    Gateway(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("gateway protocol violation: {0}")]
    Protocol(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("identity provider rejected the request: {0}")]
    Identity(String),

    #[error("not signed in")]
    NotSignedIn,
}

/// Turn a non-success response into [`ClientError::Status`].
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Status { status, body })
}
