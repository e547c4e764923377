//! Firebase Authentication over its REST API.
//!
//! The platform's Google sign-in popup yields a Google ID token; Firebase
//! exchanges it for its own ID token, which the relay verifies.

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::ClientError;

pub const DEFAULT_AUTH_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_TOKEN_BASE_URL: &str = "https://securetoken.googleapis.com/v1";

/// Tokens are refreshed this long before they actually expire.
const EXPIRY_LEEWAY_SECS: i64 = 60;

/// A signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub uid: String,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl AuthSession {
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_LEEWAY_SECS) >= self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct FirebaseIdentity {
    http: Client,
    api_key: String,
    auth_base: String,
    token_base: String,
}

// -- Wire types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    id_token: String,
    refresh_token: String,
    expires_in: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct RefreshResponse {
    user_id: String,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl FirebaseIdentity {
    pub fn new(http: Client, api_key: impl Into<String>) -> Self {
        Self::with_endpoints(http, api_key, DEFAULT_AUTH_BASE_URL, DEFAULT_TOKEN_BASE_URL)
    }

    pub fn with_endpoints(
        http: Client,
        api_key: impl Into<String>,
        auth_base: impl Into<String>,
        token_base: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            auth_base: auth_base.into().trim_end_matches('/').to_string(),
            token_base: token_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Exchange a Google ID token from the sign-in popup for a Firebase session.
    pub async fn sign_in_with_google(&self, google_id_token: &str) -> Result<AuthSession, ClientError> {
        let post_body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("id_token", google_id_token)
            .append_pair("providerId", "google.com")
            .finish();

        let resp = self
            .http
            .post(format!("{}/accounts:signInWithIdp", self.auth_base))
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "postBody": post_body,
                "requestUri": "http://localhost",
                "returnSecureToken": true,
                "returnIdpCredential": true,
            }))
            .send()
            .await?;

        let body: SignInResponse = read_json(resp).await?;
        info!("Signed in as {}", body.local_id);

        Ok(AuthSession {
            uid: body.local_id,
            id_token: body.id_token,
            refresh_token: body.refresh_token,
            expires_at: expiry(&body.expires_in),
            display_name: body.display_name,
            email: body.email,
        })
    }

    /// Trade the refresh token for a new ID token.
    pub async fn refresh(&self, session: &AuthSession) -> Result<AuthSession, ClientError> {
        let resp = self
            .http
            .post(format!("{}/token", self.token_base))
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", session.refresh_token.as_str()),
            ])
            .send()
            .await?;

        let body: RefreshResponse = read_json(resp).await?;
        if body.user_id != session.uid {
            return Err(ClientError::Identity("refresh returned a different user".into()));
        }

        Ok(AuthSession {
            uid: body.user_id,
            id_token: body.id_token,
            refresh_token: body.refresh_token,
            expires_at: expiry(&body.expires_in),
            display_name: session.display_name.clone(),
            email: session.email.clone(),
        })
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    if resp.status().is_success() {
        return Ok(resp.json().await?);
    }
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&text)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| format!("HTTP {}", status));
    Err(ClientError::Identity(message))
}

/// `expires_in` is a decimal string of seconds.
fn expiry(expires_in: &str) -> DateTime<Utc> {
    let secs = expires_in.parse::<i64>().unwrap_or(0);
    Utc::now() + Duration::seconds(secs)
}
