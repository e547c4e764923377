//! Identity-token verification.
//!
//! Sign-in happens against an external provider (Firebase Auth). The server
//! only checks the resulting ID tokens: RS256 against Google's published keys
//! in production, or HS256 against a shared secret for local development.

mod firebase;

use std::sync::Arc;

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use positron_types::api::Claims;

pub use firebase::{FirebaseVerifier, GOOGLE_JWKS_URL};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("sign-in is not configured on this server")]
    Disabled,

    #[error("token header has no key id")]
    MissingKeyId,

    #[error("unknown signing key '{0}'")]
    UnknownKey(String),

    #[error("token has an empty subject")]
    EmptySubject,

    #[error("invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),

    #[error("failed to fetch signing keys: {0}")]
    KeyFetch(#[from] reqwest::Error),
}

/// How identity tokens are checked. Cheap to clone.
#[derive(Clone)]
pub enum TokenVerifier {
    /// No provider configured; every token is rejected.
    Disabled,
    /// HS256 tokens signed with a shared secret (local development).
    SharedSecret(Arc<str>),
    /// Firebase ID tokens for one project.
    Firebase(Arc<FirebaseVerifier>),
}

impl TokenVerifier {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = match self {
            Self::Disabled => return Err(AuthError::Disabled),
            Self::SharedSecret(secret) => {
                decode::<Claims>(
                    token,
                    &DecodingKey::from_secret(secret.as_bytes()),
                    &Validation::default(),
                )?
                .claims
            }
            Self::Firebase(firebase) => firebase.verify(token).await?,
        };

        if claims.sub.is_empty() {
            return Err(AuthError::EmptySubject);
        }
        Ok(claims)
    }

    /// Mint a development token. Only available in shared-secret mode.
    pub fn issue_dev_token(&self, uid: &str, name: Option<&str>) -> Result<String, AuthError> {
        match self {
            Self::SharedSecret(secret) => Ok(issue_token(secret, uid, name)?),
            _ => Err(AuthError::Disabled),
        }
    }
}

/// HS256 token valid for 30 days.
pub fn issue_token(
    secret: &str,
    uid: &str,
    name: Option<&str>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: uid.to_string(),
        name: name.map(str::to_string),
        email: None,
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}
