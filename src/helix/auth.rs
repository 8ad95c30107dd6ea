use std::fmt;

use http::{HeaderValue, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use crate::util::env::{ConfigError, ConfigResult, Env, VAR_CLIENT_ID};
use crate::util::secrets::Secret;

const GRANT_TYPE: &str = "client_credentials";

/// Twitch application credentials, checked for presence before anything touches the network.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: Secret,
}

impl Credentials {
    /// The client id is sent as the `Client-Id` header on every Helix call, so one that can't be
    /// a header value is rejected here along with absent credentials.
    pub fn from_env(env: &Env) -> ConfigResult<Self> {
        let client_id = env.client_id()?;
        if HeaderValue::from_str(client_id).is_err() {
            return Err(ConfigError::Invalid(VAR_CLIENT_ID));
        }

        Ok(Self {
            client_id: client_id.to_string(),
            client_secret: env.client_secret()?.clone(),
        })
    }
}

/// App access token. Treated as valid for the whole pipeline run; nothing refreshes it.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(..)")
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

/// Exchanges the client id/secret for an app access token (client-credentials grant).
///
/// The secret travels in the form body rather than the query string so it can't end up in a
/// logged URL.
#[instrument(skip(http, credentials), fields(client_id = %credentials.client_id))]
pub async fn acquire_token(
    http: &reqwest::Client,
    token_url: &str,
    credentials: &Credentials,
) -> AuthResult<BearerToken> {
    let form = [
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.expose()),
        ("grant_type", GRANT_TYPE),
    ];

    let res = http
        .post(token_url)
        .form(&form)
        .send()
        .await
        .map_err(|e| AuthError::Transport(e.without_url()))?;

    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(AuthError::Rejected { status, body });
    }

    let token = res
        .json::<TokenResponse>()
        .await
        .map_err(|e| AuthError::Parse(e.without_url()))?;

    match token.access_token.filter(|t| !t.is_empty()) {
        Some(access_token) => {
            tracing::debug!(expires_in = token.expires_in, "acquired app access token");
            Ok(BearerToken::new(access_token))
        }
        None => Err(AuthError::MissingToken),
    }
}

pub type AuthResult<T> = core::result::Result<T, AuthError>;

/// The token exchange failed; nothing downstream can run without a token.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Transport(reqwest::Error),

    #[error("token endpoint responded {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("unreadable token response: {0}")]
    Parse(reqwest::Error),

    #[error("token response carried no access_token")]
    MissingToken,

    #[error("access token is not a valid header value")]
    InvalidToken,
}
