pub mod auth;
pub mod types;

use http::header::{AUTHORIZATION, InvalidHeaderValue};
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use crate::helix::auth::BearerToken;

const CLIENT_ID_HEADER: &str = "Client-Id";

/// Authenticated handle on the Helix API for the lifetime of one pipeline run.
///
/// Cloning is cheap: the underlying `reqwest::Client` is reference counted and shared with the
/// rest of the process, only the auth headers belong to this handle.
#[derive(Debug, Clone)]
pub struct Helix {
    http: reqwest::Client,
    base: String,
    headers: HeaderMap,
}

impl Helix {
    pub fn new(
        http: reqwest::Client,
        base: &str,
        client_id: &str,
        token: &BearerToken,
    ) -> HelixResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token.as_str()))?,
        );
        headers.insert(CLIENT_ID_HEADER, HeaderValue::from_str(client_id)?);

        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            headers,
        })
    }

    pub fn url(&self, uri: HelixUri) -> String {
        format!("{}/{}", self.base, uri.path())
    }

    /// Performs a GET request against a Helix endpoint and parses the response into `T`.
    ///
    /// Any non-2xx status is an error; if Helix sent its usual `{"message": ...}` body along with
    /// it, the message is carried in the error.
    #[instrument(skip(self, query), fields(params = query.len()))]
    pub async fn get<T>(&self, uri: HelixUri, query: &[(&'static str, String)]) -> HelixResult<T>
    where
        T: DeserializeOwned,
    {
        let res = self
            .http
            .get(self.url(uri))
            .headers(self.headers.clone())
            .query(query)
            .send()
            .await
            .map_err(|e| HelixErr::ReqwestError(e.without_url()))?;

        let status = res.status();
        if !status.is_success() {
            let message = res
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| body["message"].as_str().map(str::to_owned));

            tracing::debug!(code = %status, ?message, "non-2xx response from helix");
            return Err(HelixErr::Status { status, message });
        }

        if let Some(remaining) = res.headers().get("ratelimit-remaining")
            && let Some(total) = res.headers().get("ratelimit-limit")
        {
            tracing::debug!(ratelimit_available = ?remaining, ratelimit_total = ?total, "rate-limit bucket");
        }

        res.json::<T>()
            .await
            .map_err(|e| HelixErr::ReqwestError(e.without_url()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelixUri {
    Streams,
    Games,
    Users,
    ChannelFollowers,
}

impl HelixUri {
    pub fn path(&self) -> &'static str {
        match self {
            HelixUri::Streams => "streams",
            HelixUri::Games => "games",
            HelixUri::Users => "users",
            HelixUri::ChannelFollowers => "channels/followers",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelixParamType {
    Id,
    Login,
    UserId,
    BroadcasterId,
}

impl HelixParamType {
    pub fn key(&self) -> &'static str {
        match self {
            HelixParamType::Id => "id",
            HelixParamType::Login => "login",
            HelixParamType::UserId => "user_id",
            HelixParamType::BroadcasterId => "broadcaster_id",
        }
    }
}

/// Splits `items` into batches of repeated query parameters (`?login=a&login=b...`), at most
/// `chunk_size` per batch. Logins are lower-cased; ids are passed through untouched.
pub fn build_query_params(
    param_type: HelixParamType,
    items: &[String],
    chunk_size: usize,
) -> Vec<Vec<(&'static str, String)>> {
    let key = param_type.key();

    items
        .chunks(chunk_size.max(1))
        .map(|chunk| {
            chunk
                .iter()
                .map(|item| match param_type {
                    HelixParamType::Login => (key, item.to_lowercase()),
                    _ => (key, item.to_owned()),
                })
                .collect()
        })
        .collect()
}

pub type HelixResult<T> = core::result::Result<T, HelixErr>;

/// A failed upstream call. Always recoverable from the pipeline's point of view; callers decide
/// how the missing data degrades.
#[derive(Debug, Error)]
pub enum HelixErr {
    #[error("reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("while creating a HeaderValue ({0})")]
    HeaderError(#[from] InvalidHeaderValue),

    #[error("helix responded {status}: {}", .message.as_deref().unwrap_or("no detail"))]
    Status {
        status: StatusCode,
        message: Option<String>,
    },
}
