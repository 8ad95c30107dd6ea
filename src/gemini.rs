//! Thin proxy to the Gemini `generateContent` endpoint.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::instrument;

use crate::constants::GEMINI_FALLBACK_TEXT;
use crate::util::env::{ConfigError, Env};

/// Prompt forwarded to Gemini.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeminiQuery {
    pub user_query: String,
    pub system_instruction: String,
}

/// Body accepted by `POST /api/gemini`. `systemPrompt` is the older name of
/// `systemInstruction`; both may be present.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GeminiRequestBody {
    user_query: Option<String>,
    system_instruction: Option<String>,
    system_prompt: Option<String>,
}

impl GeminiQuery {
    /// Lenient parse: anything that isn't a JSON object gives an empty query rather than an
    /// error. A non-empty `systemInstruction` wins over `systemPrompt`.
    pub fn from_body(body: &[u8]) -> Self {
        let raw = serde_json::from_slice::<GeminiRequestBody>(body).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "unparsable gemini request body, using empty query");
            GeminiRequestBody::default()
        });

        let system_instruction = raw
            .system_instruction
            .filter(|instruction| !instruction.is_empty())
            .or(raw.system_prompt)
            .unwrap_or_default();

        Self {
            user_query: raw.user_query.unwrap_or_default(),
            system_instruction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeminiReply {
    pub text: String,
}

/// Sends one prompt to Gemini and returns the first candidate's text.
#[instrument(skip(http, env, query), fields(model = %env.gemini_model, query_len = query.user_query.len()))]
pub async fn generate(
    http: &reqwest::Client,
    env: &Env,
    query: &GeminiQuery,
) -> GeminiResult<GeminiReply> {
    let key = env.gemini_key()?;
    let url = format!(
        "{}/v1beta/models/{}:generateContent",
        env.gemini_base_url.trim_end_matches('/'),
        env.gemini_model
    );

    let payload = json!({
        "contents": [{ "parts": [{ "text": query.user_query }] }],
        "systemInstruction": { "parts": [{ "text": query.system_instruction }] },
    });

    // the key rides in the query string, so no URL may reach an error message
    let res = http
        .post(url)
        .query(&[("key", key.expose())])
        .json(&payload)
        .send()
        .await
        .map_err(|e| GeminiErr::Transport(e.without_url()))?;

    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        tracing::debug!(code = %status, "non-2xx response from gemini");
        return Err(GeminiErr::Status { status, body });
    }

    let body = res
        .json::<Value>()
        .await
        .map_err(|e| GeminiErr::Transport(e.without_url()))?;

    Ok(GeminiReply {
        text: reply_text(&body),
    })
}

fn reply_text(body: &Value) -> String {
    body.pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .unwrap_or(GEMINI_FALLBACK_TEXT)
        .to_string()
}

pub type GeminiResult<T> = core::result::Result<T, GeminiErr>;

#[derive(Debug, Error)]
pub enum GeminiErr {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("gemini request failed: {0}")]
    Transport(reqwest::Error),

    #[error("gemini responded {status}")]
    Status { status: StatusCode, body: String },
}
