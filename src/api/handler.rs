use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::body::{Body, to_bytes};
use axum::extract::{Query, State};
use serde::Deserialize;
use tracing::instrument;

use crate::api::server::{AppState, JsonResult, RouteError};
use crate::constants::GEMINI_BODY_LIMIT;
use crate::gemini::{self, GeminiErr, GeminiQuery, GeminiReply};
use crate::stats::competitors::normalize_logins;
use crate::stats::report::{AggregationResult, ChannelStatus};
use crate::stats;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StatsParams {
    /// Comma-separated competitor logins
    pub competitors: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChannelParams {
    pub logins: String,
}

#[instrument(skip(state))]
pub async fn twitch_stats(
    Query(params): Query<StatsParams>,
    State(state): State<Arc<AppState>>,
) -> JsonResult<AggregationResult> {
    let logins = normalize_logins(&params.competitors);
    let result = stats::run(&state.env, &state.http, &logins).await?;

    Ok(Json(result))
}

#[instrument(skip(state))]
pub async fn channel_status(
    Query(params): Query<ChannelParams>,
    State(state): State<Arc<AppState>>,
) -> JsonResult<BTreeMap<String, Option<ChannelStatus>>> {
    let logins = normalize_logins(&params.logins);
    if logins.is_empty() {
        return Err(RouteError::BadRequest("missing logins"));
    }

    let statuses = stats::channel_status(&state.env, &state.http, &logins).await?;
    Ok(Json(statuses))
}

/// The key is checked before the body is read, so an unconfigured proxy rejects every call the
/// same way regardless of payload.
#[instrument(skip(state, body))]
pub async fn gemini_proxy(
    State(state): State<Arc<AppState>>,
    body: Body,
) -> JsonResult<GeminiReply> {
    state.env.gemini_key().map_err(GeminiErr::from)?;

    let bytes = to_bytes(body, GEMINI_BODY_LIMIT)
        .await
        .unwrap_or_else(|e| {
            tracing::debug!(error = %e, "unreadable gemini request body");
            Default::default()
        });
    let query = GeminiQuery::from_body(&bytes);

    let reply = gemini::generate(&state.http, &state.env, &query).await?;
    Ok(Json(reply))
}
