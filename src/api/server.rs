use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::{MatchedPath, Request};
use axum::middleware::{Next, from_fn};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::api::handler::*;
use crate::api::middleware::cors;
use crate::gemini::GeminiErr;
use crate::stats::StatsErr;
use crate::util::env::Env;

pub type JsonResult<T> = core::result::Result<Json<T>, RouteError>;

/// Shared by every request. Holds no per-request or cross-request data, only the process
/// configuration and the pooled HTTP client.
#[derive(Clone, Debug)]
pub struct AppState {
    pub env: Arc<Env>,
    pub http: reqwest::Client,
}

pub fn router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.env.static_dir);
    let cors = cors(&state.env.cors_allow_origins);

    Router::new()
        .route("/api/twitch-stats", get(twitch_stats))
        .route("/api/twitch", get(channel_status))
        .route("/api/gemini", post(gemini_proxy))
        //
        // everything else is the dashboard itself
        .fallback_service(static_files)
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let path = req.uri().path();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                // path only: query strings may carry logins we don't need in every span
                tracing::debug_span!("api_request", ?method, path, ?matched_path)
            }),
        )
        .layer(from_fn(log_route_errors))
        .layer(cors)
        .with_state(Arc::new(state))
}

/// Logs the `RouteError` a handler attached to its response, once, outside the handler span.
#[instrument(skip(request, next), fields(path = request.uri().path()))]
async fn log_route_errors(request: Request, next: Next) -> Response {
    let res = next.run(request).await;
    if let Some(err) = res.extensions().get::<Arc<RouteError>>() {
        tracing::error!(error = %err, status = %res.status(), "error occurred inside route handler");
    }

    res
}

#[instrument(skip(state), fields(port = state.env.port))]
pub async fn start_server(state: AppState) -> ServerResult<Vec<JoinHandle<()>>> {
    tracing::info!("starting server");

    let socket_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), state.env.port);
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    let local_addr = listener.local_addr()?;
    let app = router(state);

    let server_handle = tokio::task::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
        {
            tracing::error!(error = %e, "server exited with an error");
        }

        tracing::info!("server stopped");
    });

    tracing::info!(
        server_url = &format!("http://127.0.0.1:{}", local_addr.port()),
        "server ready"
    );

    Ok(vec![server_handle])
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received ctrl-c, shutting down"),
        Err(e) => tracing::error!(error = %e, "unable to listen for shutdown signal"),
    }
}

pub type ServerResult<T> = core::result::Result<T, ServerErr>;

#[derive(Debug, Error)]
pub enum ServerErr {
    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Stats(#[from] StatsErr),

    #[error(transparent)]
    Gemini(#[from] GeminiErr),

    #[error("{0}")]
    BadRequest(&'static str),
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            detail: Option<String>,
        }

        let (status, error, detail) = match &self {
            RouteError::Stats(stats_err) => match stats_err {
                StatsErr::Config(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string(), None),
                StatsErr::Auth(err) => (
                    StatusCode::BAD_GATEWAY,
                    String::from("twitch authentication failed"),
                    Some(err.to_string()),
                ),
                StatsErr::UserLookup(err) => (
                    StatusCode::BAD_GATEWAY,
                    String::from("twitch user lookup failed"),
                    Some(err.to_string()),
                ),
            },

            RouteError::Gemini(gemini_err) => match gemini_err {
                GeminiErr::Config(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string(), None),
                GeminiErr::Transport(err) => (
                    StatusCode::BAD_GATEWAY,
                    String::from("gemini error"),
                    Some(err.to_string()),
                ),
                GeminiErr::Status { body, .. } => (
                    StatusCode::BAD_GATEWAY,
                    String::from("gemini error"),
                    Some(body.clone()),
                ),
            },

            RouteError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.to_string(), None),
        };

        let mut response = (status, Json(ErrorResponse { error, detail })).into_response();
        // a malformed query is the caller's problem, not worth an error log
        if !matches!(self, RouteError::BadRequest(_)) {
            response.extensions_mut().insert(Arc::new(self));
        }

        response
    }
}
