use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;

use crate::api::server::{AppState, ServerErr, start_server};
use crate::util::env::{Env, EnvErr};
use crate::util::telemetry;

mod api;
mod constants;
mod gemini;
mod helix;
mod stats;
mod util;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error(transparent)]
    Server(#[from] ServerErr),

    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Std(#[from] Box<dyn std::error::Error>),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    let env = Env::new()?;
    let telemetry_registry = telemetry::Telemetry::new(&env)?.register();

    tracing::info!(
        port = env.port,
        static_dir = env.static_dir,
        language = env.stream_language,
        "starting main application"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(env.upstream_timeout_secs))
        .build()?;

    let state = AppState {
        env: Arc::new(env),
        http,
    };

    let handles = start_server(state).await?;
    _ = join_all(handles).await;

    telemetry_registry.shutdown();
    Ok(())
}
