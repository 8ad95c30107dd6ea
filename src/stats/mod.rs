//! The aggregation pipeline behind `/api/twitch-stats` and `/api/twitch`.
//!
//! Each call authenticates from scratch and shares nothing with any other call.

pub mod aggregate;
pub mod competitors;
pub mod paginate;
pub mod report;

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::constants::STREAMS_MAX_PAGES;
use crate::helix::auth::{AuthError, Credentials, acquire_token};
use crate::helix::types::HelixStream;
use crate::helix::{Helix, HelixErr, HelixUri};
use crate::stats::aggregate::{resolve_game_names, summarize, top_games};
use crate::stats::competitors::{enrich, enrich_users, lookup_users};
use crate::stats::paginate::{collect_pages, streams_query};
use crate::stats::report::{AggregationResult, ChannelStatus, assemble, channel_statuses};
use crate::util::env::{ConfigError, Env};

/// Checks credentials, exchanges them for an app token and returns a Helix handle carrying it.
///
/// Missing credentials are reported before any request is made.
pub async fn authorize(env: &Env, http: &reqwest::Client) -> StatsResult<Helix> {
    let credentials = Credentials::from_env(env)?;
    let token = acquire_token(http, &env.twitch_token_url, &credentials).await?;

    Helix::new(
        http.clone(),
        &env.helix_base_url,
        &credentials.client_id,
        &token,
    )
    // the client id was checked by `Credentials::from_env`, only the token can be rejected here
    .map_err(|_| StatsErr::Auth(AuthError::InvalidToken))
}

/// One full aggregation run: live streams, then game names and competitor profiles side by side.
///
/// Only configuration and token failures are fatal; every other upstream failure degrades the
/// part of the result it feeds.
#[instrument(skip_all, fields(run_id = %Uuid::new_v4(), competitors = logins.len()))]
pub async fn run(
    env: &Env,
    http: &reqwest::Client,
    logins: &[String],
) -> StatsResult<AggregationResult> {
    let helix = authorize(env, http).await?;

    let streams: Vec<HelixStream> = collect_pages(
        &helix,
        HelixUri::Streams,
        streams_query(&env.stream_language),
        STREAMS_MAX_PAGES,
    )
    .await;
    let summary = summarize(&streams);

    let game_ids = summary.resolvable_game_ids();
    let (names, competitors) = tokio::join!(
        resolve_game_names(&helix, &game_ids),
        enrich(&helix, logins)
    );

    let games = top_games(&summary.game_totals, &names);
    tracing::info!(
        streams = streams.len(),
        total_viewers = summary.total_viewers,
        "aggregation complete"
    );

    Ok(assemble(
        summary.total_viewers,
        summary.top_streams,
        games,
        competitors,
    ))
}

/// Profile and live flag for each login.
///
/// Unlike [`run`], a failed user lookup fails the whole call since there is nothing else to
/// report.
#[instrument(skip_all, fields(run_id = %Uuid::new_v4(), logins = logins.len()))]
pub async fn channel_status(
    env: &Env,
    http: &reqwest::Client,
    logins: &[String],
) -> StatsResult<BTreeMap<String, Option<ChannelStatus>>> {
    let helix = authorize(env, http).await?;
    let users = lookup_users(&helix, logins)
        .await
        .map_err(StatsErr::UserLookup)?;

    let competitors = enrich_users(&helix, logins, &users).await;
    Ok(channel_statuses(competitors))
}

pub type StatsResult<T> = core::result::Result<T, StatsErr>;

#[derive(Debug, Error)]
pub enum StatsErr {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("twitch authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("user lookup failed: {0}")]
    UserLookup(HelixErr),
}


#[cfg(test)]
mod test {
    use super::test_support::{env_for, mount_token};
    use super::*;
    use crate::util::env::{VAR_CLIENT_ID, test_env};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_helix(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/streams"))
            .and(query_param("language", "fr"))
            .and(header("authorization", "Bearer tok"))
            .and(header("client-id", "cid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "user_login": "a", "user_name": "A", "viewer_count": 50, "title": "t", "game_id": "509658" },
                    { "user_login": "b", "user_name": "B", "viewer_count": 200, "title": "t", "game_id": "21779" },
                    { "user_login": "c", "user_name": "C", "viewer_count": 10, "title": "t", "game_id": "509658" }
                ],
                "pagination": {}
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/games"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "id": "509658", "name": "Just Chatting" },
                    { "id": "21779", "name": "League of Legends" }
                ]
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .and(query_param("login", "foo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "id": "9", "login": "foo", "display_name": "Foo", "profile_image_url": "img" }]
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/channels/followers"))
            .and(query_param("broadcaster_id", "9"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "total": 321, "data": [] })),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/streams"))
            .and(query_param("user_id", "9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(server)
            .await;
    }

    fn logins(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_missing_credentials_make_no_requests() {
        let server = MockServer::start().await;
        let env = test_env(&[("HELIX_BASE_URL", server.uri().as_str())]);

        let res = run(&env, &reqwest::Client::new(), &[]).await;

        assert!(matches!(
            res,
            Err(StatsErr::Config(ConfigError::Missing(VAR_CLIENT_ID)))
        ));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_token_failure_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let res = run(&env_for(&server), &reqwest::Client::new(), &[]).await;

        assert!(matches!(res, Err(StatsErr::Auth(AuthError::Rejected { .. }))));
    }

    #[tokio::test]
    async fn test_full_run() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        mount_helix(&server).await;

        let result = run(
            &env_for(&server),
            &reqwest::Client::new(),
            &logins(&["foo", "bar"]),
        )
        .await
        .unwrap();

        let mut json = serde_json::to_value(&result).unwrap();
        json.as_object_mut().unwrap().remove("fetched_at");

        assert_eq!(
            json,
            json!({
                "totalViewers": 260,
                "topStreams": [
                    { "user_login": "b", "user_name": "B", "viewer_count": 200, "title": "t", "game_id": "21779" },
                    { "user_login": "a", "user_name": "A", "viewer_count": 50, "title": "t", "game_id": "509658" },
                    { "user_login": "c", "user_name": "C", "viewer_count": 10, "title": "t", "game_id": "509658" }
                ],
                "topGames": [
                    { "id": "21779", "name": "League of Legends", "viewers": 200 },
                    { "id": "509658", "name": "Just Chatting", "viewers": 60 }
                ],
                "competitors": {
                    "bar": null,
                    "foo": {
                        "id": "9",
                        "display_name": "Foo",
                        "followers": 321,
                        "viewer_count": null,
                        "profile_image_url": "img",
                        "url": "https://twitch.tv/foo"
                    }
                }
            })
        );
    }

    #[tokio::test]
    async fn test_runs_are_independent() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        mount_helix(&server).await;

        let env = env_for(&server);
        let http = reqwest::Client::new();
        let first = run(&env, &http, &logins(&["foo"])).await.unwrap();
        let second = run(&env, &http, &logins(&["foo"])).await.unwrap();

        assert_eq!(first.total_viewers, second.total_viewers);
        assert_eq!(first.top_streams, second.top_streams);
        assert_eq!(first.top_games, second.top_games);
        assert_eq!(first.competitors, second.competitors);

        let token_requests = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|req| req.url.path() == "/oauth2/token")
            .count();
        assert_eq!(token_requests, 2);
    }

    #[tokio::test]
    async fn test_channel_status_fails_on_user_lookup() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let res = channel_status(&env_for(&server), &reqwest::Client::new(), &logins(&["foo"])).await;

        assert!(matches!(res, Err(StatsErr::UserLookup(HelixErr::Status { .. }))));
    }

    #[tokio::test]
    async fn test_channel_status() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        mount_helix(&server).await;

        let statuses = channel_status(
            &env_for(&server),
            &reqwest::Client::new(),
            &logins(&["foo", "bar"]),
        )
        .await
        .unwrap();

        let foo = statuses["foo"].as_ref().unwrap();
        assert!(!foo.live);
        assert_eq!(foo.profile.followers, Some(321));
        assert_eq!(statuses["bar"], None);
    }
}
