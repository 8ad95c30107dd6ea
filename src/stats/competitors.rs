use std::collections::{BTreeMap, HashMap, HashSet};

use futures::{StreamExt, stream};
use serde::Serialize;
use tracing::instrument;

use crate::constants::{NUM_WORKER_TASKS, TWITCH_CHANNEL_URL, USERS_BATCH_SIZE};
use crate::helix::types::{HelixDataResponse, HelixFollowers, HelixStream, HelixUser};
use crate::helix::{Helix, HelixParamType, HelixResult, HelixUri, build_query_params};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompetitorProfile {
    pub id: String,
    pub display_name: String,
    /// `None` when the follower lookup failed
    pub followers: Option<u64>,
    /// `None` when offline or when the live lookup failed
    pub viewer_count: Option<u64>,
    pub profile_image_url: String,
    pub url: String,

    /// Whether the live lookup found a stream. Only exposed by the channel status endpoint.
    #[serde(skip)]
    pub live: bool,
}

/// One entry per requested login; `None` serializes as an explicit `null` for logins Helix
/// doesn't know.
pub type CompetitorMap = BTreeMap<String, Option<CompetitorProfile>>;

/// Splits a comma-separated login list: trimmed, lower-cased, empties dropped, duplicates
/// collapsed onto their first appearance.
pub fn normalize_logins(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();

    raw.split(',')
        .map(|login| login.trim().to_lowercase())
        .filter(|login| !login.is_empty())
        .filter(|login| seen.insert(login.clone()))
        .collect()
}

/// Resolves logins to Helix users, keyed by lower-cased login.
///
/// One request per [`USERS_BATCH_SIZE`] logins; any failed batch fails the whole lookup.
#[instrument(skip(helix, logins), fields(login_count = logins.len()))]
pub async fn lookup_users(
    helix: &Helix,
    logins: &[String],
) -> HelixResult<HashMap<String, HelixUser>> {
    let mut users = HashMap::new();

    for params in build_query_params(HelixParamType::Login, logins, USERS_BATCH_SIZE) {
        let batch = helix
            .get::<HelixDataResponse<HelixUser>>(HelixUri::Users, &params)
            .await?;

        for user in batch.data {
            users.insert(user.login.to_lowercase(), user);
        }
    }

    tracing::debug!(found = users.len(), "user lookup complete");
    Ok(users)
}

/// Builds the competitor mapping for `logins`.
///
/// A failed user lookup leaves every login unmatched (`null`) instead of failing the request.
#[instrument(skip(helix, logins), fields(login_count = logins.len()))]
pub async fn enrich(helix: &Helix, logins: &[String]) -> CompetitorMap {
    if logins.is_empty() {
        return CompetitorMap::new();
    }

    let users = match lookup_users(helix, logins).await {
        Ok(users) => users,
        Err(e) => {
            tracing::warn!(error = %e, "user lookup failed, reporting competitors as unmatched");
            HashMap::new()
        }
    };

    enrich_users(helix, logins, &users).await
}

/// Fetches follower and live data for every matched login, at most [`NUM_WORKER_TASKS`]
/// competitors at a time.
#[instrument(skip_all, fields(login_count = logins.len(), matched = users.len()))]
pub async fn enrich_users(
    helix: &Helix,
    logins: &[String],
    users: &HashMap<String, HelixUser>,
) -> CompetitorMap {
    let lookups: Vec<_> = logins
        .iter()
        .map(|login| async move {
            let profile = match users.get(&login.to_lowercase()) {
                Some(user) => Some(profile_for(helix, user).await),
                None => {
                    tracing::debug!(login, "no helix user for login");
                    None
                }
            };

            (login.clone(), profile)
        })
        .collect();

    stream::iter(lookups)
        .buffer_unordered(NUM_WORKER_TASKS)
        .collect::<CompetitorMap>()
        .await
}

/// Both sub-lookups run concurrently and degrade independently: a failure only blanks its own
/// field.
async fn profile_for(helix: &Helix, user: &HelixUser) -> CompetitorProfile {
    let (followers, live) = tokio::join!(
        fetch_followers(helix, &user.id),
        fetch_live_viewers(helix, &user.id)
    );

    let followers = followers.unwrap_or_else(|e| {
        tracing::warn!(error = %e, user_id = user.id, "follower lookup failed");
        None
    });

    let viewer_count = live.unwrap_or_else(|e| {
        tracing::warn!(error = %e, user_id = user.id, "live stream lookup failed");
        None
    });

    CompetitorProfile {
        id: user.id.clone(),
        display_name: user.display_name.clone(),
        followers,
        viewer_count,
        profile_image_url: user.profile_image_url.clone(),
        url: format!("{TWITCH_CHANNEL_URL}/{}", user.login),
        live: viewer_count.is_some(),
    }
}

pub async fn fetch_followers(helix: &Helix, user_id: &str) -> HelixResult<Option<u64>> {
    let params = [
        (HelixParamType::BroadcasterId.key(), user_id.to_string()),
        ("first", "1".to_string()),
    ];

    helix
        .get::<HelixFollowers>(HelixUri::ChannelFollowers, &params)
        .await
        .map(|followers| followers.total)
}

/// Current viewer count if the user is live, `None` if not.
pub async fn fetch_live_viewers(helix: &Helix, user_id: &str) -> HelixResult<Option<u64>> {
    let params = [(HelixParamType::UserId.key(), user_id.to_string())];
    let streams = helix
        .get::<HelixDataResponse<HelixStream>>(HelixUri::Streams, &params)
        .await?;

    Ok(streams.data.first().map(|stream| stream.viewer_count))
}
