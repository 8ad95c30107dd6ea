use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::stats::aggregate::{TopGame, TopStream};
use crate::stats::competitors::{CompetitorMap, CompetitorProfile};

/// Body of `GET /api/twitch-stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationResult {
    pub fetched_at: String,
    #[serde(rename = "totalViewers")]
    pub total_viewers: u64,
    #[serde(rename = "topStreams")]
    pub top_streams: Vec<TopStream>,
    #[serde(rename = "topGames")]
    pub top_games: Vec<TopGame>,
    pub competitors: CompetitorMap,
}

pub fn assemble(
    total_viewers: u64,
    top_streams: Vec<TopStream>,
    top_games: Vec<TopGame>,
    competitors: CompetitorMap,
) -> AggregationResult {
    assemble_at(Utc::now(), total_viewers, top_streams, top_games, competitors)
}

pub fn assemble_at(
    fetched_at: DateTime<Utc>,
    total_viewers: u64,
    top_streams: Vec<TopStream>,
    top_games: Vec<TopGame>,
    competitors: CompetitorMap,
) -> AggregationResult {
    AggregationResult {
        fetched_at: fetched_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        total_viewers,
        top_streams,
        top_games,
        competitors,
    }
}

/// Entry of `GET /api/twitch`: a competitor profile plus whether the channel is live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    #[serde(flatten)]
    pub profile: CompetitorProfile,
    pub live: bool,
}

pub fn channel_statuses(competitors: CompetitorMap) -> BTreeMap<String, Option<ChannelStatus>> {
    competitors
        .into_iter()
        .map(|(login, profile)| {
            let status = profile.map(|profile| ChannelStatus {
                live: profile.live,
                profile,
            });
            (login, status)
        })
        .collect()
}
