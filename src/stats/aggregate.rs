use std::cmp::Reverse;
use std::collections::HashMap;

use futures::future::join_all;
use serde::Serialize;
use tracing::instrument;

use crate::constants::{GAME_NAME_LOOKUP_CAP, GAMES_BATCH_SIZE, TOP_N};
use crate::helix::types::{HelixDataResponse, HelixGame, HelixStream};
use crate::helix::{Helix, HelixParamType, HelixUri, build_query_params};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopStream {
    pub user_login: String,
    pub user_name: String,
    pub viewer_count: u64,
    pub title: String,
    pub game_id: Option<String>,
}

impl From<&HelixStream> for TopStream {
    fn from(stream: &HelixStream) -> Self {
        Self {
            user_login: stream.user_login.clone(),
            user_name: stream.user_name.clone(),
            viewer_count: stream.viewer_count,
            title: stream.title.clone(),
            game_id: stream.game().map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopGame {
    pub id: String,
    pub name: String,
    pub viewers: u64,
}

/// Everything derivable from the collected streams without another upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub total_viewers: u64,
    pub top_streams: Vec<TopStream>,
    /// Summed viewers per game id, in order of first appearance.
    pub game_totals: Vec<(String, u64)>,
}

impl StreamSummary {
    /// Game ids whose names get looked up: the first [`GAME_NAME_LOOKUP_CAP`] distinct ids seen.
    ///
    /// This bounds the lookup, not the grouping; games past the cap still count towards
    /// `game_totals` and are reported under their raw id.
    pub fn resolvable_game_ids(&self) -> Vec<String> {
        self.game_totals
            .iter()
            .take(GAME_NAME_LOOKUP_CAP)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[instrument(skip(streams), fields(stream_count = streams.len()))]
pub fn summarize(streams: &[HelixStream]) -> StreamSummary {
    let total_viewers = streams.iter().map(|s| s.viewer_count).sum();

    let mut ranked: Vec<&HelixStream> = streams.iter().collect();
    // stable, so equal viewer counts keep encounter order
    ranked.sort_by_key(|s| Reverse(s.viewer_count));
    let top_streams = ranked.into_iter().take(TOP_N).map(TopStream::from).collect();

    let game_totals = group_by_game(streams);
    tracing::debug!(total_viewers, distinct_games = game_totals.len(), "summarized streams");

    StreamSummary {
        total_viewers,
        top_streams,
        game_totals,
    }
}

fn group_by_game(streams: &[HelixStream]) -> Vec<(String, u64)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut totals: Vec<(String, u64)> = Vec::new();

    for stream in streams {
        let Some(game_id) = stream.game() else {
            continue;
        };

        match index.get(game_id) {
            Some(&idx) => totals[idx].1 += stream.viewer_count,
            None => {
                index.insert(game_id, totals.len());
                totals.push((game_id.to_owned(), stream.viewer_count));
            }
        }
    }

    totals
}

/// Looks up game names in batches of [`GAMES_BATCH_SIZE`], all batches in flight at once.
///
/// A failed batch is logged and skipped; its games simply stay unnamed.
#[instrument(skip(helix, game_ids), fields(game_count = game_ids.len()))]
pub async fn resolve_game_names(helix: &Helix, game_ids: &[String]) -> HashMap<String, String> {
    let batches = build_query_params(HelixParamType::Id, game_ids, GAMES_BATCH_SIZE);

    let requests = batches.into_iter().enumerate().map(|(batch, params)| async move {
        let res = helix
            .get::<HelixDataResponse<HelixGame>>(HelixUri::Games, &params)
            .await;
        (batch, params, res)
    });

    let mut names = HashMap::new();
    for (batch, params, res) in join_all(requests).await {
        match res {
            Ok(games) => {
                for game in games.data {
                    let requested = params.iter().any(|(_, id)| *id == game.id);
                    if requested && !game.name.is_empty() {
                        names.insert(game.id, game.name);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, batch, size = params.len(), "game name lookup failed");
            }
        }
    }

    tracing::debug!(resolved = names.len(), "resolved game names");
    names
}

/// Ranks games by summed viewers, naming each from `names` or falling back to its id.
pub fn top_games(game_totals: &[(String, u64)], names: &HashMap<String, String>) -> Vec<TopGame> {
    let mut games: Vec<TopGame> = game_totals
        .iter()
        .map(|(id, viewers)| TopGame {
            id: id.clone(),
            name: names.get(id).cloned().unwrap_or_else(|| id.clone()),
            viewers: *viewers,
        })
        .collect();

    games.sort_by_key(|game| Reverse(game.viewers));
    games.truncate(TOP_N);
    games
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::helix::test_support::helix_for;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn stream(login: &str, viewers: u64, game: Option<&str>) -> HelixStream {
        HelixStream {
            user_login: login.to_string(),
            user_name: login.to_uppercase(),
            viewer_count: viewers,
            title: format!("{login} live"),
            game_id: game.map(str::to_owned),
            ..Default::default()
        }
    }

    fn logins(top: &[TopStream]) -> Vec<&str> {
        top.iter().map(|s| s.user_login.as_str()).collect()
    }

    #[test]
    fn test_summarize_without_games() {
        let streams = vec![
            stream("a", 50, None),
            stream("b", 200, None),
            stream("c", 10, None),
        ];

        let summary = summarize(&streams);

        assert_eq!(summary.total_viewers, 260);
        assert_eq!(logins(&summary.top_streams), ["b", "a", "c"]);
        assert!(summary.game_totals.is_empty());
        assert!(top_games(&summary.game_totals, &HashMap::new()).is_empty());
    }

    #[test]
    fn test_top_streams_capped_and_stable() {
        let streams: Vec<_> = (0..15)
            .map(|i| stream(&format!("s{i}"), if i % 2 == 0 { 100 } else { 5 }, None))
            .collect();

        let summary = summarize(&streams);

        assert_eq!(summary.top_streams.len(), TOP_N);
        assert_eq!(
            logins(&summary.top_streams),
            ["s0", "s2", "s4", "s6", "s8", "s10", "s12", "s14", "s1", "s3"]
        );
        assert!(
            summary
                .top_streams
                .windows(2)
                .all(|w| w[0].viewer_count >= w[1].viewer_count)
        );
        assert_eq!(summary.total_viewers, 8 * 100 + 7 * 5);
    }

    #[test]
    fn test_games_grouped_in_encounter_order() {
        let streams = vec![
            stream("a", 10, Some("509658")),
            stream("b", 30, Some("21779")),
            stream("c", 5, Some("")),
            stream("d", 25, Some("509658")),
        ];

        let summary = summarize(&streams);

        assert_eq!(
            summary.game_totals,
            vec![("509658".to_string(), 35), ("21779".to_string(), 30)]
        );
        assert_eq!(summary.top_streams[0].game_id.as_deref(), Some("21779"));
        assert_eq!(summary.top_streams.last().unwrap().game_id, None);
    }

    #[test]
    fn test_top_games_name_fallback() {
        let totals = vec![
            ("1".to_string(), 5),
            ("2".to_string(), 50),
            ("3".to_string(), 5),
        ];
        let names = HashMap::from([("2".to_string(), "Just Chatting".to_string())]);

        let games = top_games(&totals, &names);

        assert_eq!(
            games,
            vec![
                TopGame { id: "2".into(), name: "Just Chatting".into(), viewers: 50 },
                TopGame { id: "1".into(), name: "1".into(), viewers: 5 },
                TopGame { id: "3".into(), name: "3".into(), viewers: 5 },
            ]
        );
    }

    #[test]
    fn test_name_lookup_capped_at_fifty() {
        let streams: Vec<_> = (0..60)
            .map(|i| stream(&format!("s{i}"), 100 + i, Some(format!("g{i}").as_str())))
            .collect();

        let summary = summarize(&streams);
        let ids = summary.resolvable_game_ids();

        assert_eq!(summary.game_totals.len(), 60);
        assert_eq!(ids.len(), GAME_NAME_LOOKUP_CAP);
        assert_eq!(ids.last().map(String::as_str), Some("g49"));

        // every id that went to the lookup got a name, the rest keep their id
        let names: HashMap<_, _> = ids
            .iter()
            .map(|id| (id.clone(), format!("name-{id}")))
            .collect();
        let games = top_games(&summary.game_totals, &names);

        assert_eq!(games.len(), TOP_N);
        assert_eq!(games[0].id, "g59");
        assert_eq!(games[0].name, "g59");
        assert_eq!(games[0].viewers, 159);
    }

    #[tokio::test]
    async fn test_resolve_game_names_batches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/games"))
            .and(query_param("id", "g0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "id": "g0", "name": "Minecraft" },
                    { "id": "g1", "name": "" },
                    { "id": "unrequested", "name": "Nope" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/games"))
            .and(query_param("id", "g50"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let ids: Vec<String> = (0..60).map(|i| format!("g{i}")).collect();
        let names = resolve_game_names(&helix_for(&server), &ids).await;

        assert_eq!(names, HashMap::from([("g0".to_string(), "Minecraft".to_string())]));

        for req in server.received_requests().await.unwrap() {
            assert!(req.url.query_pairs().count() <= GAMES_BATCH_SIZE);
        }
    }

    #[tokio::test]
    async fn test_resolve_nothing_without_games() {
        let server = MockServer::start().await;
        let names = resolve_game_names(&helix_for(&server), &[]).await;

        assert!(names.is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
