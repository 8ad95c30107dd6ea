use serde::{Deserialize, Deserializer};

/// `{"data": [...]}` envelope shared by every Helix list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct HelixDataResponse<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// A paged Helix response; `pagination.cursor` is absent on the last page.
#[derive(Debug, Clone, Deserialize)]
pub struct HelixPage<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub pagination: HelixPagination,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HelixPagination {
    pub cursor: Option<String>,
}

impl<T> HelixPage<T> {
    /// The cursor for the next page, treating an empty string as "no more pages".
    pub fn next_cursor(&self) -> Option<&str> {
        self.pagination
            .cursor
            .as_deref()
            .filter(|cursor| !cursor.is_empty())
    }
}

/// Live stream entry from `streams`.
///
/// Fields Helix leaves out or sends as `null` default to empty/zero, so one odd record can't fail
/// the whole page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HelixStream {
    #[serde(deserialize_with = "null_as_default")]
    pub user_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub user_login: String,
    #[serde(deserialize_with = "null_as_default")]
    pub user_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub viewer_count: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    pub game_id: Option<String>,
}

impl HelixStream {
    /// Helix reports "no category" as `""`.
    pub fn game(&self) -> Option<&str> {
        self.game_id.as_deref().filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HelixGame {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HelixUser {
    pub id: String,
    pub login: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub profile_image_url: String,
}

/// `channels/followers` response; only the total is of interest.
#[derive(Debug, Clone, Deserialize)]
pub struct HelixFollowers {
    pub total: Option<u64>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stream_defaults() {
        let stream: HelixStream = serde_json::from_value(json!({
            "user_login": "a",
            "game_id": ""
        }))
        .unwrap();

        assert_eq!(stream.viewer_count, 0);
        assert_eq!(stream.game(), None);
    }

    #[test]
    fn test_stream_nulls() {
        let stream: HelixStream = serde_json::from_value(json!({
            "user_login": null,
            "user_name": "A",
            "viewer_count": null,
            "title": null,
            "game_id": null
        }))
        .unwrap();

        assert_eq!(
            stream,
            HelixStream {
                user_name: "A".into(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_page_cursor() {
        let page: HelixPage<HelixStream> =
            serde_json::from_value(json!({ "data": [], "pagination": {} })).unwrap();
        assert_eq!(page.next_cursor(), None);

        let page: HelixPage<HelixStream> =
            serde_json::from_value(json!({ "data": [], "pagination": { "cursor": "X" } }))
                .unwrap();
        assert_eq!(page.next_cursor(), Some("X"));

        let page: HelixPage<HelixStream> = serde_json::from_value(json!({})).unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.next_cursor(), None);
    }
}
