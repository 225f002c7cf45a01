//! Wire shapes of the VK API responses used by the relay.

use serde::{de::DeserializeOwned, Deserialize};

use wallrelay_core::domain::{Post, SourceGroup};

/// Every method answers `{"response": ...}` or `{"error": {...}}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: Option<T>,
    error: Option<ApiError>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ApiError {
    pub error_code: i64,
    #[serde(default)]
    pub error_msg: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WallGetResponse {
    #[serde(default)]
    pub items: Vec<WallItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WallItem {
    pub id: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub is_pinned: i64,
}

impl From<WallItem> for Post {
    fn from(item: WallItem) -> Self {
        Post {
            id: item.id,
            text: item.text,
            timestamp: item.date,
            pinned: item.is_pinned != 0,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WallPostResponse {
    pub post_id: i64,
}

/// Unwrap an envelope; the error string is suitable for `Error::Retrieval`/`Error::Publish`.
pub(crate) fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<T, String> {
    let env: Envelope<T> =
        serde_json::from_str(body).map_err(|e| format!("malformed response: {e}"))?;
    if let Some(err) = env.error {
        return Err(format!("api error {}: {}", err.error_code, err.error_msg));
    }
    env.response
        .ok_or_else(|| "response has neither `response` nor `error`".to_string())
}

/// Selector params for `wall.get`: numeric handles are owner ids, the rest are short names.
pub(crate) fn wall_selector(group: &SourceGroup) -> (&'static str, String) {
    match group.owner_id() {
        Some(id) => ("owner_id", id.to_string()),
        None => ("domain", group.as_str().to_string()),
    }
}
