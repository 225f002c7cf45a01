/// Core error type for the relay.
///
/// Adapter crates map their specific errors into this type so the scheduler and
/// the chat service can handle failures consistently (per-group isolation, apology replies).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Source fetch failed (network, auth, malformed response).
    #[error("retrieval error for {group}: {reason}")]
    Retrieval { group: String, reason: String },

    /// Destination write failed.
    #[error("publish error: {0}")]
    Publish(String),

    /// Watermark or profile read/write failed.
    #[error("store error: {0}")]
    Store(String),

    #[error("messaging error: {0}")]
    Messaging(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn retrieval(group: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Retrieval {
            group: group.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
