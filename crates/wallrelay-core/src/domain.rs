use std::fmt;

use serde::{Deserialize, Serialize};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Handle of a social-network group to poll (`public123`, `club456`, `apiclub`, or a
/// numeric owner id such as `-29534144`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceGroup(pub String);

impl SourceGroup {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric owner id, if the handle is one.
    pub fn owner_id(&self) -> Option<i64> {
        self.0.parse::<i64>().ok()
    }
}

impl fmt::Display for SourceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A wall post as fetched from a source group. Ids increase monotonically per group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub text: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Pinned posts are delivered first regardless of age.
    pub pinned: bool,
}

impl Post {
    pub fn new(id: i64, text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id,
            text: text.into(),
            timestamp,
            pinned: false,
        }
    }
}

/// API access token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Destination group owner id (negative for communities).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetGroup(pub i64);

impl TargetGroup {
    /// VK addresses community walls with a negative owner id.
    pub fn from_config(raw: i64) -> Self {
        if raw > 0 {
            Self(-raw)
        } else {
            Self(raw)
        }
    }
}
