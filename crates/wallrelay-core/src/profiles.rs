//! Registered bot users and their stored API credentials.

use std::{collections::BTreeMap, path::PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    domain::{AccessToken, UserId},
    errors::Error,
    storage::JsonFile,
    utils::iso_timestamp_utc,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub balance: i64,
    #[serde(default)]
    pub created_at: String,
}

/// Whether a profile may use the bot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Banned,
    Inactive,
}

/// Moderation change applied by the operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusChange {
    Approve,
    Ban,
    Unban,
}

impl Profile {
    /// A freshly registered user: not approved, no token.
    pub fn new_inactive(user_id: UserId, first_name: &str, username: Option<&str>) -> Self {
        Self {
            id: user_id.0,
            first_name: first_name.to_string(),
            username: username.map(str::to_string),
            banned: false,
            active: false,
            token: None,
            balance: 0,
            created_at: iso_timestamp_utc(),
        }
    }

    /// Banned takes precedence over inactive.
    pub fn access(&self) -> Access {
        if self.banned {
            Access::Banned
        } else if !self.active {
            Access::Inactive
        } else {
            Access::Allowed
        }
    }

    pub fn token(&self) -> Option<AccessToken> {
        self.token
            .as_deref()
            .map(AccessToken::new)
            .filter(|t| !t.is_empty())
    }

    fn apply(&mut self, change: StatusChange) {
        match change {
            StatusChange::Approve => self.active = true,
            StatusChange::Ban => self.banned = true,
            StatusChange::Unban => self.banned = false,
        }
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, user_id: UserId) -> Result<Option<Profile>>;

    /// Returns `false` (and changes nothing) if the user already exists.
    async fn insert_if_absent(&self, profile: Profile) -> Result<bool>;

    async fn set_token(&self, user_id: UserId, token: &AccessToken) -> Result<()>;

    /// Returns `false` if the user is unknown.
    async fn update_status(&self, user_id: UserId, change: StatusChange) -> Result<bool>;
}

type Profiles = BTreeMap<i64, Profile>;

/// Profiles kept in one JSON document, rewritten atomically on every change.
pub struct JsonProfileStore {
    file: Option<JsonFile>,
    profiles: Mutex<Profiles>,
}

impl JsonProfileStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let file = JsonFile::new(path);
        let profiles: Profiles = file.load().await?;
        tracing::info!(
            path = %file.path().display(),
            users = profiles.len(),
            "profile store opened"
        );
        Ok(Self {
            file: Some(file),
            profiles: Mutex::new(profiles),
        })
    }

    /// A store that never touches disk.
    pub fn ephemeral() -> Self {
        Self {
            file: None,
            profiles: Mutex::new(Profiles::new()),
        }
    }

    async fn commit(&self, current: &mut Profiles, next: Profiles) -> Result<()> {
        if let Some(file) = &self.file {
            file.save(&next).await?;
        }
        *current = next;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for JsonProfileStore {
    async fn get(&self, user_id: UserId) -> Result<Option<Profile>> {
        Ok(self.profiles.lock().await.get(&user_id.0).cloned())
    }

    async fn insert_if_absent(&self, profile: Profile) -> Result<bool> {
        let mut profiles = self.profiles.lock().await;
        if profiles.contains_key(&profile.id) {
            return Ok(false);
        }
        let mut next = profiles.clone();
        next.insert(profile.id, profile);
        self.commit(&mut profiles, next).await?;
        Ok(true)
    }

    async fn set_token(&self, user_id: UserId, token: &AccessToken) -> Result<()> {
        let mut profiles = self.profiles.lock().await;
        let mut next = profiles.clone();
        let Some(profile) = next.get_mut(&user_id.0) else {
            return Err(Error::Store(format!("unknown user {}", user_id.0)));
        };
        profile.token = Some(token.expose().to_string());
        self.commit(&mut profiles, next).await
    }

    async fn update_status(&self, user_id: UserId, change: StatusChange) -> Result<bool> {
        let mut profiles = self.profiles.lock().await;
        let mut next = profiles.clone();
        let Some(profile) = next.get_mut(&user_id.0) else {
            return Ok(false);
        };
        profile.apply(change);
        self.commit(&mut profiles, next).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_profiles(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        PathBuf::from(format!(
            "/tmp/{prefix}-{}-{ts}/profiles.json",
            std::process::id()
        ))
    }

    #[test]
    fn banned_wins_over_inactive() {
        let mut p = Profile::new_inactive(UserId(1), "Ann", None);
        assert_eq!(p.access(), Access::Inactive);
        p.banned = true;
        assert_eq!(p.access(), Access::Banned);
        p.banned = false;
        p.active = true;
        assert_eq!(p.access(), Access::Allowed);
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let mut p = Profile::new_inactive(UserId(1), "Ann", None);
        p.token = Some("  ".to_string());
        assert!(p.token().is_none());
        p.token = Some("vk1.a.x".to_string());
        assert_eq!(p.token().map(|t| t.expose().to_string()), Some("vk1.a.x".into()));
    }

    #[tokio::test]
    async fn insert_if_absent_keeps_existing_profile() {
        let store = JsonProfileStore::ephemeral();
        let mut first = Profile::new_inactive(UserId(5), "Ann", Some("ann"));
        first.balance = 10;
        assert!(store.insert_if_absent(first).await.unwrap());
        assert!(!store
            .insert_if_absent(Profile::new_inactive(UserId(5), "Other", None))
            .await
            .unwrap());

        let got = store.get(UserId(5)).await.unwrap().unwrap();
        assert_eq!(got.first_name, "Ann");
        assert_eq!(got.balance, 10);
    }

    #[tokio::test]
    async fn token_and_status_survive_reopen() {
        let path = tmp_profiles("wr-profiles");
        {
            let store = JsonProfileStore::open(&path).await.unwrap();
            store
                .insert_if_absent(Profile::new_inactive(UserId(9), "Bob", None))
                .await
                .unwrap();
            store
                .set_token(UserId(9), &AccessToken::new("tok"))
                .await
                .unwrap();
            assert!(store
                .update_status(UserId(9), StatusChange::Approve)
                .await
                .unwrap());
        }

        let reopened = JsonProfileStore::open(&path).await.unwrap();
        let p = reopened.get(UserId(9)).await.unwrap().unwrap();
        assert_eq!(p.token.as_deref(), Some("tok"));
        assert_eq!(p.access(), Access::Allowed);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn unknown_users_are_reported() {
        let store = JsonProfileStore::ephemeral();
        let err = store
            .set_token(UserId(1), &AccessToken::new("t"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        assert!(!store
            .update_status(UserId(1), StatusChange::Ban)
            .await
            .unwrap());
    }
}
