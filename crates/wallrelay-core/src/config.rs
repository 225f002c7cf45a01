use std::{env, path::PathBuf, time::Duration};

use crate::{
    domain::{AccessToken, ChatId, SourceGroup, TargetGroup},
    errors::Error,
    filter::DEFAULT_DENYLIST,
    Result,
};

/// Upstream `wall.get` accepts at most this many posts per call.
pub const MAX_FETCH_COUNT: u32 = 100;

/// Typed configuration, loaded once at startup and shared as `Arc<Config>`.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    /// Operator's private chat. Operator commands are accepted only from this chat and only
    /// when the sender's user id equals it, so a group chat id never grants them.
    pub admin_chat_id: Option<ChatId>,

    // VK API
    pub vk_api_base: String,
    pub vk_api_version: String,
    pub vk_http_timeout: Duration,
    pub vk_oauth_client_id: String,
    pub vk_job_token: AccessToken,
    pub target_group: TargetGroup,

    // Cross-posting
    pub source_groups: Vec<SourceGroup>,
    pub denylist: Vec<String>,
    pub poll_interval: Duration,
    pub publish_delay: Duration,
    pub fetch_limit: u32,
    pub max_backfill_pages: u32,

    // Persistence
    pub state_dir: PathBuf,

    // Interactive flow
    pub session_idle_timeout: Duration,
    pub digest_max_posts: u32,
    pub digest_text_limit: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        // A missing .env is fine; existing env vars always win.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the process env in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let telegram_bot_token = required(get("TELEGRAM_BOT_TOKEN"), "TELEGRAM_BOT_TOKEN")?;
        let vk_job_token = AccessToken::new(required(get("VK_JOB_TOKEN"), "VK_JOB_TOKEN")?);

        let target_raw = required(get("VK_TARGET_GROUP_ID"), "VK_TARGET_GROUP_ID")?;
        let target_group = target_raw
            .trim()
            .parse::<i64>()
            .map(TargetGroup::from_config)
            .map_err(|_| {
                Error::Config(format!(
                    "VK_TARGET_GROUP_ID must be an integer, got {target_raw}"
                ))
            })?;

        let source_groups = parse_groups(get("SOURCE_GROUPS"));
        if source_groups.is_empty() {
            return Err(Error::Config(
                "SOURCE_GROUPS environment variable is required".to_string(),
            ));
        }

        let admin_chat_id = match get("ADMIN_CHAT_ID") {
            Some(v) => Some(ChatId(v.trim().parse::<i64>().map_err(|_| {
                Error::Config(format!("ADMIN_CHAT_ID must be an integer, got {v}"))
            })?)),
            None => None,
        };

        let denylist = match get("DENYLIST") {
            Some(v) => parse_csv_lower(&v),
            None => DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
        };

        let poll_interval =
            Duration::from_secs(parse_u64(&get, "POLL_INTERVAL_SECS")?.unwrap_or(1800).max(1));
        let publish_delay =
            Duration::from_secs(parse_u64(&get, "PUBLISH_DELAY_SECS")?.unwrap_or(15));
        let fetch_limit = parse_u64(&get, "FETCH_LIMIT")?
            .unwrap_or(20)
            .clamp(1, MAX_FETCH_COUNT as u64) as u32;
        let max_backfill_pages = parse_int::<u32>(&get, "MAX_BACKFILL_PAGES")?.unwrap_or(5);

        let vk_api_base = get("VK_API_BASE")
            .unwrap_or_else(|| "https://api.vk.com/method".to_string())
            .trim_end_matches('/')
            .to_string();
        let vk_api_version = get("VK_API_VERSION").unwrap_or_else(|| "5.199".to_string());
        let vk_http_timeout =
            Duration::from_secs(parse_u64(&get, "VK_HTTP_TIMEOUT_SECS")?.unwrap_or(15).max(1));
        let vk_oauth_client_id =
            get("VK_OAUTH_CLIENT_ID").unwrap_or_else(|| "6121396".to_string());

        let state_dir = PathBuf::from(get("STATE_DIR").unwrap_or_else(|| "./data".to_string()));

        let session_idle_timeout = Duration::from_secs(
            parse_u64(&get, "SESSION_IDLE_TIMEOUT_SECS")?
                .unwrap_or(1800)
                .max(1),
        );
        let digest_max_posts = parse_u64(&get, "DIGEST_MAX_POSTS")?
            .unwrap_or(MAX_FETCH_COUNT as u64)
            .clamp(1, MAX_FETCH_COUNT as u64) as u32;
        let digest_text_limit = parse_int::<usize>(&get, "DIGEST_TEXT_LIMIT")?.unwrap_or(1000);

        Ok(Self {
            telegram_bot_token,
            admin_chat_id,
            vk_api_base,
            vk_api_version,
            vk_http_timeout,
            vk_oauth_client_id,
            vk_job_token,
            target_group,
            source_groups,
            denylist,
            poll_interval,
            publish_delay,
            fetch_limit,
            max_backfill_pages,
            state_dir,
            session_idle_timeout,
            digest_max_posts,
            digest_text_limit,
        })
    }

    pub fn watermarks_file(&self) -> PathBuf {
        self.state_dir.join("watermarks.json")
    }

    pub fn profiles_file(&self) -> PathBuf {
        self.state_dir.join("profiles.json")
    }
}

fn required(v: Option<String>, key: &str) -> Result<String> {
    v.ok_or_else(|| Error::Config(format!("{key} environment variable is required")))
}

fn parse_u64(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    let Some(raw) = get(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got {raw}")))
}

fn parse_int<T: TryFrom<u64>>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    let Some(v) = parse_u64(get, key)? else {
        return Ok(None);
    };
    T::try_from(v)
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} is out of range, got {v}")))
}

fn parse_groups(v: Option<String>) -> Vec<SourceGroup> {
    let mut out: Vec<SourceGroup> = Vec::new();
    for part in v.unwrap_or_default().split(',') {
        let group = SourceGroup::new(part);
        if group.as_str().is_empty() || out.contains(&group) {
            continue;
        }
        out.push(group);
    }
    out
}

fn parse_csv_lower(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
