//! Parsing of user input: commands, counts, pasted OAuth redirects, manual posts.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::AccessToken;

const LEGACY_POST_TRIGGER: &str = "сделать пост";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    GroupParsing,
    Post(String),
    Cancel,
    CrossPost,
    Approve(String),
    Ban(String),
    Unban(String),
    Unknown(String),
}

/// Parse a slash command. Telegram may send `/cmd@botname arg1 ...`.
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }

    let mut parts = text.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("");
    let args = parts.next().unwrap_or("").trim().to_string();

    let name = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    Some(match name.as_str() {
        "start" => Command::Start,
        "group_parsing" => Command::GroupParsing,
        "post" => Command::Post(args),
        "cancel" => Command::Cancel,
        "crosspost" => Command::CrossPost,
        "approve" => Command::Approve(args),
        "ban" => Command::Ban(args),
        "unban" => Command::Unban(args),
        _ => Command::Unknown(name),
    })
}

/// A post count in `1..=max`.
pub fn parse_post_count(text: &str, max: u32) -> Option<u32> {
    text.trim()
        .parse::<u32>()
        .ok()
        .filter(|n| (1..=max).contains(n))
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"access_token=([^&\s]+)").expect("valid regex"))
}

/// Pull the token out of a pasted OAuth redirect URL
/// (`https://oauth.vk.com/blank.html#access_token=...&expires_in=0&user_id=...`).
pub fn extract_access_token(text: &str) -> Option<AccessToken> {
    if !text.to_lowercase().contains("access") {
        return None;
    }
    token_regex()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| AccessToken::new(m.as_str()))
}

/// Whether the message uses the `сделать пост | <text>` form.
pub fn is_legacy_post(text: &str) -> bool {
    text.to_lowercase().contains(LEGACY_POST_TRIGGER)
}

/// The post body from `сделать пост | <text>`, if present and non-empty.
pub fn legacy_post_body(text: &str) -> Option<&str> {
    text.split_once('|')
        .map(|(_, body)| body.trim())
        .filter(|body| !body.is_empty())
}

/// Implicit-flow authorization URL; the user pastes back the redirect it lands on.
pub fn oauth_link(client_id: &str) -> String {
    format!(
        "https://oauth.vk.com/authorize?client_id={client_id}&scope=wall,offline\
         &redirect_uri=https://oauth.vk.com/blank.html&display=page&response_type=token&revoke=1"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_bot_suffix_and_args() {
        assert_eq!(parse_command("/start"), Some(Command::Start));
        assert_eq!(
            parse_command("/Group_Parsing@relay_bot"),
            Some(Command::GroupParsing)
        );
        assert_eq!(
            parse_command("/post  Hello there "),
            Some(Command::Post("Hello there".to_string()))
        );
        assert_eq!(
            parse_command("/approve 42"),
            Some(Command::Approve("42".to_string()))
        );
        assert_eq!(
            parse_command("/whatever"),
            Some(Command::Unknown("whatever".to_string()))
        );
        assert_eq!(parse_command("hello"), None);
    }

    #[test]
    fn post_count_must_be_in_range() {
        assert_eq!(parse_post_count(" 5 ", 100), Some(5));
        assert_eq!(parse_post_count("100", 100), Some(100));
        assert_eq!(parse_post_count("0", 100), None);
        assert_eq!(parse_post_count("101", 100), None);
        assert_eq!(parse_post_count("-3", 100), None);
        assert_eq!(parse_post_count("ten", 100), None);
    }

    #[test]
    fn extracts_token_from_redirect_url() {
        let url = "https://oauth.vk.com/blank.html#access_token=vk1.a.XYZ&expires_in=0&user_id=1";
        assert_eq!(
            extract_access_token(url).map(|t| t.expose().to_string()),
            Some("vk1.a.XYZ".to_string())
        );
        assert!(extract_access_token("access denied").is_none());
        assert!(extract_access_token("token=abc").is_none());
    }

    #[test]
    fn legacy_post_needs_a_body() {
        assert!(is_legacy_post("Сделать пост | Привет"));
        assert_eq!(legacy_post_body("сделать пост | Привет "), Some("Привет"));
        assert_eq!(legacy_post_body("сделать пост"), None);
        assert_eq!(legacy_post_body("сделать пост |   "), None);
    }

    #[test]
    fn oauth_link_embeds_client_id() {
        let link = oauth_link("6121396");
        assert!(link.starts_with("https://oauth.vk.com/authorize?client_id=6121396&"));
        assert!(link.contains("response_type=token"));
    }
}
