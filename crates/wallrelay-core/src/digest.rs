//! Plain-text digest of a group's latest posts, delivered as a document.

use chrono::{DateTime, Local, TimeZone};

use crate::{
    domain::{Post, SourceGroup},
    messaging::types::OutgoingDocument,
    utils::truncate_chars,
};

const SEPARATOR: &str = "---";

/// Render posts in the order given (upstream order, newest first).
pub fn render_digest(group: &SourceGroup, posts: &[Post], text_limit: usize) -> String {
    render_digest_in(&Local, group, posts, text_limit)
}

fn render_digest_in<Tz>(
    tz: &Tz,
    group: &SourceGroup,
    posts: &[Post],
    text_limit: usize,
) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut out = format!("Last {} posts from group {}:\n\n", posts.len(), group);
    for post in posts {
        out.push_str(&format!("Date: {}\n", format_date(tz, post.timestamp)));
        out.push_str(&format!(
            "Text: {}\n",
            truncate_chars(post.text.trim(), text_limit)
        ));
        out.push_str(SEPARATOR);
        out.push('\n');
    }
    out
}

fn format_date<Tz>(tz: &Tz, timestamp: i64) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    match DateTime::from_timestamp(timestamp, 0) {
        Some(utc) => utc
            .with_timezone(tz)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => "unknown".to_string(),
    }
}

pub fn digest_file_name(group: &SourceGroup, unix_millis: i64) -> String {
    let safe: String = group
        .as_str()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("group_{safe}_{unix_millis}.txt")
}

pub fn digest_document(
    group: &SourceGroup,
    posts: &[Post],
    text_limit: usize,
    unix_millis: i64,
) -> OutgoingDocument {
    OutgoingDocument::text(
        digest_file_name(group, unix_millis),
        render_digest(group, posts, text_limit),
    )
}
