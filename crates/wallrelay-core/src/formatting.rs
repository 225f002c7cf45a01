//! Telegram HTML helpers for bot replies.

use crate::domain::UserId;

/// Escape text for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn bold(text: &str) -> String {
    format!("<b>{}</b>", escape_html(text))
}

pub fn code(text: &str) -> String {
    format!("<code>{}</code>", escape_html(text))
}

/// `<a href="...">label</a>` with both parts escaped.
pub fn link(href: &str, label: &str) -> String {
    format!("<a href=\"{}\">{}</a>", escape_html(href), escape_html(label))
}

/// One-line description of a user for operator notifications.
pub fn describe_user(user_id: UserId, first_name: &str, username: Option<&str>) -> String {
    let name = if first_name.trim().is_empty() {
        "unknown".to_string()
    } else {
        bold(first_name.trim())
    };
    match username.map(str::trim).filter(|u| !u.is_empty()) {
        Some(u) => format!("{name} (@{}, id {})", escape_html(u), user_id.0),
        None => format!("{name} (id {})", user_id.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html() {
        assert_eq!(
            escape_html(r#"<b>"Tom" & Jerry</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; Jerry&lt;/b&gt;"
        );
    }

    #[test]
    fn describe_user_escapes_names() {
        let s = describe_user(UserId(42), "<script>", Some("eve"));
        assert_eq!(s, "<b>&lt;script&gt;</b> (@eve, id 42)");
        assert_eq!(describe_user(UserId(7), "Ann", None), "<b>Ann</b> (id 7)");
        assert_eq!(describe_user(UserId(7), " ", Some(" ")), "unknown (id 7)");
    }

    #[test]
    fn link_escapes_query_ampersands() {
        assert_eq!(
            link("https://x.test/?a=1&b=2", "open"),
            "<a href=\"https://x.test/?a=1&amp;b=2\">open</a>"
        );
    }
}
