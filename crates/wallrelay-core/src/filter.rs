//! Content filter: decides whether a fetched post may be republished.
//!
//! Denylist matching is a case-insensitive *substring* match, not whole-word: a short
//! term such as `taxi` also rejects `taxidermy`.

use crate::domain::Post;

/// Promotional / spam markers rejected when no `DENYLIST` is configured.
pub const DEFAULT_DENYLIST: &[&str] = &[
    "такси",
    "скидка",
    "купон",
    "промокод",
    "taxi",
    "discount",
    "coupon",
    "promo code",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterDecision {
    Accept,
    RejectEmpty,
    RejectDenylisted { term: String },
}

impl FilterDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, FilterDecision::Accept)
    }
}

#[derive(Clone, Debug)]
pub struct ContentFilter {
    denylist: Vec<String>,
}

impl ContentFilter {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let denylist = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { denylist }
    }

    pub fn is_eligible(&self, post: &Post) -> bool {
        self.check(post).is_accept()
    }

    pub fn check(&self, post: &Post) -> FilterDecision {
        let text = post.text.trim();
        if text.is_empty() {
            return FilterDecision::RejectEmpty;
        }

        let lower = text.to_lowercase();
        match self.denylist.iter().find(|term| lower.contains(term.as_str())) {
            Some(term) => FilterDecision::RejectDenylisted { term: term.clone() },
            None => FilterDecision::Accept,
        }
    }
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DENYLIST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(text: &str) -> Post {
        Post::new(1, text, 0)
    }

    #[test]
    fn rejects_empty_and_whitespace_only_text() {
        let f = ContentFilter::default();
        assert_eq!(f.check(&post("")), FilterDecision::RejectEmpty);
        assert_eq!(f.check(&post(" \n\t ")), FilterDecision::RejectEmpty);
    }

    #[test]
    fn denylist_is_case_insensitive_substring() {
        let f = ContentFilter::new(["Discount"]);
        assert_eq!(
            f.check(&post("Huge DISCOUNTS today")),
            FilterDecision::RejectDenylisted {
                term: "discount".to_string()
            }
        );
        assert!(f.is_eligible(&post("hello world")));
    }

    #[test]
    fn default_denylist_covers_cyrillic_terms() {
        let f = ContentFilter::default();
        assert!(!f.is_eligible(&post("Лучшее ТАКСИ в городе")));
        assert!(!f.is_eligible(&post("введите промокод при заказе")));
        assert!(f.is_eligible(&post("Новости района")));
    }

    #[test]
    fn short_terms_match_inside_words() {
        let f = ContentFilter::new(["taxi"]);
        assert!(!f.is_eligible(&post("a taxidermy exhibition")));
    }

    #[test]
    fn blank_terms_are_ignored() {
        let f = ContentFilter::new(["", "  "]);
        assert!(f.is_eligible(&post("anything")));
    }
}
