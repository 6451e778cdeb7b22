//! Text normalization applied to every post before tokenization.
//!
//! The rewrite is token based:
//!
//! 1. decode HTML character entities
//! 2. split on whitespace
//! 3. `http...` tokens become `#link`
//! 4. `@...` tokens become `@mention`
//! 5. `$...` tokens become `$cashtag`
//! 6. a leading number (`12`, `100.5`) becomes `#number`, keeping the rest of the token
//! 7. characters outside `[A-Za-z0-9@#$.,!?' ]` are removed
//! 8. empty tokens are dropped and the rest joined with single spaces
//!
//! Rules 3 to 6 are tried in order and the first match wins, so `#link` is
//! never fed to the number rule.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::{NormalizedPost, Post};

pub const LINK_PLACEHOLDER: &str = "#link";
pub const MENTION_PLACEHOLDER: &str = "@mention";
pub const CASHTAG_PLACEHOLDER: &str = "$cashtag";
pub const NUMBER_PLACEHOLDER: &str = "#number";

static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+(?:\.[0-9]+)?").expect("number regex"));

static DISALLOWED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9@#$.,!?' ]").expect("charset regex"));

/// Whether `c` may appear in normalized output.
pub fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '@' | '#' | '$' | '.' | ',' | '!' | '?' | '\'' | ' ')
}

/// Stateless post normalizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize one text. Total and deterministic.
    pub fn normalize(&self, text: &str) -> String {
        normalize(text)
    }

    /// Normalize a post, carrying its label over.
    pub fn normalize_post(&self, post: &Post) -> NormalizedPost {
        NormalizedPost::new(normalize(&post.text), post.label)
    }

    /// Normalize a batch of texts, preserving order.
    pub fn normalize_batch(&self, texts: &[&str]) -> Vec<String> {
        texts.iter().map(|text| normalize(text)).collect()
    }
}

/// Normalize one text. See the module docs for the rule order.
pub fn normalize(text: &str) -> String {
    let decoded = html_escape::decode_html_entities(text);

    decoded
        .split_whitespace()
        .map(normalize_token)
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_token(token: &str) -> String {
    let first = strip_disallowed(&rewrite_token(token)).into_owned();
    // Stripping can expose a prefix the rules match ("-@bob" -> "@bob"); one
    // more round reaches the fixed point.
    strip_disallowed(&rewrite_token(&first)).into_owned()
}

fn rewrite_token(token: &str) -> Cow<'_, str> {
    if token.starts_with("http") {
        Cow::Borrowed(LINK_PLACEHOLDER)
    } else if token.starts_with('@') {
        Cow::Borrowed(MENTION_PLACEHOLDER)
    } else if token.starts_with('$') {
        Cow::Borrowed(CASHTAG_PLACEHOLDER)
    } else {
        LEADING_NUMBER.replace(token, NUMBER_PLACEHOLDER)
    }
}

fn strip_disallowed(token: &str) -> Cow<'_, str> {
    DISALLOWED_CHARS.replace_all(token, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sentiment;

    const SAMPLES: &[&str] = &[
        "Check out http://example.com now",
        "@elonmusk said $TSLA will hit 100.5 today",
        "AT&amp;T up 3% after earnings!!! https://t.co/abc123",
        "I&#39;m bullish on $AAPL… 🚀🚀",
        "  multiple\t\twhitespace \n runs  ",
        "-@bob (http://x.io) 42nd 7.5x 3.14.15",
        "&lt;3 &amp;amp; ünïcödé",
        "",
        "!!!",
        "$ @ http 1",
    ];

    #[test]
    fn replaces_links() {
        assert_eq!(normalize("Check out http://example.com now"), "Check out #link now");
    }

    #[test]
    fn replaces_mentions_cashtags_and_numbers() {
        assert_eq!(
            normalize("@elonmusk said $TSLA will hit 100.5 today"),
            "@mention said $cashtag will hit #number today"
        );
    }

    #[test]
    fn number_rule_only_replaces_the_prefix() {
        assert_eq!(normalize("100.5k"), "#numberk");
        assert_eq!(normalize("42nd"), "#numbernd");
        assert_eq!(normalize("3.14.15"), "#number.15");
        assert_eq!(normalize("Q3"), "Q3");
    }

    #[test]
    fn placeholder_is_not_rematched() {
        // "$5" is a cashtag, not a number.
        assert_eq!(normalize("$5"), "$cashtag");
        assert_eq!(normalize("https://1.2.3.4"), "#link");
    }

    #[test]
    fn decodes_html_entities_before_filtering() {
        assert_eq!(normalize("I&#39;m in"), "I'm in");
        assert_eq!(normalize("AT&amp;T"), "ATT");
    }

    #[test]
    fn drops_tokens_that_become_empty() {
        assert_eq!(normalize("gains 🚀 ahead"), "gains ahead");
        assert_eq!(normalize("   "), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn filtering_exposed_prefixes_are_rewritten() {
        assert_eq!(normalize("-@bob"), "@mention");
        assert_eq!(normalize("(http://x.io)"), "#link");
        assert_eq!(normalize("~12"), "#number");
    }

    #[test]
    fn normalization_is_idempotent() {
        for sample in SAMPLES {
            let once = normalize(sample);
            let twice = normalize(&once);
            assert_eq!(once, twice, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn output_only_contains_allowed_characters() {
        for sample in SAMPLES {
            let out = normalize(sample);
            assert!(
                out.chars().all(is_allowed_char),
                "disallowed character in {out:?}"
            );
            assert!(!out.contains("  "));
            assert_eq!(out.trim(), out);
        }
    }

    #[test]
    fn normalize_post_keeps_label() {
        let post = Post::labeled("$TSLA to the moon", Sentiment::Positive);
        let normalized = Normalizer::new().normalize_post(&post);
        assert_eq!(normalized.text(), "$cashtag to the moon");
        assert_eq!(normalized.label(), Some(Sentiment::Positive));
    }

    #[test]
    fn normalize_batch_preserves_order() {
        let out = Normalizer::new().normalize_batch(&["@a", "b", "$c"]);
        assert_eq!(out, vec!["@mention", "b", "$cashtag"]);
    }
}
