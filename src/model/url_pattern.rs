//! URL disable lists.
//!
//! Each entry is one of:
//! - `/pattern/`: a regular expression searched anywhere in the URL,
//! - a string containing `*`: a wildcard matched against the whole URL,
//! - anything else: exact string comparison.

use regex::Regex;
use tracing::warn;

#[derive(Debug, Clone)]
pub enum UrlPattern {
    Exact(String),
    Wildcard(Regex),
    Regex(Regex),
    /// A pattern that failed to compile. Never matches.
    Invalid(String),
}

impl UrlPattern {
    pub fn parse(raw: &str) -> Self {
        if raw.len() >= 2 && raw.starts_with('/') && raw.ends_with('/') {
            let body = &raw[1..raw.len() - 1];
            return match Regex::new(body) {
                Ok(re) => UrlPattern::Regex(re),
                Err(e) => {
                    warn!(pattern = %raw, "Invalid regex pattern: {e}");
                    UrlPattern::Invalid(raw.to_owned())
                }
            };
        }

        if raw.contains('*') {
            let body = raw.split('*').map(regex::escape).collect::<Vec<_>>().join(".*");
            return match Regex::new(&format!("^{body}$")) {
                Ok(re) => UrlPattern::Wildcard(re),
                Err(e) => {
                    warn!(pattern = %raw, "Invalid wildcard pattern: {e}");
                    UrlPattern::Invalid(raw.to_owned())
                }
            };
        }

        UrlPattern::Exact(raw.to_owned())
    }

    pub fn matches(&self, url: &str) -> bool {
        match self {
            UrlPattern::Exact(s) => s == url,
            UrlPattern::Wildcard(re) | UrlPattern::Regex(re) => re.is_match(url),
            UrlPattern::Invalid(_) => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UrlPatterns(Vec<UrlPattern>);

impl UrlPatterns {
    pub fn new<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        UrlPatterns(
            raw.into_iter()
                .map(|s| s.as_ref().trim().to_owned())
                .filter(|s| !s.is_empty())
                .map(|s| UrlPattern::parse(&s))
                .collect(),
        )
    }

    /// First matching pattern wins.
    pub fn first_match(&self, url: &str) -> Option<&UrlPattern> {
        self.0.iter().find(|p| p.matches(url))
    }

    pub fn matches(&self, url: &str) -> bool { self.first_match(url).is_some() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_patterns_compare_whole_string() {
        let list = UrlPatterns::new(["https://example.com/"]);
        assert!(list.matches("https://example.com/"));
        assert!(!list.matches("https://example.com/a"));
    }

    #[test]
    fn wildcards_are_anchored_and_literal_elsewhere() {
        let list = UrlPatterns::new(["https://*.example.com/*"]);
        assert!(list.matches("https://docs.example.com/page?q=1"));
        assert!(!list.matches("https://docs.exampleXcom/page"));
        assert!(!list.matches("xhttps://docs.example.com/"));
    }

    #[test]
    fn delimited_regex_searches_anywhere() {
        let list = UrlPatterns::new([r"/github\.com\/[^/]+\/issues/"]);
        assert!(list.matches("https://github.com/rust-lang/issues/1"));
        assert!(!list.matches("https://gitlab.com/rust-lang/issues/1"));
    }

    #[test]
    fn invalid_regex_never_matches() {
        let list = UrlPatterns::new(["/(unclosed/", "https://ok.test/"]);
        assert!(!list.matches("(unclosed"));
        assert!(list.matches("https://ok.test/"));
        assert!(matches!(list.0[0], UrlPattern::Invalid(_)));
    }

    #[test]
    fn blank_lines_are_ignored() {
        let list = UrlPatterns::new(["", "   "]);
        assert!(list.is_empty());
        assert!(!list.matches(""));
    }

    #[test]
    fn first_match_wins() {
        let list = UrlPatterns::new(["/example/", "https://example.com/"]);
        assert!(matches!(list.first_match("https://example.com/"), Some(UrlPattern::Regex(_))));
    }
}
