//! Content validation — gatekeeps the post → publication transition.
//!
//! A pure function of (content, policy): every check runs, every violation
//! is collected in one pass so the caller can show all problems at once.
//! The policy is a snapshot passed per call; nothing is cached here.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

use telepost_core::config::PolicyConfig;
use telepost_core::error::Result;
use telepost_core::types::{BlacklistRule, RenderedPost, RuleKind};
use telepost_ledger::Ledger;

/// Active policy snapshot: limits from config plus enabled blacklist rules.
#[derive(Debug, Clone)]
pub struct Policy {
    pub max_length: usize,
    pub max_media: usize,
    pub max_links: usize,
    pub rules: Vec<BlacklistRule>,
}

impl Policy {
    pub fn new(config: &PolicyConfig, rules: Vec<BlacklistRule>) -> Self {
        Self {
            max_length: config.max_length,
            max_media: config.max_media,
            max_links: config.max_links,
            rules,
        }
    }

    /// Fresh snapshot with the currently enabled blacklist rules.
    pub fn load(ledger: &Ledger, config: &PolicyConfig) -> Result<Self> {
        Ok(Self::new(config, ledger.blacklist_rules()?))
    }
}

/// One reason a post may not be scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    TooLong { length: usize, max: usize },
    TooManyMedia { count: usize, max: usize },
    TooManyLinks { count: usize, max: usize },
    BadLinkScheme { href: String },
    BlacklistedWord { pattern: String },
    BlacklistedDomain { pattern: String },
    BlacklistedPattern { pattern: String },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooLong { length, max } => {
                write!(f, "text length {length} exceeds the maximum of {max}")
            }
            Self::TooManyMedia { count, max } => {
                write!(f, "{count} media items exceed the maximum of {max}")
            }
            Self::TooManyLinks { count, max } => {
                write!(f, "{count} links exceed the maximum of {max}")
            }
            Self::BadLinkScheme { href } => write!(f, "link scheme not allowed: {href}"),
            Self::BlacklistedWord { pattern } => write!(f, "blacklisted word: {pattern}"),
            Self::BlacklistedDomain { pattern } => write!(f, "blacklisted domain: {pattern}"),
            Self::BlacklistedPattern { pattern } => write!(f, "blacklisted pattern: {pattern}"),
        }
    }
}

/// Evaluate content against the policy. Empty result means the post may be
/// scheduled. Deterministic and idempotent: identical inputs always yield
/// identical violation lists.
pub fn validate(content: &RenderedPost, policy: &Policy) -> Vec<Violation> {
    let mut violations = Vec::new();

    let length = content.html.chars().count();
    if length > policy.max_length {
        violations.push(Violation::TooLong {
            length,
            max: policy.max_length,
        });
    }

    if content.media.len() > policy.max_media {
        violations.push(Violation::TooManyMedia {
            count: content.media.len(),
            max: policy.max_media,
        });
    }

    let links = extract_links(&content.html);
    if links.len() > policy.max_links {
        violations.push(Violation::TooManyLinks {
            count: links.len(),
            max: policy.max_links,
        });
    }
    for href in &links {
        if !href.starts_with("http://") && !href.starts_with("https://") {
            violations.push(Violation::BadLinkScheme { href: href.clone() });
        }
    }

    let text_lower = content.html.to_lowercase();
    for rule in &policy.rules {
        let pattern = rule.pattern.trim();
        if pattern.is_empty() {
            continue;
        }
        match rule.kind {
            RuleKind::Word => {
                if text_lower.contains(&pattern.to_lowercase()) {
                    violations.push(Violation::BlacklistedWord {
                        pattern: pattern.to_string(),
                    });
                }
            }
            RuleKind::Domain => {
                let needle = pattern.to_lowercase();
                if links
                    .iter()
                    .filter_map(|href| link_domain(href))
                    .any(|domain| domain.contains(&needle))
                {
                    violations.push(Violation::BlacklistedDomain {
                        pattern: pattern.to_string(),
                    });
                }
            }
            RuleKind::Regex => match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) => {
                    if re.is_match(&content.html) {
                        violations.push(Violation::BlacklistedPattern {
                            pattern: pattern.to_string(),
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!("skipping invalid blacklist regex '{pattern}': {e}");
                }
            },
        }
    }

    violations
}

/// `href` attribute values pulled out of the post HTML.
fn extract_links(html: &str) -> Vec<String> {
    static HREF: OnceLock<Regex> = OnceLock::new();
    let re = HREF.get_or_init(|| {
        Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).expect("static regex")
    });
    re.captures_iter(html)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Lowercased host part of a link, None when there is no scheme.
fn link_domain(href: &str) -> Option<String> {
    let rest = href.split_once("://")?.1;
    let host = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let host = host.rsplit('@').next().unwrap_or(host);
    Some(host.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use telepost_core::types::MediaItem;

    fn content(html: &str) -> RenderedPost {
        RenderedPost {
            html: html.to_string(),
            media: Vec::new(),
            buttons: Vec::new(),
            options: Default::default(),
        }
    }

    fn policy(rules: Vec<BlacklistRule>) -> Policy {
        Policy::new(&PolicyConfig::default(), rules)
    }

    fn rule(kind: RuleKind, pattern: &str) -> BlacklistRule {
        BlacklistRule {
            id: 0,
            kind,
            pattern: pattern.to_string(),
            enabled: true,
        }
    }

    #[test]
    fn test_clean_post_passes() {
        let violations = validate(
            &content("all <b>fine</b> <a href=\"https://example.com\">here</a>"),
            &policy(vec![rule(RuleKind::Word, "casino")]),
        );
        assert!(violations.is_empty());
    }

    #[test]
    fn test_word_match_is_case_insensitive() {
        let violations = validate(
            &content("Visit the CaSiNo tonight"),
            &policy(vec![rule(RuleKind::Word, "casino")]),
        );
        assert_eq!(
            violations,
            vec![Violation::BlacklistedWord {
                pattern: "casino".into()
            }]
        );
    }

    #[test]
    fn test_domain_match_on_extracted_links() {
        let violations = validate(
            &content("<a href='https://Sub.Spam.example/offer'>deal</a>"),
            &policy(vec![rule(RuleKind::Domain, "spam.example")]),
        );
        assert_eq!(
            violations,
            vec![Violation::BlacklistedDomain {
                pattern: "spam.example".into()
            }]
        );
    }

    #[test]
    fn test_regex_match_case_insensitive() {
        let violations = validate(
            &content("FREE MONEY inside"),
            &policy(vec![rule(RuleKind::Regex, r"free\s+money")]),
        );
        assert_eq!(violations.len(), 1);
        assert!(matches!(violations[0], Violation::BlacklistedPattern { .. }));
    }

    #[test]
    fn test_invalid_regex_is_skipped() {
        let violations = validate(
            &content("anything"),
            &policy(vec![rule(RuleKind::Regex, "([unclosed")]),
        );
        assert!(violations.is_empty());
    }

    #[test]
    fn test_bad_link_scheme() {
        let violations = validate(
            &content("<a href=\"ftp://warez.example/x\">get</a>"),
            &policy(vec![]),
        );
        assert_eq!(
            violations,
            vec![Violation::BadLinkScheme {
                href: "ftp://warez.example/x".into()
            }]
        );
    }

    #[test]
    fn test_length_and_media_limits() {
        let mut post = content(&"x".repeat(5000));
        for i in 0..11 {
            post.media.push(MediaItem {
                kind: "photo".into(),
                url: format!("https://example.com/{i}.jpg"),
            });
        }
        let violations = validate(&post, &policy(vec![]));
        assert!(violations.contains(&Violation::TooLong {
            length: 5000,
            max: 4096
        }));
        assert!(violations.contains(&Violation::TooManyMedia { count: 11, max: 10 }));
    }

    #[test]
    fn test_all_violations_collected_in_one_pass() {
        // blacklisted domain AND over-length in the same call
        let html = format!(
            "{} <a href=\"https://spam.example/x\">go</a>",
            "y".repeat(4200)
        );
        let violations = validate(&content(&html), &policy(vec![rule(RuleKind::Domain, "spam.example")]));
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn test_validate_is_idempotent() {
        let post = content("the CASINO <a href='ftp://x.example'>link</a>");
        let p = policy(vec![rule(RuleKind::Word, "casino")]);
        assert_eq!(validate(&post, &p), validate(&post, &p));
    }

    #[test]
    fn test_link_domain_parsing() {
        assert_eq!(
            link_domain("https://User@Sub.Example.COM:8080/path?q=1"),
            Some("sub.example.com:8080".into())
        );
        assert_eq!(link_domain("no-scheme-here"), None);
    }
}
