//! Spoofed-hyperlink detection: visible anchor text that names one
//! domain while the href resolves to a different registrable domain.
//!
//! Comparison is public-suffix aware, so `mail.example.com` in the text
//! and `example.com` in the href are the same entity, while
//! `example.com` vs `example.co.uk` are not.

use crate::decomposer::Anchor;
use regex::Regex;
use url::Url;

pub struct SpoofDetector {
    domain_like_regex: Regex,
}

impl Default for SpoofDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl SpoofDetector {
    pub fn new() -> Self {
        Self {
            domain_like_regex: Regex::new(
                r"(?i)^(?:https?://)?[a-z0-9][a-z0-9.-]*\.[a-z]{2,}(?:/\S*)?$",
            )
            .unwrap(),
        }
    }

    /// One spoofed link spoofs the whole message.
    pub fn any_spoofed(&self, anchors: &[Anchor]) -> bool {
        anchors.iter().any(|a| self.is_spoofed(a))
    }

    /// True when the anchor's visible text parses as a domain-like
    /// token whose registrable domain differs from the href's.
    /// Malformed pairs are skipped, never fatal.
    pub fn is_spoofed(&self, anchor: &Anchor) -> bool {
        let text = anchor.text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() || text.contains(' ') || !text.contains('.') {
            return false;
        }
        if !self.domain_like_regex.is_match(&text) {
            return false;
        }

        let claimed = match registrable_domain(&with_scheme(&text)) {
            Some(domain) => domain,
            None => return false,
        };
        let actual = match registrable_domain(&with_scheme(&anchor.href)) {
            Some(domain) => domain,
            None => return false,
        };

        if claimed != actual {
            log::debug!("spoofed anchor: text claims {claimed}, href goes to {actual}");
            return true;
        }
        false
    }
}

fn with_scheme(s: &str) -> String {
    let lower = s.to_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        s.to_string()
    } else if let Some(rest) = s.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!("https://{s}")
    }
}

/// Domain + public suffix of a URL's host, e.g. `mail.example.co.uk`
/// reduces to `example.co.uk`. IP-literal hosts have no registrable
/// domain.
pub fn registrable_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    psl::domain_str(host).map(|d| d.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(text: &str, href: &str) -> Anchor {
        Anchor {
            text: text.to_string(),
            href: href.to_string(),
        }
    }

    #[test]
    fn test_mismatched_registrable_domains_flagged() {
        let detector = SpoofDetector::new();
        assert!(detector.is_spoofed(&anchor("mybank.com", "http://evil.tld/x")));
    }

    #[test]
    fn test_subdomain_of_same_domain_not_flagged() {
        let detector = SpoofDetector::new();
        assert!(!detector.is_spoofed(&anchor("example.com", "https://mail.example.com/inbox")));
    }

    #[test]
    fn test_non_domain_text_ignored() {
        let detector = SpoofDetector::new();
        assert!(!detector.is_spoofed(&anchor("Click here", "http://evil.tld/x")));
        assert!(!detector.is_spoofed(&anchor("mybank.com login page", "http://evil.tld/x")));
        assert!(!detector.is_spoofed(&anchor("", "http://evil.tld/x")));
    }

    #[test]
    fn test_malformed_href_skipped() {
        let detector = SpoofDetector::new();
        assert!(!detector.is_spoofed(&anchor("mybank.com", "not a url %%%")));
    }

    #[test]
    fn test_or_accumulation_across_anchors() {
        let detector = SpoofDetector::new();
        let anchors = vec![
            anchor("see details", "https://ok.example.com/a"),
            anchor("paypal.com", "http://phish.example.net/b"),
        ];
        assert!(detector.any_spoofed(&anchors));
    }

    #[test]
    fn test_registrable_domain_reduces_subdomains() {
        assert_eq!(
            registrable_domain("https://mail.example.com/x"),
            Some("example.com".to_string())
        );
        assert_eq!(
            registrable_domain("https://a.b.example.co.uk"),
            Some("example.co.uk".to_string())
        );
    }
}
