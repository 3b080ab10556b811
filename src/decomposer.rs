//! Email decomposition: one raw RFC-2822 message in, header fields,
//! plain-text body, HTML body and a deduplicated URL set out.
//!
//! MIME walking and transfer-encoding decode are delegated to
//! `mail-parser`, which handles nested multiparts and falls back to
//! lossy byte decoding instead of failing. Header values are taken from
//! a raw scan of the header block so that every occurrence of
//! `Received` survives and unusual field values reach the feature
//! extractors unmangled.

use crate::error::AnalysisError;
use crate::spoof::SpoofDetector;
use mail_parser::MessageParser;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};

/// Case-insensitive header map with `Received` kept as a list of all
/// occurrences. Absent headers read as the empty string.
#[derive(Debug, Clone, Default)]
pub struct HeaderFields {
    fields: HashMap<String, String>,
    received: Vec<String>,
}

impl HeaderFields {
    pub fn get(&self, name: &str) -> &str {
        self.fields
            .get(&name.to_lowercase())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn received(&self) -> &[String] {
        &self.received
    }

    fn insert(&mut self, name: &str, value: String) {
        let key = name.trim().to_lowercase();
        if key == "received" {
            self.received.push(value);
        } else {
            // First occurrence wins for everything except Received.
            self.fields.entry(key).or_insert(value);
        }
    }
}

/// The per-request view of a message, immutable after construction.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub headers: HeaderFields,
    pub plain_text: String,
    pub html_body: String,
    pub urls: BTreeSet<String>,
    pub is_spoofed: bool,
}

/// An anchor tag's visible text paired with its href target.
#[derive(Debug, Clone)]
pub struct Anchor {
    pub text: String,
    pub href: String,
}

pub struct EmailDecomposer {
    text_url_regex: Regex,
    anchor_regex: Regex,
    spoof_detector: SpoofDetector,
}

impl Default for EmailDecomposer {
    fn default() -> Self {
        Self::new()
    }
}

impl EmailDecomposer {
    pub fn new() -> Self {
        Self {
            text_url_regex: Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s<>"']+"#).unwrap(),
            // scraper drops anchors inside malformed markup that real
            // phishing kits produce; a raw scan recovers them.
            anchor_regex: Regex::new(
                r#"(?is)<a\b[^>]*href\s*=\s*["']?([^"'\s>]+)["']?[^>]*>(.*?)</a>"#,
            )
            .unwrap(),
            spoof_detector: SpoofDetector::new(),
        }
    }

    /// Parse a raw message. Structurally unparsable input is a
    /// [`AnalysisError::Parse`]; a message with no body at all is a
    /// successful parse with empty fields.
    pub fn decompose(&self, raw: &str) -> Result<ParsedMessage, AnalysisError> {
        if raw.trim().is_empty() {
            return Err(AnalysisError::Parse("empty message".to_string()));
        }

        let message = MessageParser::default()
            .parse(raw.as_bytes())
            .ok_or_else(|| AnalysisError::Parse("not an RFC 2822 message".to_string()))?;

        let mut plain_text = String::new();
        for pos in 0..message.text_body.len() {
            if let Some(text) = message.body_text(pos) {
                plain_text.push_str(&text);
            }
        }

        let mut html_body = String::new();
        for pos in 0..message.html_body.len() {
            if let Some(html) = message.body_html(pos) {
                html_body.push_str(&html);
            }
        }

        let headers = self.scan_headers(raw);
        let anchors = self.collect_anchors(&html_body);

        let mut urls = BTreeSet::new();
        for token in self.text_url_regex.find_iter(&plain_text) {
            if let Some(url) = normalize_url(token.as_str()) {
                urls.insert(url);
            }
        }
        for anchor in &anchors {
            if let Some(url) = normalize_url(&anchor.href) {
                urls.insert(url);
            }
        }

        let is_spoofed = self.spoof_detector.any_spoofed(&anchors);

        log::debug!(
            "decomposed message: {} urls, {} anchors, spoofed={}",
            urls.len(),
            anchors.len(),
            is_spoofed
        );

        Ok(ParsedMessage {
            headers,
            plain_text,
            html_body,
            urls,
            is_spoofed,
        })
    }

    /// Raw scan of the header block with RFC 822 continuation-line
    /// unfolding. Stops at the first blank line.
    fn scan_headers(&self, raw: &str) -> HeaderFields {
        let mut headers = HeaderFields::default();
        let mut current: Option<(String, String)> = None;

        for line in raw.lines() {
            if line.is_empty() {
                break;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }
            if let Some((name, value)) = current.take() {
                headers.insert(&name, value);
            }
            match line.split_once(':') {
                Some((name, value)) => {
                    current = Some((name.to_string(), value.trim().to_string()));
                }
                None => {
                    // Garbage line inside the header block; skip it
                    // rather than failing the whole parse.
                    current = None;
                }
            }
        }
        if let Some((name, value)) = current.take() {
            headers.insert(&name, value);
        }

        headers
    }

    fn collect_anchors(&self, html: &str) -> Vec<Anchor> {
        let mut anchors = Vec::new();
        for cap in self.anchor_regex.captures_iter(html) {
            let href = cap.get(1).map(|m| m.as_str()).unwrap_or("").trim();
            let inner = cap.get(2).map(|m| m.as_str()).unwrap_or("");
            if href.is_empty() {
                continue;
            }
            anchors.push(Anchor {
                text: strip_tags(inner),
                href: href.to_string(),
            });
        }
        anchors
    }
}

/// Scheme-normalize a discovered URL. Protocol-relative `//` targets
/// are assumed HTTPS and bare `www.` tokens get a scheme; anything that
/// still is not web-scheme (mailto:, tel:, javascript:) is dropped.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches(['.', ',', ';', ')', ']']);
    if trimmed.is_empty() {
        return None;
    }
    let normalized = if let Some(rest) = trimmed.strip_prefix("//") {
        format!("https://{rest}")
    } else if trimmed.to_lowercase().starts_with("www.") {
        format!("https://{trimmed}")
    } else {
        trimmed.to_string()
    };
    let lower = normalized.to_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Some(normalized)
    } else {
        None
    }
}

fn strip_tags(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for c in fragment.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_MESSAGE: &str = "From: Alice <alice@example.com>\r\n\
        To: bob@example.org\r\n\
        Subject: hello\r\n\
        Received: from a.example.com by mx.example.org\r\n\
        Received: from unknown [127.0.0.1]\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        See https://example.com/a and www.example.org/b or mailto:x@y.z\r\n";

    #[test]
    fn test_headers_and_all_received_kept() {
        let parsed = EmailDecomposer::new().decompose(SIMPLE_MESSAGE).unwrap();
        assert_eq!(parsed.headers.get("subject"), "hello");
        assert_eq!(parsed.headers.get("SUBJECT"), "hello");
        assert_eq!(parsed.headers.get("x-missing"), "");
        assert_eq!(parsed.headers.received().len(), 2);
    }

    #[test]
    fn test_urls_deduplicated_and_normalized() {
        let parsed = EmailDecomposer::new().decompose(SIMPLE_MESSAGE).unwrap();
        assert!(parsed.urls.contains("https://example.com/a"));
        assert!(parsed.urls.contains("https://www.example.org/b"));
        // mailto is not a web scheme
        assert_eq!(parsed.urls.len(), 2);
    }

    #[test]
    fn test_empty_message_is_parse_error() {
        assert!(EmailDecomposer::new().decompose("   \r\n").is_err());
    }

    #[test]
    fn test_multipart_bodies_collected() {
        let raw = "From: a@b.c\r\n\
            Subject: multi\r\n\
            MIME-Version: 1.0\r\n\
            Content-Type: multipart/alternative; boundary=\"xyz\"\r\n\
            \r\n\
            --xyz\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            plain part\r\n\
            --xyz\r\n\
            Content-Type: text/html\r\n\
            \r\n\
            <html><body><a href=\"http://evil.tld/x\">mybank.com</a></body></html>\r\n\
            --xyz--\r\n";
        let parsed = EmailDecomposer::new().decompose(raw).unwrap();
        assert!(parsed.plain_text.contains("plain part"));
        assert!(parsed.html_body.contains("evil.tld"));
        assert!(parsed.urls.contains("http://evil.tld/x"));
        assert!(parsed.is_spoofed);
    }

    #[test]
    fn test_protocol_relative_url() {
        assert_eq!(
            normalize_url("//cdn.example.com/x"),
            Some("https://cdn.example.com/x".to_string())
        );
        assert_eq!(normalize_url("mailto:a@b.c"), None);
        assert_eq!(normalize_url("javascript:void(0)"), None);
    }

    #[test]
    fn test_header_continuation_unfolded() {
        let raw = "Subject: a very\r\n long subject\r\nFrom: a@b.c\r\n\r\nbody\r\n";
        let parsed = EmailDecomposer::new().decompose(raw).unwrap();
        assert_eq!(parsed.headers.get("subject"), "a very long subject");
    }

    #[test]
    fn test_anchor_text_with_nested_markup() {
        let decomposer = EmailDecomposer::new();
        let anchors =
            decomposer.collect_anchors(r#"<a href="http://x.y/z"><b>my</b>bank.com </a>"#);
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].text, "mybank.com");
    }
}
