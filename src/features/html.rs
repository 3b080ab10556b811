//! HTML feature extraction, tuned for email bodies rather than full web
//! pages. A 22-key vector covering content metrics, markup that should
//! never appear inside an email (scripts, forms, password inputs),
//! filter-evasion artifacts, link anomalies and script indicators.
//!
//! Parsing uses `scraper`, which tolerates the malformed tag soup real
//! phishing mail is made of; extraction never fails.

use crate::entropy::{round3, shannon_entropy};
use crate::features::FeatureVector;
use regex::Regex;
use scraper::{Html, Selector};

/// JavaScript is almost never legitimate in an email; these calls are
/// outright hostile when they appear.
const SUSPICIOUS_FUNCTIONS: &[&str] = &[
    "eval",
    "unescape",
    "document.write",
    "innerhtml",
    "window.open",
    "settimeout",
];

pub struct HtmlFeatures {
    html_lower: String,
    document: Html,
    zero_font_regex: Regex,
    hex_char_regex: Regex,
    base64_image_regex: Regex,
    dom_call_regexes: Vec<Regex>,
}

impl HtmlFeatures {
    pub fn new(html: &str) -> Self {
        Self {
            html_lower: html.to_lowercase(),
            document: Html::parse_document(html),
            zero_font_regex: Regex::new(r"font-size:\s*0\s*(?:px|em|pt|rem)?").unwrap(),
            hex_char_regex: Regex::new(r"%[0-9a-fA-F]{2}").unwrap(),
            base64_image_regex: Regex::new(r"data:image/[a-zA-Z]+;base64,").unwrap(),
            dom_call_regexes: vec![
                Regex::new(r"createelement\s*\(").unwrap(),
                Regex::new(r"appendchild\s*\(").unwrap(),
                Regex::new(r"document\.write\s*\(").unwrap(),
                Regex::new(r"setattribute\s*\(").unwrap(),
            ],
        }
    }

    fn select_count(&self, selector: &str) -> usize {
        match Selector::parse(selector) {
            Ok(sel) => self.document.select(&sel).count(),
            Err(_) => 0,
        }
    }

    fn visible_text(&self) -> String {
        self.document
            .root_element()
            .text()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn script_content(&self) -> String {
        let sel = Selector::parse("script").unwrap();
        self.document
            .select(&sel)
            .flat_map(|e| e.text())
            .collect::<String>()
            .to_lowercase()
    }

    /// Total element count; feeds the ensemble's bulk-template
    /// heuristics, not the classifier schema.
    pub fn tag_count(&self) -> usize {
        self.select_count("*")
    }

    fn has_meta_refresh(&self) -> bool {
        let sel = Selector::parse("meta").unwrap();
        self.document.select(&sel).any(|e| {
            e.value()
                .attr("http-equiv")
                .map(|v| v.eq_ignore_ascii_case("refresh"))
                .unwrap_or(false)
        })
    }

    /// Elements hidden through class names or bare visibility/display
    /// attributes, a word-stuffing trick against naive filters.
    fn hidden_tags_num(&self) -> usize {
        self.select_count(".hidden")
            + self.select_count("#hidden")
            + self.select_count(r#"[visibility="hidden"]"#)
            + self.select_count(r#"[display="none"]"#)
    }

    fn link_text_mismatch_num(&self) -> usize {
        let sel = Selector::parse("a").unwrap();
        self.document
            .select(&sel)
            .filter(|a| {
                let text = a.text().collect::<String>().trim().to_lowercase();
                match a.value().attr("href") {
                    Some(href) if !href.is_empty() && !text.is_empty() => {
                        text.contains('.') && !href.to_lowercase().contains(&text)
                    }
                    _ => false,
                }
            })
            .count()
    }

    pub fn extract(&self) -> FeatureVector {
        let text = self.visible_text();
        let html_len = self.html_lower.len();
        let links = self.select_count("a");
        let images = self.select_count("img");
        let script = self.script_content();

        let mut fv = FeatureVector::with_capacity(22);

        // Content metrics
        fv.push("html_page_entropy", shannon_entropy(&text));
        fv.push_count("html_length", html_len);
        fv.push_count("html_text_length", text.len());
        fv.push(
            "html_text_to_html_ratio",
            if html_len > 0 {
                round3(text.len() as f64 / html_len as f64)
            } else {
                0.0
            },
        );
        fv.push_count("html_words_num", text.split_whitespace().count());

        // Markup that has no business inside an email
        fv.push_count("html_script_tags_num", self.select_count("script"));
        fv.push_count("html_forms_num", self.select_count("form"));
        fv.push_count(
            "html_inputs_num",
            self.select_count("input") + self.select_count("select") + self.select_count("textarea"),
        );
        fv.push_count(
            "html_password_fields_num",
            self.select_count(r#"input[type="password"]"#),
        );
        fv.push_count(
            "html_iframes_num",
            self.select_count("iframe") + self.select_count("frame"),
        );
        fv.push_count(
            "html_objects_embeds_num",
            self.select_count("object") + self.select_count("embed"),
        );
        fv.push_flag("html_has_meta_refresh", self.has_meta_refresh());

        // Evasion tactics
        fv.push_count("html_hidden_tags_num", self.hidden_tags_num());
        fv.push_count(
            "html_zero_font_text_num",
            self.zero_font_regex.find_iter(&self.html_lower).count(),
        );
        fv.push_count(
            "html_hex_encoded_chars",
            self.hex_char_regex.find_iter(&self.html_lower).count(),
        );
        fv.push_count(
            "html_base64_images_num",
            self.base64_image_regex.find_iter(&self.html_lower).count(),
        );

        // Link and image anomalies
        fv.push_count("html_total_links", links);
        fv.push(
            "html_images_to_links_ratio",
            if links > 0 {
                round3(images as f64 / links as f64)
            } else {
                images as f64
            },
        );
        fv.push_count(
            "html_empty_links_num",
            self.select_count(r##"a[href="#"]"##) + self.select_count("a:not([href])"),
        );
        fv.push_count("html_link_text_mismatch_num", self.link_text_mismatch_num());

        // Script indicators
        fv.push_count(
            "html_suspicious_func_num",
            SUSPICIOUS_FUNCTIONS
                .iter()
                .filter(|f| script.contains(*f))
                .count(),
        );
        fv.push_count(
            "html_dom_mod_func_num",
            self.dom_call_regexes
                .iter()
                .map(|r| r.find_iter(&script).count())
                .sum(),
        );

        fv
    }
}

pub fn extract(html: &str) -> FeatureVector {
    HtmlFeatures::new(html).extract()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_complete_on_empty_html() {
        let fv = extract("");
        assert_eq!(fv.len(), 22);
        assert_eq!(fv.get("html_page_entropy"), Some(0.0));
        assert_eq!(fv.get("html_total_links"), Some(0.0));
        assert_eq!(fv.get("html_has_meta_refresh"), Some(0.0));
    }

    #[test]
    fn test_script_and_form_counts() {
        let html = r#"<html><body>
            <script>eval(x); document.write('y');</script>
            <form><input type="text"/><input type="password"/></form>
        </body></html>"#;
        let fv = extract(html);
        assert_eq!(fv.get("html_script_tags_num"), Some(1.0));
        assert_eq!(fv.get("html_forms_num"), Some(1.0));
        assert_eq!(fv.get("html_inputs_num"), Some(2.0));
        assert_eq!(fv.get("html_password_fields_num"), Some(1.0));
        // eval + document.write present
        assert_eq!(fv.get("html_suspicious_func_num"), Some(2.0));
        assert_eq!(fv.get("html_dom_mod_func_num"), Some(1.0));
    }

    #[test]
    fn test_meta_refresh_detected() {
        let html = r#"<meta http-equiv="REFRESH" content="0; url=http://evil.tld">"#;
        assert_eq!(extract(html).get("html_has_meta_refresh"), Some(1.0));
    }

    #[test]
    fn test_link_text_mismatch() {
        let html = r#"<a href="http://evil.tld/x">mybank.com</a>
                      <a href="https://mybank.com/login">mybank.com</a>"#;
        let fv = extract(html);
        assert_eq!(fv.get("html_link_text_mismatch_num"), Some(1.0));
        assert_eq!(fv.get("html_total_links"), Some(2.0));
    }

    #[test]
    fn test_empty_links_counted() {
        let html = r##"<a href="#">click</a><a>nowhere</a><a href="https://x.com/a">ok</a>"##;
        assert_eq!(extract(html).get("html_empty_links_num"), Some(2.0));
    }

    #[test]
    fn test_evasion_artifacts() {
        let html = r#"<div style="font-size: 0px">spam words</div>
                      <img src="data:image/png;base64,AAAA">
                      <a href="http://x.com/%3Cscript%3E">x</a>"#;
        let fv = extract(html);
        assert_eq!(fv.get("html_zero_font_text_num"), Some(1.0));
        assert_eq!(fv.get("html_base64_images_num"), Some(1.0));
        assert_eq!(fv.get("html_hex_encoded_chars"), Some(2.0));
    }

    #[test]
    fn test_hidden_elements() {
        let html = r#"<div class="hidden">a</div><span display="none">b</span>"#;
        assert_eq!(extract(html).get("html_hidden_tags_num"), Some(2.0));
    }

    #[test]
    fn test_image_to_link_ratio_without_links() {
        let html = "<img src=\"a.png\"><img src=\"b.png\">";
        assert_eq!(extract(html).get("html_images_to_links_ratio"), Some(2.0));
    }
}
