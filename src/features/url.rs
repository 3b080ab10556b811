//! URL feature extraction.
//!
//! Derives a fixed-order 19-key vector from a single URL string. The
//! extractor never fails: a URL that does not parse still produces a
//! schema-complete vector with host features zeroed and path counters
//! at their empty-string values (an empty path still splits to one
//! subdirectory segment).

use crate::entropy::shannon_entropy;
use crate::features::FeatureVector;
use url::Url;

/// Hosting domains of known link-shortening services. Membership is a
/// strong phishing signal in email context since shorteners hide the
/// real destination.
const SHORTENING_SERVICES: &[&str] = &[
    "bit.ly",
    "bit.do",
    "bitly.com",
    "goo.gl",
    "shorte.st",
    "go2l.ink",
    "x.co",
    "ow.ly",
    "t.co",
    "tinyurl.com",
    "tinyurl",
    "tr.im",
    "is.gd",
    "cli.gs",
    "yfrog.com",
    "migre.me",
    "ff.im",
    "tiny.cc",
    "url4.eu",
    "twit.ac",
    "su.pr",
    "twurl.nl",
    "snipurl.com",
    "short.to",
    "budurl.com",
    "ping.fm",
    "post.ly",
    "just.as",
    "bkite.com",
    "snipr.com",
    "fic.kr",
    "loopt.us",
    "doiop.com",
    "short.ie",
    "kl.am",
    "wp.me",
    "rubyurl.com",
    "om.ly",
    "to.ly",
    "lnkd.in",
    "db.tt",
    "qr.ae",
    "adf.ly",
    "cur.lv",
    "ity.im",
    "q.gs",
    "po.st",
    "bc.vc",
    "twitthis.com",
    "u.to",
    "j.mp",
    "buzurl.com",
    "cutt.us",
    "u.bb",
    "yourls.org",
    "prettylinkpro.com",
    "scrnch.me",
    "filoops.info",
    "vzturl.com",
    "qr.net",
    "1url.com",
    "tweez.me",
    "v.gd",
    "link.zip.net",
];

pub struct UrlFeatures {
    raw: String,
    host: String,
    path: String,
    query: String,
    explicit_port: bool,
}

impl UrlFeatures {
    pub fn new(url: &str) -> Self {
        match Url::parse(url) {
            Ok(parsed) => {
                let host = parsed.host_str().unwrap_or("").to_string();
                Self {
                    raw: url.to_string(),
                    host,
                    path: parsed.path().to_string(),
                    query: parsed.query().unwrap_or("").to_string(),
                    explicit_port: parsed.port().is_some(),
                }
            }
            Err(_) => Self {
                raw: url.to_string(),
                host: String::new(),
                path: String::new(),
                query: String::new(),
                explicit_port: false,
            },
        }
    }

    fn entropy(&self) -> f64 {
        shannon_entropy(&self.raw.to_lowercase())
    }

    fn host_is_ip(&self) -> bool {
        let octets: Vec<&str> = self.host.split('.').collect();
        octets.len() == 4
            && octets
                .iter()
                .all(|o| !o.is_empty() && o.len() <= 3 && o.chars().all(|c| c.is_ascii_digit()))
    }

    fn digits_num(&self) -> usize {
        self.raw.chars().filter(|c| c.is_ascii_digit()).count()
    }

    fn params_num(&self) -> usize {
        if self.query.is_empty() {
            0
        } else {
            self.query.split('&').count()
        }
    }

    fn subdirectories_num(&self) -> usize {
        self.path.split('/').count()
    }

    fn periods_num(&self) -> usize {
        self.raw.chars().filter(|&c| c == '.').count()
    }

    fn uses_shortening_service(&self) -> bool {
        let lower = self.raw.to_lowercase();
        SHORTENING_SERVICES.iter().any(|s| lower.contains(s))
    }

    /// A second "//" after the scheme separator usually hides a redirect
    /// target, e.g. http://safe.com//http://evil.tld.
    fn has_misplaced_double_slash(&self) -> bool {
        matches!(self.raw.rfind("//"), Some(pos) if pos > 7)
    }

    pub fn extract(&self) -> FeatureVector {
        let lower = self.raw.to_lowercase();
        let mut fv = FeatureVector::with_capacity(19);
        fv.push_flag("use_shortening_service", self.uses_shortening_service());
        fv.push_flag("prefix_suffix_presence", self.host.contains('-'));
        fv.push_flag("has_double_slash", self.has_misplaced_double_slash());
        fv.push_flag("has_at_sign", self.raw.contains('@'));
        fv.push_flag("has_port", self.explicit_port);
        fv.push_flag("has_admin_keyword", lower.contains("admin"));
        fv.push_flag("has_server_keyword", lower.contains("server"));
        fv.push_flag("has_login_keyword", lower.contains("login"));
        fv.push_flag("has_client_keyword", lower.contains("client"));
        fv.push_flag("host_is_ip", self.host_is_ip());
        fv.push_flag("is_encoded", lower.contains('%'));
        fv.push_count("length", self.raw.len());
        fv.push_count("path_length", self.path.len());
        fv.push_count("host_length", self.host.len());
        fv.push("entropy", self.entropy());
        fv.push_count("digits_num", self.digits_num());
        fv.push_count("subdirectories_num", self.subdirectories_num());
        fv.push_count("periods_num", self.periods_num());
        fv.push_count("params_num", self.params_num());
        fv
    }
}

/// Convenience wrapper for one-shot extraction.
pub fn extract(url: &str) -> FeatureVector {
    UrlFeatures::new(url).extract()
}
