//! Header feature extraction: a 25-key vector over the parsed header
//! fields, covering sender/recipient anomalies, subject heuristics,
//! authentication results (SPF/DKIM/DMARC/ARC) and routing analysis.

use crate::decomposer::HeaderFields;
use crate::entropy::shannon_entropy;
use crate::features::FeatureVector;

const SUSPICIOUS_FROM_KEYWORDS: &[&str] = &[
    "support",
    "noreply",
    "mail",
    "notification",
    "alert",
    "verify",
    "confirm",
    "urgent",
    "action",
];

const URGENCY_KEYWORDS: &[&str] = &[
    "urgent",
    "immediate",
    "verify",
    "confirm",
    "action required",
    "urgent action",
    "act now",
    "limited time",
];

const PHISHING_SUBJECT_KEYWORDS: &[&str] = &[
    "confirm",
    "verify",
    "update",
    "suspended",
    "locked",
    "click",
    "click here",
    "act",
    "reset",
    "validate",
];

/// Brands phishers impersonate in display names while sending from an
/// unrelated domain.
const IMPERSONATED_BRANDS: &[&str] = &[
    "paypal",
    "amazon",
    "apple",
    "microsoft",
    "google",
    "bank",
    "wells fargo",
    "chase",
];

const SUSPICIOUS_MAILERS: &[&str] = &["php", "perl", "python", "java", "vbscript", "unknown"];

pub struct HeaderFeatures<'a> {
    headers: &'a HeaderFields,
}

impl<'a> HeaderFeatures<'a> {
    pub fn new(headers: &'a HeaderFields) -> Self {
        Self { headers }
    }

    fn from_addr(&self) -> String {
        self.headers.get("from").to_lowercase()
    }

    fn to_addr(&self) -> String {
        self.headers.get("to").to_lowercase()
    }

    /// Domain part of an address-bearing header value, tolerating both
    /// bare addresses and `Name <addr>` forms.
    fn domain_of(value: &str) -> &str {
        let value = value.trim_end_matches('>');
        match value.rsplit_once('@') {
            Some((_, domain)) => domain.trim(),
            None => "",
        }
    }

    fn from_to_domain_match(&self) -> bool {
        let from = self.from_addr();
        let to = self.to_addr();
        if from.is_empty() || to.is_empty() {
            return false;
        }
        let from_domain = Self::domain_of(&from);
        let to_domain = Self::domain_of(&to);
        !from_domain.is_empty() && from_domain == to_domain
    }

    fn reply_to_mismatch(&self) -> bool {
        let reply_to = self.headers.get("reply-to").to_lowercase();
        let from = self.from_addr();
        !reply_to.is_empty() && !from.is_empty() && reply_to != from
    }

    fn keyword_count(haystack: &str, keywords: &[&str]) -> usize {
        keywords.iter().filter(|k| haystack.contains(*k)).count()
    }

    fn from_is_ip(&self) -> bool {
        let from = self.from_addr();
        let domain = Self::domain_of(&from);
        let octets: Vec<&str> = domain.split('.').collect();
        octets.len() == 4
            && octets
                .iter()
                .all(|o| o.parse::<u8>().is_ok() && !o.is_empty())
    }

    /// A brand named in the display part whose domain does not carry
    /// that brand is the classic display-name impersonation.
    fn display_name_mismatch(&self) -> bool {
        let from = self.from_addr();
        let (display, addr) = match (from.find('<'), from.find('>')) {
            (Some(lt), Some(gt)) if lt < gt => (&from[..lt], &from[lt + 1..gt]),
            _ => return false,
        };
        let domain = Self::domain_of(addr);
        IMPERSONATED_BRANDS
            .iter()
            .any(|brand| display.contains(brand) && !domain.contains(brand))
    }

    fn return_path_mismatch(&self) -> bool {
        let return_path = self.headers.get("return-path").to_lowercase();
        let from = self.from_addr();
        if return_path.is_empty() || from.is_empty() {
            return false;
        }
        let rp_domain = Self::domain_of(&return_path);
        let from_domain = Self::domain_of(&from);
        rp_domain != from_domain
    }

    fn delivered_to_mismatch(&self) -> bool {
        let delivered = self.headers.get("delivered-to").to_lowercase();
        let to = self.to_addr();
        !delivered.is_empty() && !to.is_empty() && delivered != to
    }

    /// SPF tri-state over the combined authentication headers:
    /// +1 pass, -1 fail, 0 absent or neutral. Any `fail` token counts,
    /// so softfail lands at -1 too.
    fn spf_verification(&self) -> f64 {
        let combined = format!(
            "{} {}",
            self.headers.get("received-spf"),
            self.headers.get("authentication-results")
        )
        .to_lowercase();
        if combined.contains("spf=pass") || combined.trim_start().starts_with("pass") {
            1.0
        } else if combined.contains("fail") {
            -1.0
        } else {
            0.0
        }
    }

    fn dmarc_verification(&self) -> f64 {
        let combined = format!(
            "{} {}",
            self.headers.get("authentication-results"),
            self.headers.get("arc-authentication-results")
        )
        .to_lowercase();
        if combined.contains("dmarc=pass") {
            1.0
        } else if combined.contains("dmarc=fail") {
            -1.0
        } else {
            0.0
        }
    }

    fn suspicious_received_chain(&self) -> usize {
        self.headers
            .received()
            .iter()
            .filter(|header| {
                let lower = header.to_lowercase();
                lower.contains("unknown")
                    || lower.contains("[127.0.0.1]")
                    || lower.contains("[0.0.0.0]")
            })
            .count()
    }

    fn arc_headers_count(&self) -> usize {
        ["arc-seal", "arc-message-signature", "arc-authentication-results"]
            .iter()
            .filter(|name| !self.headers.get(name).is_empty())
            .count()
    }

    fn forwarding_indicators(&self) -> usize {
        ["x-forwarded-for", "x-forwarded-encrypted"]
            .iter()
            .filter(|name| !self.headers.get(name).is_empty())
            .count()
    }

    fn suspicious_mailer(&self) -> bool {
        let mailer = self.headers.get("x-mailer").to_lowercase();
        !mailer.is_empty() && SUSPICIOUS_MAILERS.iter().any(|m| mailer.contains(m))
    }

    pub fn extract(&self) -> FeatureVector {
        let from = self.from_addr();
        let to = self.to_addr();
        let subject = self.headers.get("subject").to_lowercase();

        let mut fv = FeatureVector::with_capacity(25);

        // Sender/recipient shape
        fv.push_flag("has_from_address", !from.is_empty());
        fv.push_flag("has_to_address", !to.is_empty());
        fv.push_flag("from_to_domain_match", self.from_to_domain_match());
        fv.push_flag("reply_to_mismatch", self.reply_to_mismatch());
        fv.push_flag(
            "from_contains_suspicious",
            Self::keyword_count(&from, SUSPICIOUS_FROM_KEYWORDS) > 0,
        );
        fv.push_count(
            "subject_urgency_count",
            Self::keyword_count(&subject, URGENCY_KEYWORDS),
        );
        fv.push_count(
            "subject_phishing_keywords",
            Self::keyword_count(&subject, PHISHING_SUBJECT_KEYWORDS),
        );
        fv.push_flag(
            "cc_bcc_empty",
            self.headers.get("cc").is_empty() && self.headers.get("bcc").is_empty(),
        );
        fv.push_flag("to_multiple_recipients", to.contains(','));
        fv.push_count("subject_length", subject.len());
        fv.push("subject_entropy", shannon_entropy(&subject));
        fv.push_flag("from_is_ip", self.from_is_ip());
        fv.push_flag("display_name_mismatch", self.display_name_mismatch());

        // Authentication and routing
        fv.push_flag("return_path_mismatch", self.return_path_mismatch());
        fv.push_flag("delivered_to_mismatch", self.delivered_to_mismatch());
        fv.push_flag(
            "dkim_signature_present",
            !self.headers.get("dkim-signature").is_empty(),
        );
        fv.push("spf_verification", self.spf_verification());
        fv.push("dmarc_verification", self.dmarc_verification());
        fv.push_count("multiple_received_headers", self.headers.received().len());
        fv.push_count("suspicious_received_chain", self.suspicious_received_chain());
        fv.push_flag(
            "has_x_originating_ip",
            !self.headers.get("x-originating-ip").is_empty(),
        );
        fv.push_count("arc_headers_count", self.arc_headers_count());
        fv.push_count("forwarding_indicators", self.forwarding_indicators());
        fv.push_flag("missing_message_id", self.headers.get("message-id").is_empty());
        fv.push_flag("suspicious_mailer", self.suspicious_mailer());

        fv
    }
}

pub fn extract(headers: &HeaderFields) -> FeatureVector {
    HeaderFeatures::new(headers).extract()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposer::EmailDecomposer;

    fn parse(raw: &str) -> HeaderFields {
        EmailDecomposer::new().decompose(raw).unwrap().headers
    }

    #[test]
    fn test_schema_complete_on_bare_message() {
        let headers = parse("X-Nothing: here\r\n\r\nbody\r\n");
        let fv = extract(&headers);
        assert_eq!(fv.len(), 25);
        assert_eq!(fv.get("has_from_address"), Some(0.0));
        assert_eq!(fv.get("missing_message_id"), Some(1.0));
        assert_eq!(fv.get("subject_entropy"), Some(0.0));
    }

    #[test]
    fn test_display_name_brand_mismatch() {
        let headers = parse(
            "From: PayPal Support <security@evil-domain.tld>\r\nTo: victim@example.com\r\n\r\n.",
        );
        let fv = extract(&headers);
        assert_eq!(fv.get("display_name_mismatch"), Some(1.0));
        assert_eq!(fv.get("from_contains_suspicious"), Some(1.0));

        let ok = parse("From: PayPal <service@paypal.com>\r\n\r\n.");
        assert_eq!(extract(&ok).get("display_name_mismatch"), Some(0.0));
    }

    #[test]
    fn test_spf_and_dmarc_tristate() {
        let pass = parse(
            "From: a@b.c\r\nAuthentication-Results: mx; spf=pass; dmarc=pass\r\n\r\n.",
        );
        let fv = extract(&pass);
        assert_eq!(fv.get("spf_verification"), Some(1.0));
        assert_eq!(fv.get("dmarc_verification"), Some(1.0));

        let fail = parse("From: a@b.c\r\nReceived-SPF: spf=fail\r\n\r\n.");
        assert_eq!(extract(&fail).get("spf_verification"), Some(-1.0));

        let softfail = parse(
            "From: a@b.c\r\nAuthentication-Results: mx; spf=softfail\r\n\r\n.",
        );
        assert_eq!(extract(&softfail).get("spf_verification"), Some(-1.0));

        let neutral = parse("From: a@b.c\r\n\r\n.");
        let fv = extract(&neutral);
        assert_eq!(fv.get("spf_verification"), Some(0.0));
        assert_eq!(fv.get("dmarc_verification"), Some(0.0));
    }

    #[test]
    fn test_received_chain_analysis() {
        let headers = parse(
            "From: a@b.c\r\n\
             Received: from unknown [127.0.0.1]\r\n\
             Received: from mx.example.com\r\n\
             Received: by unknown host\r\n\r\n.",
        );
        let fv = extract(&headers);
        assert_eq!(fv.get("multiple_received_headers"), Some(3.0));
        assert_eq!(fv.get("suspicious_received_chain"), Some(2.0));
    }

    #[test]
    fn test_reply_to_and_return_path_mismatch() {
        let headers = parse(
            "From: billing@company.com\r\n\
             Reply-To: attacker@elsewhere.net\r\n\
             Return-Path: <bounce@elsewhere.net>\r\n\r\n.",
        );
        let fv = extract(&headers);
        assert_eq!(fv.get("reply_to_mismatch"), Some(1.0));
        assert_eq!(fv.get("return_path_mismatch"), Some(1.0));
    }

    #[test]
    fn test_from_is_ip_literal() {
        let headers = parse("From: admin@192.168.1.10\r\n\r\n.");
        assert_eq!(extract(&headers).get("from_is_ip"), Some(1.0));
    }

    #[test]
    fn test_arc_and_forwarding_counts() {
        let headers = parse(
            "From: a@b.c\r\n\
             ARC-Seal: i=1; a=rsa-sha256\r\n\
             ARC-Message-Signature: i=1\r\n\
             ARC-Authentication-Results: i=1; mx\r\n\
             X-Forwarded-For: a@b.c\r\n\r\n.",
        );
        let fv = extract(&headers);
        assert_eq!(fv.get("arc_headers_count"), Some(3.0));
        assert_eq!(fv.get("forwarding_indicators"), Some(1.0));
    }

    #[test]
    fn test_suspicious_mailer() {
        let headers = parse("From: a@b.c\r\nX-Mailer: PHPMailer 6.0\r\n\r\n.");
        assert_eq!(extract(&headers).get("suspicious_mailer"), Some(1.0));
        let ok = parse("From: a@b.c\r\nX-Mailer: Apple Mail (2.3654)\r\n\r\n.");
        assert_eq!(extract(&ok).get("suspicious_mailer"), Some(0.0));
    }
}
