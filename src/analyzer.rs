//! Per-message orchestration: decompose, extract features per channel,
//! score through the external classifiers, and combine in the ensemble
//! engine. Everything here is per-request state; the only shared
//! resource is the injected read-only scorer set.

use crate::config::Config;
use crate::decomposer::EmailDecomposer;
use crate::ensemble::{
    Channel, ChannelMetadata, ChannelResult, EnsembleEngine, EnsembleResult,
};
use crate::error::{AnalysisError, FeatureExtractionFailure};
use crate::features::{header, html::HtmlFeatures, text, url};
use crate::scorer::ScorerSet;
use crate::spoof::registrable_domain;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;

/// Per-channel slice of the response: either a prediction or an
/// explicit error, never a defaulted risk.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelReport {
    pub channel: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<f64>,
    pub metadata: ChannelMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CombinedAnalysis {
    pub total_score: f64,
    pub final_prediction: &'static str,
    pub confidence: f64,
    /// The branch that produced the verdict: a spoof-penalty gate or
    /// the plain weighted threshold.
    pub active_gate: &'static str,
    pub raw_risk_data: std::collections::BTreeMap<&'static str, f64>,
    pub applied_heuristics: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub is_spoofed: bool,
    pub channels: Vec<ChannelReport>,
    /// Header-level signals (authentication results, routing, subject
    /// heuristics), reported for auditability alongside the verdict.
    pub header_features: crate::features::FeatureVector,
    pub combined: CombinedAnalysis,
}

pub struct Analyzer {
    decomposer: EmailDecomposer,
    scorers: ScorerSet,
    ensemble: EnsembleEngine,
    service_path_regex: Regex,
}

impl Analyzer {
    pub fn new(scorers: ScorerSet, config: &Config) -> Self {
        Self {
            decomposer: EmailDecomposer::new(),
            scorers,
            ensemble: EnsembleEngine::new(config.ensemble.clone()),
            service_path_regex: Regex::new(
                r"(?i)/(api|unsubscribe|opt[-_]?out|preferences|email[-_]?settings)(/|$|\?)",
            )
            .unwrap(),
        }
    }

    /// Analyze one raw message. Only a structurally unparsable message
    /// is an error; every downstream failure degrades to a partial,
    /// explicitly-marked result.
    pub fn analyze(&self, raw: &str) -> Result<AnalysisReport, AnalysisError> {
        let message = self.decomposer.decompose(raw)?;

        // Header signals are reported for auditability; the ensemble
        // consumes only the channel risks and metadata.
        let header_features = header::extract(&message.headers);

        let mut reports = Vec::with_capacity(3);
        let mut channels = Vec::with_capacity(3);

        if let Some((report, result)) = self.score_text(&message.plain_text) {
            reports.push(report);
            if let Some(result) = result {
                channels.push(result);
            }
        }
        if let Some((report, result)) = self.score_urls(&message) {
            reports.push(report);
            if let Some(result) = result {
                channels.push(result);
            }
        }
        if let Some((report, result)) = self.score_html(&message.html_body) {
            reports.push(report);
            if let Some(result) = result {
                channels.push(result);
            }
        }

        let ensemble = self.ensemble.combine(&channels, message.is_spoofed);
        Ok(build_report(
            message.is_spoofed,
            reports,
            header_features,
            ensemble,
        ))
    }

    fn score_text(
        &self,
        plain_text: &str,
    ) -> Option<(ChannelReport, Option<ChannelResult>)> {
        if plain_text.trim().is_empty() {
            return None;
        }
        let features = text::extract(plain_text);
        let metadata = ChannelMetadata {
            word_count: features.get("words_num").map(|w| w as usize),
            ..Default::default()
        };

        let scorer = match &self.scorers.text {
            Some(scorer) => scorer,
            None => return Some((error_report(Channel::Text, metadata, "no classifier loaded"), None)),
        };
        match scorer.predict(plain_text) {
            Ok(prediction) => {
                let result = ChannelResult {
                    channel: Channel::Text,
                    risk: prediction.risk(),
                    confidence: prediction.probability,
                    metadata,
                };
                Some((
                    prediction_report(scorer.model_name(), &result, prediction.label),
                    Some(result),
                ))
            }
            Err(e) => {
                log::warn!("text scorer failed: {e}");
                Some((error_report(Channel::Text, metadata, &e.to_string()), None))
            }
        }
    }

    fn score_urls(
        &self,
        message: &crate::decomposer::ParsedMessage,
    ) -> Option<(ChannelReport, Option<ChannelResult>)> {
        if message.urls.is_empty() {
            return None;
        }

        let unique_domains = message
            .urls
            .iter()
            .filter_map(|u| registrable_domain(u))
            .collect::<BTreeSet<_>>()
            .len();
        let sole_url_service_path = message.urls.len() == 1
            && message
                .urls
                .iter()
                .next()
                .map(|u| self.service_path_regex.is_match(u))
                .unwrap_or(false);

        let mut metadata = ChannelMetadata {
            urls_analyzed: Some(0),
            unique_domains: Some(unique_domains),
            sole_url_service_path: Some(sole_url_service_path),
            ..Default::default()
        };

        let scorer = match &self.scorers.url {
            Some(scorer) => scorer,
            None => return Some((error_report(Channel::Url, metadata, "no classifier loaded"), None)),
        };

        // Per-URL isolation: a failure skips that URL, siblings proceed.
        let mut scored = 0usize;
        let mut worst: Option<(f64, f64, u8)> = None;
        for url_str in &message.urls {
            let features = url::extract(url_str);
            match scorer.predict(&features) {
                Ok(prediction) => {
                    scored += 1;
                    let risk = prediction.risk();
                    if worst.map(|(r, _, _)| risk > r).unwrap_or(true) {
                        worst = Some((risk, prediction.probability, prediction.label));
                    }
                }
                Err(e) => {
                    log::warn!(
                        "{}",
                        FeatureExtractionFailure {
                            unit: url_str.clone(),
                            reason: e.to_string(),
                        }
                    );
                }
            }
        }
        metadata.urls_analyzed = Some(scored);

        // Every URL failed: ruled "no risk" rather than an error.
        let (risk, confidence, label) = worst.unwrap_or((0.0, 0.0, 0));
        let result = ChannelResult {
            channel: Channel::Url,
            risk,
            confidence,
            metadata,
        };
        Some((
            prediction_report(scorer.model_name(), &result, label),
            Some(result),
        ))
    }

    fn score_html(&self, html_body: &str) -> Option<(ChannelReport, Option<ChannelResult>)> {
        if html_body.trim().is_empty() {
            return None;
        }
        let extractor = HtmlFeatures::new(html_body);
        let features = extractor.extract();
        let metadata = ChannelMetadata {
            tag_count: Some(extractor.tag_count()),
            ..Default::default()
        };

        let scorer = match &self.scorers.html {
            Some(scorer) => scorer,
            None => return Some((error_report(Channel::Html, metadata, "no classifier loaded"), None)),
        };
        match scorer.predict(&features) {
            Ok(prediction) => {
                let result = ChannelResult {
                    channel: Channel::Html,
                    risk: prediction.risk(),
                    confidence: prediction.probability,
                    metadata,
                };
                Some((
                    prediction_report(scorer.model_name(), &result, prediction.label),
                    Some(result),
                ))
            }
            Err(e) => {
                log::warn!("html scorer failed: {e}");
                Some((error_report(Channel::Html, metadata, &e.to_string()), None))
            }
        }
    }
}

fn prediction_report(model: &str, result: &ChannelResult, label: u8) -> ChannelReport {
    ChannelReport {
        channel: result.channel.name(),
        model: Some(model.to_string()),
        prediction: Some(if label == 1 { "Phishing" } else { "Legitimate" }),
        confidence: Some(result.confidence),
        risk: Some(result.risk),
        metadata: result.metadata,
        error: None,
    }
}

fn error_report(channel: Channel, metadata: ChannelMetadata, reason: &str) -> ChannelReport {
    ChannelReport {
        channel: channel.name(),
        model: None,
        prediction: None,
        confidence: None,
        risk: None,
        metadata,
        error: Some(reason.to_string()),
    }
}

fn build_report(
    is_spoofed: bool,
    channels: Vec<ChannelReport>,
    header_features: crate::features::FeatureVector,
    ensemble: EnsembleResult,
) -> AnalysisReport {
    let active_gate = if ensemble
        .applied_heuristics
        .iter()
        .any(|h| h == "spoof_penalty_major")
    {
        "spoof_penalty_major"
    } else if ensemble
        .applied_heuristics
        .iter()
        .any(|h| h == "spoof_penalty_minor")
    {
        "spoof_penalty_minor"
    } else {
        "weighted_threshold"
    };

    AnalysisReport {
        is_spoofed,
        channels,
        header_features,
        combined: CombinedAnalysis {
            total_score: ensemble.final_risk,
            final_prediction: ensemble.verdict.label(),
            confidence: ensemble.confidence,
            active_gate,
            raw_risk_data: ensemble.per_channel_risk,
            applied_heuristics: ensemble.applied_heuristics,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::testing::{FailingTabularScorer, FixedTabularScorer, FixedTextScorer};
    use crate::scorer::Prediction;

    fn phishing(p: f64) -> Prediction {
        Prediction {
            label: 1,
            probability: p,
        }
    }

    fn legitimate(p: f64) -> Prediction {
        Prediction {
            label: 0,
            probability: p,
        }
    }

    fn full_scorer_set(text: Prediction, url: Prediction, html: Prediction) -> ScorerSet {
        ScorerSet {
            text: Some(Box::new(FixedTextScorer(text))),
            url: Some(Box::new(FixedTabularScorer(url))),
            html: Some(Box::new(FixedTabularScorer(html))),
        }
    }

    const SPOOFED_MESSAGE: &str = "From: PayPal <alert@pay-pal-alerts.tld>\r\n\
        To: victim@example.com\r\n\
        Subject: Urgent: verify your account\r\n\
        MIME-Version: 1.0\r\n\
        Content-Type: multipart/alternative; boundary=\"b\"\r\n\
        \r\n\
        --b\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        Your account is suspended. Verify now.\r\n\
        --b\r\n\
        Content-Type: text/html\r\n\
        \r\n\
        <html><body><a href=\"http://evil.tld/x\">mybank.com</a></body></html>\r\n\
        --b--\r\n";

    #[test]
    fn test_spoofed_message_gets_major_penalty() {
        let analyzer = Analyzer::new(
            full_scorer_set(phishing(0.7), phishing(0.4), phishing(0.4)),
            &Config::default(),
        );
        let report = analyzer.analyze(SPOOFED_MESSAGE).unwrap();
        assert!(report.is_spoofed);
        assert_eq!(report.combined.final_prediction, "Phishing");
        assert_eq!(report.combined.active_gate, "spoof_penalty_major");
        assert!(report.combined.total_score > 0.9);
    }

    #[test]
    fn test_all_scorers_unloaded_is_unavailable() {
        let analyzer = Analyzer::new(ScorerSet::empty(), &Config::default());
        let report = analyzer.analyze(SPOOFED_MESSAGE).unwrap();
        assert_eq!(report.combined.final_prediction, "Unable to predict");
        assert_eq!(report.combined.total_score, 0.0);
        // Every channel is explicitly marked errored, none defaulted.
        assert_eq!(report.channels.len(), 3);
        assert!(report.channels.iter().all(|c| c.error.is_some()));
    }

    #[test]
    fn test_url_scorer_failure_degrades_to_no_risk() {
        let scorers = ScorerSet {
            text: Some(Box::new(FixedTextScorer(legitimate(0.9)))),
            url: Some(Box::new(FailingTabularScorer)),
            html: Some(Box::new(FixedTabularScorer(legitimate(0.9)))),
        };
        let analyzer = Analyzer::new(scorers, &Config::default());
        let report = analyzer.analyze(SPOOFED_MESSAGE).unwrap();
        let url_report = report
            .channels
            .iter()
            .find(|c| c.channel == "url")
            .unwrap();
        assert_eq!(url_report.metadata.urls_analyzed, Some(0));
        assert_eq!(url_report.risk, Some(0.0));
    }

    #[test]
    fn test_plain_text_only_message() {
        let analyzer = Analyzer::new(
            full_scorer_set(legitimate(0.8), phishing(0.9), phishing(0.9)),
            &Config::default(),
        );
        let raw = "From: a@b.c\r\nSubject: hi\r\n\r\njust words, no links\r\n";
        let report = analyzer.analyze(raw).unwrap();
        // URL and HTML channels are absent, not errored or defaulted.
        assert_eq!(report.channels.len(), 1);
        assert_eq!(report.combined.final_prediction, "Legitimate");
        assert!((report.combined.total_score - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_unparsable_message_is_error() {
        let analyzer = Analyzer::new(ScorerSet::empty(), &Config::default());
        assert!(analyzer.analyze("").is_err());
    }

    #[test]
    fn test_determinism_byte_identical_reports() {
        let analyzer = Analyzer::new(
            full_scorer_set(phishing(0.61), phishing(0.44), legitimate(0.62)),
            &Config::default(),
        );
        let a = serde_json::to_string(&analyzer.analyze(SPOOFED_MESSAGE).unwrap()).unwrap();
        let b = serde_json::to_string(&analyzer.analyze(SPOOFED_MESSAGE).unwrap()).unwrap();
        assert_eq!(a, b);
    }
}
