//! External scorer adapters.
//!
//! The three classifiers are opaque: a transformer text model and two
//! tabular models, each behind a uniform predict contract that returns
//! a binary label and a probability. The engine derives
//! `risk = probability` when the label is phishing and `1 - probability`
//! otherwise. Scorers are loaded once at startup and injected into the
//! analyzer; one failing to load degrades its channel rather than
//! blocking the process.

use crate::config::ScorersConfig;
use crate::error::ScorerError;
use crate::features::FeatureVector;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Prediction {
    /// 1 = phishing, 0 = legitimate.
    pub label: u8,
    pub probability: f64,
}

impl Prediction {
    /// Probability mass assigned to the phishing class.
    pub fn risk(&self) -> f64 {
        if self.label == 1 {
            self.probability
        } else {
            1.0 - self.probability
        }
    }
}

pub trait TextScorer: Send + Sync {
    fn predict(&self, text: &str) -> Result<Prediction, ScorerError>;
    fn model_name(&self) -> &str;
}

pub trait TabularScorer: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, ScorerError>;
    fn model_name(&self) -> &str;
}

/// The process-wide, read-only set of loaded classifiers. Absent
/// entries turn into per-channel errors at scoring time.
#[derive(Default)]
pub struct ScorerSet {
    pub text: Option<Box<dyn TextScorer>>,
    pub url: Option<Box<dyn TabularScorer>>,
    pub html: Option<Box<dyn TabularScorer>>,
}

impl ScorerSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build HTTP adapters for every configured endpoint. A missing
    /// endpoint leaves the channel unloaded; the service still starts.
    pub fn from_config(config: &ScorersConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_seconds.unwrap_or(30));
        let mut set = Self::empty();

        if let Some(endpoint) = &config.text_endpoint {
            match HttpTextScorer::new(endpoint, timeout) {
                Ok(scorer) => set.text = Some(Box::new(scorer)),
                Err(e) => log::warn!("text scorer unavailable: {e}"),
            }
        }
        if let Some(endpoint) = &config.url_endpoint {
            match HttpTabularScorer::new("url-classifier", endpoint, timeout) {
                Ok(scorer) => set.url = Some(Box::new(scorer)),
                Err(e) => log::warn!("url scorer unavailable: {e}"),
            }
        }
        if let Some(endpoint) = &config.html_endpoint {
            match HttpTabularScorer::new("html-classifier", endpoint, timeout) {
                Ok(scorer) => set.html = Some(Box::new(scorer)),
                Err(e) => log::warn!("html scorer unavailable: {e}"),
            }
        }

        set
    }
}

/// Adapter for the transformer text classifier service, which takes
/// raw text and answers with a class name and a confidence.
pub struct HttpTextScorer {
    endpoint: String,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct TextScorerResponse {
    prediction: String,
    confidence: f64,
}

impl HttpTextScorer {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ScorerError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScorerError::Transport(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
        })
    }
}

impl TextScorer for HttpTextScorer {
    fn predict(&self, text: &str) -> Result<Prediction, ScorerError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .map_err(|e| ScorerError::Transport(e.to_string()))?;
        let body: TextScorerResponse = response
            .json()
            .map_err(|e| ScorerError::BadResponse(e.to_string()))?;

        let label = if body.prediction.eq_ignore_ascii_case("phishing") {
            1
        } else {
            0
        };
        if !(0.0..=1.0).contains(&body.confidence) {
            return Err(ScorerError::BadResponse(format!(
                "confidence out of range: {}",
                body.confidence
            )));
        }
        Ok(Prediction {
            label,
            probability: body.confidence,
        })
    }

    fn model_name(&self) -> &str {
        "text-classifier"
    }
}

/// Adapter for a tabular classifier service consuming the feature
/// vector as a positional row.
pub struct HttpTabularScorer {
    name: String,
    endpoint: String,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct TabularScorerResponse {
    label: u8,
    probability: f64,
}

impl HttpTabularScorer {
    pub fn new(name: &str, endpoint: &str, timeout: Duration) -> Result<Self, ScorerError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScorerError::Transport(e.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            client,
        })
    }
}

impl TabularScorer for HttpTabularScorer {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, ScorerError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "features": features.as_row() }))
            .send()
            .map_err(|e| ScorerError::Transport(e.to_string()))?;
        let body: TabularScorerResponse = response
            .json()
            .map_err(|e| ScorerError::BadResponse(e.to_string()))?;

        if body.label > 1 || !(0.0..=1.0).contains(&body.probability) {
            return Err(ScorerError::BadResponse(format!(
                "label={} probability={}",
                body.label, body.probability
            )));
        }
        Ok(Prediction {
            label: body.label,
            probability: body.probability,
        })
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
pub mod testing {
    //! Deterministic in-memory scorers for engine and analyzer tests.

    use super::*;

    pub struct FixedTextScorer(pub Prediction);

    impl TextScorer for FixedTextScorer {
        fn predict(&self, _text: &str) -> Result<Prediction, ScorerError> {
            Ok(self.0)
        }
        fn model_name(&self) -> &str {
            "fixed-text"
        }
    }

    pub struct FixedTabularScorer(pub Prediction);

    impl TabularScorer for FixedTabularScorer {
        fn predict(&self, _features: &FeatureVector) -> Result<Prediction, ScorerError> {
            Ok(self.0)
        }
        fn model_name(&self) -> &str {
            "fixed-tabular"
        }
    }

    pub struct FailingTabularScorer;

    impl TabularScorer for FailingTabularScorer {
        fn predict(&self, _features: &FeatureVector) -> Result<Prediction, ScorerError> {
            Err(ScorerError::Transport("connection refused".to_string()))
        }
        fn model_name(&self) -> &str {
            "failing-tabular"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_follows_label() {
        let phishing = Prediction {
            label: 1,
            probability: 0.97,
        };
        assert!((phishing.risk() - 0.97).abs() < 1e-9);

        let legitimate = Prediction {
            label: 0,
            probability: 0.97,
        };
        assert!((legitimate.risk() - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_empty_set_has_no_channels() {
        let set = ScorerSet::empty();
        assert!(set.text.is_none());
        assert!(set.url.is_none());
        assert!(set.html.is_none());
    }

    #[test]
    fn test_from_config_without_endpoints_degrades() {
        let set = ScorerSet::from_config(&crate::config::ScorersConfig::default());
        assert!(set.text.is_none() && set.url.is_none() && set.html.is_none());
    }
}
