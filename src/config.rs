//! YAML configuration for the analyzer: scorer endpoints, ensemble
//! base weights and heuristic thresholds.
//!
//! Threshold constants are tuning parameters, not business rules; they
//! live here so they can be recalibrated without touching the rule
//! table.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::ensemble::Channel;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scorers: ScorersConfig,
    #[serde(default)]
    pub ensemble: EnsembleConfig,
}

/// Endpoints of the three external classifiers. Any of them may be
/// absent; a missing scorer degrades its channel instead of blocking
/// startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScorersConfig {
    pub text_endpoint: Option<String>,
    pub url_endpoint: Option<String>,
    pub html_endpoint: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleConfig {
    #[serde(default)]
    pub base_weights: BaseWeights,
    #[serde(default)]
    pub thresholds: HeuristicThresholds,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            base_weights: BaseWeights::default(),
            thresholds: HeuristicThresholds::default(),
        }
    }
}

/// Fixed channel priors, applied before any heuristic adjustment.
/// Must sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseWeights {
    pub text: f64,
    pub url: f64,
    pub html: f64,
}

impl Default for BaseWeights {
    fn default() -> Self {
        Self {
            text: 0.50,
            url: 0.30,
            html: 0.20,
        }
    }
}

impl BaseWeights {
    pub fn weight_for(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Text => self.text,
            Channel::Url => self.url,
            Channel::Html => self.html,
        }
    }

    pub fn sum(&self) -> f64 {
        self.text + self.url + self.html
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicThresholds {
    /// Below this a channel's risk counts as calm.
    pub low_risk: f64,
    /// Suspicion threshold; also gates the major spoof penalty.
    pub moderate_risk: f64,
    /// Above this a channel's risk counts as alarming.
    pub high_risk: f64,
    /// URL volume at which a message looks like a bulk template.
    pub bulk_url_count: usize,
    /// Element volume at which markup looks like a bulk template.
    pub bulk_tag_count: usize,
    /// Unique registrable domains typical of aggregator digests.
    pub many_domains: usize,
    /// Word count of long-form legal/policy copy.
    pub long_form_words: usize,
    /// "Few URLs" cutoff used by the long-form rule.
    pub few_urls: usize,
    /// Ceiling applied to URL risk by the aggregator rule.
    pub url_risk_ceiling: f64,
    /// Final-risk cutoff between Legitimate and Phishing.
    pub phishing_verdict: f64,
    /// Fraction of remaining headroom consumed by the major penalty.
    pub spoof_major_push: f64,
    /// Fraction consumed by the minor (benign-redirect) penalty.
    pub spoof_minor_push: f64,
    /// Cumulative text multiplier below which the text channel counts
    /// as heavily damped, demoting the spoof penalty to minor.
    pub heavy_damp_factor: f64,
}

impl Default for HeuristicThresholds {
    fn default() -> Self {
        Self {
            low_risk: 0.30,
            moderate_risk: 0.60,
            high_risk: 0.80,
            bulk_url_count: 8,
            bulk_tag_count: 100,
            many_domains: 5,
            long_form_words: 400,
            few_urls: 2,
            url_risk_ceiling: 0.20,
            phishing_verdict: 0.50,
            spoof_major_push: 0.90,
            spoof_minor_push: 0.15,
            heavy_damp_factor: 0.50,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn generate_default(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let config = Config::default();
        fs::write(path, serde_yaml::to_string(&config)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        let sum = self.ensemble.base_weights.sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(format!("base weights must sum to 1.0, got {sum}").into());
        }
        let t = &self.ensemble.thresholds;
        for (name, value) in [
            ("low_risk", t.low_risk),
            ("moderate_risk", t.moderate_risk),
            ("high_risk", t.high_risk),
            ("url_risk_ceiling", t.url_risk_ceiling),
            ("phishing_verdict", t.phishing_verdict),
            ("spoof_major_push", t.spoof_major_push),
            ("spoof_minor_push", t.spoof_minor_push),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("threshold {name} out of [0,1]: {value}").into());
            }
        }
        if t.low_risk > t.moderate_risk || t.moderate_risk > t.high_risk {
            return Err("risk thresholds must be ordered low <= moderate <= high".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_base_weights_sum_enforced() {
        let mut config = Config::default();
        config.ensemble.base_weights.text = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_ordering_enforced() {
        let mut config = Config::default();
        config.ensemble.thresholds.low_risk = 0.95;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.ensemble.base_weights.url, 0.30);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "scorers:\n  text_endpoint: http://localhost:8000/predict\n";
        let parsed: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(parsed.validate().is_ok());
        assert_eq!(
            parsed.scorers.text_endpoint.as_deref(),
            Some("http://localhost:8000/predict")
        );
        assert_eq!(parsed.ensemble.thresholds.bulk_url_count, 8);
    }
}
