//! Ensemble risk engine: combines the three per-channel risk signals
//! into one verdict.
//!
//! A rule-based expert system layered on top of the statistical
//! scorers, not a learned ensemble. Fixed base weights are adjusted by
//! an ordered table of heuristic rules evaluated against the original
//! risk values, renormalized, combined, and finally subjected to a
//! bounded non-linear spoof penalty. Every rule that fires is recorded
//! so any score can be reproduced and audited.

use crate::config::{EnsembleConfig, HeuristicThresholds};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Channel {
    Text,
    Url,
    Html,
}

impl Channel {
    pub fn name(&self) -> &'static str {
        match self {
            Channel::Text => "text",
            Channel::Url => "url",
            Channel::Html => "html",
        }
    }
}

/// Channel context consumed only by the heuristics, never by the
/// classifiers.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ChannelMetadata {
    pub word_count: Option<usize>,
    pub urls_analyzed: Option<usize>,
    pub unique_domains: Option<usize>,
    pub tag_count: Option<usize>,
    /// Set when the message carries exactly one URL and its path looks
    /// like an enterprise API or unsubscribe endpoint.
    pub sole_url_service_path: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelResult {
    pub channel: Channel,
    pub risk: f64,
    pub confidence: f64,
    pub metadata: ChannelMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Phishing,
    Legitimate,
    /// Zero channels produced a usable risk value.
    Unavailable,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Phishing => "Phishing",
            Verdict::Legitimate => "Legitimate",
            Verdict::Unavailable => "Unable to predict",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnsembleResult {
    pub final_risk: f64,
    pub verdict: Verdict,
    /// `final_risk` for a phishing verdict, `1 - final_risk` otherwise.
    pub confidence: f64,
    pub per_channel_risk: BTreeMap<&'static str, f64>,
    /// Ordered audit trail of every rule and penalty branch that fired.
    pub applied_heuristics: Vec<String>,
}

/// The inputs a rule condition may look at: the original (pre-clamp)
/// risk values plus the contextual metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleContext {
    pub text_risk: Option<f64>,
    pub url_risk: Option<f64>,
    pub html_risk: Option<f64>,
    pub url_count: usize,
    pub unique_domains: usize,
    pub word_count: usize,
    pub tag_count: usize,
    pub sole_url_service_path: bool,
}

impl RuleContext {
    fn from_channels(channels: &[ChannelResult]) -> Self {
        let mut ctx = RuleContext::default();
        for result in channels {
            match result.channel {
                Channel::Text => {
                    ctx.text_risk = Some(result.risk);
                    ctx.word_count = result.metadata.word_count.unwrap_or(0);
                }
                Channel::Url => {
                    ctx.url_risk = Some(result.risk);
                    ctx.url_count = result.metadata.urls_analyzed.unwrap_or(0);
                    ctx.unique_domains = result.metadata.unique_domains.unwrap_or(0);
                    ctx.sole_url_service_path =
                        result.metadata.sole_url_service_path.unwrap_or(false);
                }
                Channel::Html => {
                    ctx.html_risk = Some(result.risk);
                    ctx.tag_count = result.metadata.tag_count.unwrap_or(0);
                }
            }
        }
        ctx
    }
}

/// What a fired rule does to the running state: multiply channel
/// weights, optionally clamp the URL risk to a ceiling, optionally
/// exempt the message from the spoof penalty.
#[derive(Debug, Clone)]
pub struct RuleEffects {
    pub multipliers: Vec<(Channel, f64)>,
    /// Clamp the URL channel's risk to the configured ceiling.
    pub clamp_url_risk: bool,
    pub exempt_spoof_penalty: bool,
}

pub struct HeuristicRule {
    pub name: &'static str,
    pub condition: fn(&RuleContext, &HeuristicThresholds) -> bool,
    pub effects: RuleEffects,
}

fn cond_tracking_pixel(ctx: &RuleContext, t: &HeuristicThresholds) -> bool {
    // Low-risk copy with one alarming URL is usually a tracking pixel
    // or redirect wrapper, not a phish.
    matches!((ctx.text_risk, ctx.url_risk),
        (Some(text), Some(url)) if text < t.low_risk && url > t.high_risk)
}

fn cond_false_text_alarm(ctx: &RuleContext, t: &HeuristicThresholds) -> bool {
    // Financial/marketing copy trips the text model while the URLs and
    // markup look clean.
    matches!((ctx.text_risk, ctx.url_risk, ctx.html_risk),
        (Some(text), Some(url), Some(html))
            if url < t.low_risk && html < t.moderate_risk && text > t.high_risk)
}

fn cond_bulk_marketing(ctx: &RuleContext, t: &HeuristicThresholds) -> bool {
    matches!(ctx.url_risk,
        Some(url) if url < t.low_risk
            && ctx.url_count >= t.bulk_url_count
            && ctx.tag_count >= t.bulk_tag_count)
}

fn cond_long_form_copy(ctx: &RuleContext, t: &HeuristicThresholds) -> bool {
    matches!(ctx.text_risk,
        Some(text) if text > t.high_risk
            && ctx.word_count >= t.long_form_words
            && ctx.url_count <= t.few_urls)
}

fn cond_enterprise_service_link(ctx: &RuleContext, t: &HeuristicThresholds) -> bool {
    matches!(ctx.html_risk,
        Some(html) if html < t.low_risk
            && ctx.url_count == 1
            && ctx.sole_url_service_path)
}

fn cond_aggregator_digest(ctx: &RuleContext, t: &HeuristicThresholds) -> bool {
    // Social/newsletter digests link out to many unrelated domains
    // inside a large template; their redirect URLs also trip the spoof
    // detector, hence the exemption.
    ctx.url_count >= t.bulk_url_count
        && ctx.unique_domains >= t.many_domains
        && ctx.tag_count >= t.bulk_tag_count
}

/// The canonical rule table, evaluated in order against the original
/// risk values. Thresholds come from configuration; the multipliers
/// here define each rule's shape.
pub fn canonical_rules() -> Vec<HeuristicRule> {
    vec![
        HeuristicRule {
            name: "tracking_pixel_url_damp",
            condition: cond_tracking_pixel,
            effects: RuleEffects {
                multipliers: vec![(Channel::Url, 0.5)],
                clamp_url_risk: false,
                exempt_spoof_penalty: false,
            },
        },
        HeuristicRule {
            name: "false_text_alarm_rebalance",
            condition: cond_false_text_alarm,
            effects: RuleEffects {
                multipliers: vec![(Channel::Text, 0.2), (Channel::Url, 1.5)],
                clamp_url_risk: false,
                exempt_spoof_penalty: false,
            },
        },
        HeuristicRule {
            name: "bulk_marketing_template",
            condition: cond_bulk_marketing,
            effects: RuleEffects {
                multipliers: vec![(Channel::Html, 0.5), (Channel::Text, 0.5)],
                clamp_url_risk: false,
                exempt_spoof_penalty: false,
            },
        },
        HeuristicRule {
            name: "long_form_copy_damp",
            condition: cond_long_form_copy,
            effects: RuleEffects {
                multipliers: vec![(Channel::Text, 0.6)],
                clamp_url_risk: false,
                exempt_spoof_penalty: false,
            },
        },
        HeuristicRule {
            name: "enterprise_service_link",
            condition: cond_enterprise_service_link,
            effects: RuleEffects {
                multipliers: vec![(Channel::Url, 0.5), (Channel::Text, 0.7)],
                clamp_url_risk: false,
                exempt_spoof_penalty: false,
            },
        },
        HeuristicRule {
            name: "social_aggregator_digest",
            condition: cond_aggregator_digest,
            effects: RuleEffects {
                multipliers: vec![(Channel::Text, 0.2), (Channel::Html, 0.2)],
                clamp_url_risk: true,
                exempt_spoof_penalty: true,
            },
        },
    ]
}

pub struct EnsembleEngine {
    config: EnsembleConfig,
    rules: Vec<HeuristicRule>,
}

impl EnsembleEngine {
    pub fn new(config: EnsembleConfig) -> Self {
        Self {
            config,
            rules: canonical_rules(),
        }
    }

    /// Combine per-channel results and the spoof flag into the final
    /// verdict. Absent channels contribute zero weight, not a default
    /// risk; zero present channels degrade to `Unavailable`.
    pub fn combine(&self, channels: &[ChannelResult], is_spoofed: bool) -> EnsembleResult {
        let thresholds = &self.config.thresholds;
        let mut applied = Vec::new();

        let per_channel_risk: BTreeMap<&'static str, f64> = channels
            .iter()
            .map(|c| (c.channel.name(), c.risk))
            .collect();

        if channels.is_empty() {
            return EnsembleResult {
                final_risk: 0.0,
                verdict: Verdict::Unavailable,
                confidence: 0.0,
                per_channel_risk,
                applied_heuristics: vec!["no_channels_available".to_string()],
            };
        }

        // Rules read the original risks; effects accumulate separately.
        let ctx = RuleContext::from_channels(channels);
        let mut multipliers: BTreeMap<&'static str, f64> = BTreeMap::new();
        let mut url_risk_ceiling: Option<f64> = None;
        let mut spoof_exempt = false;

        for rule in &self.rules {
            if !(rule.condition)(&ctx, thresholds) {
                continue;
            }
            applied.push(rule.name.to_string());
            for (channel, factor) in &rule.effects.multipliers {
                let entry = multipliers.entry(channel.name()).or_insert(1.0);
                *entry *= factor;
            }
            if rule.effects.clamp_url_risk {
                url_risk_ceiling = Some(thresholds.url_risk_ceiling);
            }
            spoof_exempt |= rule.effects.exempt_spoof_penalty;
        }

        // Adjusted weights over present channels, renormalized to 1.
        let mut weighted = Vec::with_capacity(channels.len());
        for result in channels {
            let base = self.config.base_weights.weight_for(result.channel);
            let factor = multipliers.get(result.channel.name()).copied().unwrap_or(1.0);
            let risk = match (result.channel, url_risk_ceiling) {
                (Channel::Url, Some(ceiling)) => result.risk.min(ceiling),
                _ => result.risk,
            };
            weighted.push((result.channel, risk, base * factor));
        }
        let weight_sum: f64 = weighted.iter().map(|(_, _, w)| w).sum();

        let mut final_risk = if weight_sum > f64::EPSILON {
            weighted
                .iter()
                .map(|(_, risk, weight)| risk * weight / weight_sum)
                .sum()
        } else {
            // Every weight was damped to nothing; fall back to a plain
            // average so the result stays defined.
            weighted.iter().map(|(_, risk, _)| risk).sum::<f64>() / weighted.len() as f64
        };

        // Post-combination spoof penalty: one-time, non-linear, bounded
        // by the remaining headroom.
        if is_spoofed && !spoof_exempt {
            let text_factor = multipliers.get(Channel::Text.name()).copied().unwrap_or(1.0);
            let text_heavily_damped = text_factor < thresholds.heavy_damp_factor;
            let text_suspicious = ctx
                .text_risk
                .map(|risk| risk > thresholds.moderate_risk)
                .unwrap_or(false);
            let push = if text_suspicious && !text_heavily_damped {
                applied.push("spoof_penalty_major".to_string());
                thresholds.spoof_major_push
            } else {
                applied.push("spoof_penalty_minor".to_string());
                thresholds.spoof_minor_push
            };
            final_risk += (1.0 - final_risk) * push;
        } else if is_spoofed {
            applied.push("spoof_penalty_exempt".to_string());
        }

        let final_risk = final_risk.clamp(0.0, 1.0);
        let verdict = if final_risk >= thresholds.phishing_verdict {
            Verdict::Phishing
        } else {
            Verdict::Legitimate
        };
        let confidence = match verdict {
            Verdict::Phishing => final_risk,
            _ => 1.0 - final_risk,
        };

        EnsembleResult {
            final_risk,
            verdict,
            confidence,
            per_channel_risk,
            applied_heuristics: applied,
        }
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }
}
