//! Error taxonomy for message analysis.
//!
//! Only a structurally unparsable message is fatal for a request. A
//! missing scorer excludes its channel, a bad URL is skipped, and an
//! ensemble with zero channels degrades to an "unable to predict"
//! verdict instead of an error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The raw message could not be parsed into a MIME structure.
    /// Distinct from "no body found", which is a successful parse with
    /// empty fields.
    #[error("malformed message: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum ScorerError {
    /// The classifier for this channel was never loaded. The channel is
    /// excluded from ensemble weighting rather than given a default risk.
    #[error("no classifier loaded for the {0} channel")]
    ChannelUnavailable(&'static str),

    #[error("scorer request failed: {0}")]
    Transport(String),

    #[error("scorer returned an unusable response: {0}")]
    BadResponse(String),
}

/// Per-unit extraction failure. One malformed URL does not abort the
/// remaining URLs in the same request.
#[derive(Debug, Error)]
#[error("feature extraction failed for {unit}: {reason}")]
pub struct FeatureExtractionFailure {
    pub unit: String,
    pub reason: String,
}
