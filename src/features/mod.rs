//! Per-channel feature extraction.
//!
//! Each extractor is a pure function from one input (a URL string, an
//! HTML body, plain text, or a header map) to a fixed-order
//! [`FeatureVector`]. The external classifiers consume features
//! positionally, so insertion order is part of the contract: every
//! extractor always emits its full key set in the same order, with
//! zeros for absent data, and never errors on degenerate input.

pub mod header;
pub mod html;
pub mod text;
pub mod url;

use serde::Serialize;

/// An ordered mapping from feature names to numeric values. Booleans
/// are encoded as 0.0/1.0 so the whole vector serializes as one
/// positional row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureVector {
    values: Vec<(&'static str, f64)>,
}

impl FeatureVector {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, name: &'static str, value: f64) {
        self.values.push((name, value));
    }

    pub fn push_flag(&mut self, name: &'static str, value: bool) {
        self.values.push((name, if value { 1.0 } else { 0.0 }));
    }

    pub fn push_count(&mut self, name: &'static str, value: usize) {
        self.values.push((name, value as f64));
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
    }

    /// Feature names in schema order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.iter().map(|(name, _)| *name)
    }

    /// Values in schema order, as consumed positionally by a classifier.
    pub fn as_row(&self) -> Vec<f64> {
        self.values.iter().map(|(_, value)| *value).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
