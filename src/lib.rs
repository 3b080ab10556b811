pub mod analyzer;
pub mod config;
pub mod decomposer;
pub mod ensemble;
pub mod entropy;
pub mod error;
pub mod features;
pub mod scorer;
pub mod spoof;

pub use analyzer::{AnalysisReport, Analyzer};
pub use config::Config;
pub use decomposer::{EmailDecomposer, ParsedMessage};
pub use ensemble::{Channel, ChannelResult, EnsembleEngine, EnsembleResult, Verdict};
pub use error::{AnalysisError, ScorerError};
pub use scorer::ScorerSet;
