//! Drum sticking hypotheses from classified onsets.
//!
//! An [`OnsetSequence`] goes in; a ranked [`HypothesisList`] of L/R/K
//! assignments comes out. Kicks are always K, hands are chosen by a
//! pluggable [`SequenceScorer`] inside a diversity-aware beam search.

pub mod batch;
pub mod beam;
pub mod engine;
pub mod onset;
pub mod patterns;
pub mod ranker;
pub mod rules;
pub mod scorer;
pub mod symbol;
pub mod telemetry;

pub use batch::transcribe_all;
pub use beam::{BeamConfig, BeamSearch, PartialHypothesis, SearchState};
pub use engine::{EngineConfig, ScorerKind, StickingEngine};
pub use onset::{DrumType, OnsetEvent, OnsetSequence};
pub use patterns::{pattern_label, Motif, MotifTracker, PatternTag};
pub use ranker::{Hypothesis, HypothesisList};
pub use rules::{HandBonus, HandPolicy, RuleConfig, RuleContext, RuleEngine, RuleOutcome};
pub use scorer::{
    LearnedScorer, LearnedWeights, RuleScorer, ScorerError, ScorerState, SequenceScorer,
    StepContext, StepEvent, StepScore,
};
pub use symbol::{sticking_string, Distribution, Hand, StickingSymbol};

/// Errors from sticking generation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to load model weights: {0}")]
    ModelLoad(String),

    #[error("scorer returned an invalid distribution at event {index}: {reason}")]
    InvalidScore { index: usize, reason: String },

    #[error("scorer failed at event {index}: {message}")]
    ScoringFailure { index: usize, message: String },

    #[error("timed out after {processed} of {total} events")]
    Timeout { processed: usize, total: usize },

    #[error("internal search state violated: {0}")]
    InvalidState(String),
}

impl From<sticking_conf::ConfigError> for Error {
    fn from(err: sticking_conf::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
