//! Pluggable next-symbol scorers.
//!
//! The beam search only ever sees [`SequenceScorer`]. It hands over one
//! event plus the context of every surviving hypothesis and gets back one
//! [`StepScore`] per hypothesis, in the same order.

mod learned;
mod rule;

pub use learned::{LearnedScorer, LearnedWeights};
pub use rule::RuleScorer;

use crate::onset::OnsetEvent;
use crate::symbol::{Distribution, Hand, StickingSymbol};

/// The event about to be assigned, with timing derived from the sequence.
#[derive(Debug, Clone, Copy)]
pub struct StepEvent<'a> {
    pub index: usize,
    pub event: &'a OnsetEvent,
    /// Seconds since the previous onset of any type.
    pub interval: Option<f64>,
    /// Seconds since the previous hand (non-kick) onset.
    pub hand_interval: Option<f64>,
}

/// One hypothesis's view at the current step.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub symbols: &'a [StickingSymbol],
    pub last_hand: Option<Hand>,
    pub state: &'a ScorerState,
}

/// Per-hypothesis state a scorer carries across steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ScorerState {
    #[default]
    Stateless,
    /// Recurrent hidden vector after the hypothesis's last event.
    Hidden(Vec<f64>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepScore {
    pub distribution: Distribution,
    /// State after this event. Every child of the hypothesis inherits it.
    pub state: ScorerState,
}

#[derive(Debug, thiserror::Error)]
pub enum ScorerError {
    #[error("expected {expected} scores, got {got}")]
    BatchSize { expected: usize, got: usize },

    #[error("hidden state has {got} units, model expects {expected}")]
    StateShape { expected: usize, got: usize },

    #[error("scorer backend failed: {0}")]
    Backend(String),
}

/// Produces a distribution over {L, R, K} for the next event.
///
/// Kick events must get all mass on K; other events none on K. The beam
/// search checks this and fails the request rather than renormalizing.
pub trait SequenceScorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// State attached to the empty root hypothesis.
    fn initial_state(&self) -> ScorerState {
        ScorerState::Stateless
    }

    fn score_next(
        &self,
        step: &StepEvent<'_>,
        context: &StepContext<'_>,
    ) -> Result<StepScore, ScorerError>;

    /// Score every surviving hypothesis for one event in a single call.
    ///
    /// Backends with real batched inference override this.
    fn score_batch(
        &self,
        step: &StepEvent<'_>,
        contexts: &[StepContext<'_>],
    ) -> Result<Vec<StepScore>, ScorerError> {
        contexts.iter().map(|ctx| self.score_next(step, ctx)).collect()
    }
}
