//! Diversity-aware beam search over L/R/K assignments.
//!
//! The frontier is an explicit vector of at most `beam_width` hypotheses.
//! Each step expands every survivor by the symbols its scorer supports,
//! collapses children that agree on their last `dedup_window` symbols, and
//! keeps the best `beam_width` groups.

use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::debug;

use crate::onset::OnsetSequence;
use crate::patterns::{MotifTracker, PatternTag};
use crate::scorer::{ScorerError, ScorerState, SequenceScorer, StepContext, StepEvent};
use crate::symbol::{Hand, StickingSymbol};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamConfig {
    /// Hypotheses kept after every step, primary included.
    pub beam_width: usize,
    /// Trailing symbols compared when collapsing near-duplicates.
    pub dedup_window: usize,
    /// Seconds between different-hand hits that count as a flam.
    pub flam_threshold: f64,
}

impl Default for BeamConfig {
    fn default() -> Self {
        Self {
            beam_width: 3,
            dedup_window: 6,
            flam_threshold: 0.03,
        }
    }
}

impl BeamConfig {
    pub fn validate(&self) -> Result<()> {
        if self.beam_width == 0 {
            return Err(Error::Config("beam_width must be at least 1".into()));
        }
        if self.dedup_window == 0 {
            return Err(Error::Config("dedup_window must be at least 1".into()));
        }
        if !self.flam_threshold.is_finite() || self.flam_threshold < 0.0 {
            return Err(Error::Config(format!(
                "flam threshold must be non-negative, got {}",
                self.flam_threshold
            )));
        }
        Ok(())
    }
}

/// One branch of the search. Each branch owns its hand and scorer state.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialHypothesis {
    pub symbols: Vec<StickingSymbol>,
    pub cumulative_log_score: f64,
    /// Most recent hand. Kicks leave it unchanged.
    pub last_hand: Option<Hand>,
    /// Probability of the most recently appended symbol.
    pub last_step_prob: f64,
    pub motifs: MotifTracker,
    pub scorer_state: ScorerState,
}

impl PartialHypothesis {
    fn root(scorer_state: ScorerState) -> Self {
        Self {
            symbols: Vec::new(),
            cumulative_log_score: 0.0,
            last_hand: None,
            last_step_prob: 1.0,
            motifs: MotifTracker::default(),
            scorer_state,
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn pattern_tags(&self) -> &[PatternTag] {
        self.motifs.tags()
    }

    fn dedup_key(&self, window: usize) -> &[StickingSymbol] {
        let start = self.symbols.len().saturating_sub(window);
        &self.symbols[start..]
    }
}

/// Rank order: higher score, then higher last-step probability, then the
/// lexicographically smaller sequence.
fn rank_order(a: &PartialHypothesis, b: &PartialHypothesis) -> Ordering {
    b.cumulative_log_score
        .total_cmp(&a.cumulative_log_score)
        .then_with(|| b.last_step_prob.total_cmp(&a.last_step_prob))
        .then_with(|| a.symbols.cmp(&b.symbols))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Initialized,
    /// About to assign the event at this index.
    Expanding(usize),
    Complete,
}

pub struct BeamSearch<'a> {
    scorer: &'a dyn SequenceScorer,
    config: BeamConfig,
    onsets: &'a OnsetSequence,
    intervals: Vec<Option<f64>>,
    hand_intervals: Vec<Option<f64>>,
    frontier: Vec<PartialHypothesis>,
    state: SearchState,
}

impl<'a> BeamSearch<'a> {
    pub fn new(
        scorer: &'a dyn SequenceScorer,
        config: BeamConfig,
        onsets: &'a OnsetSequence,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            scorer,
            config,
            onsets,
            intervals: onsets.intervals(),
            hand_intervals: onsets.hand_intervals(),
            frontier: Vec::new(),
            state: SearchState::Initialized,
        })
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn frontier(&self) -> &[PartialHypothesis] {
        &self.frontier
    }

    /// Advance one transition. Stepping a completed search is a no-op.
    pub fn step(&mut self) -> Result<SearchState> {
        let total = self.onsets.len();
        let current = self.state;
        self.state = match current {
            SearchState::Initialized => {
                self.frontier = vec![PartialHypothesis::root(self.scorer.initial_state())];
                if total == 0 {
                    SearchState::Complete
                } else {
                    SearchState::Expanding(0)
                }
            }
            SearchState::Expanding(index) => {
                self.expand(index)?;
                if index + 1 == total {
                    SearchState::Complete
                } else {
                    SearchState::Expanding(index + 1)
                }
            }
            SearchState::Complete => SearchState::Complete,
        };
        Ok(self.state)
    }

    pub fn run(self) -> Result<Vec<PartialHypothesis>> {
        self.run_with(|_, _| Ok(()))
    }

    /// Drive to completion, calling `before_step(processed, total)` ahead of
    /// every expansion. An error from the callback aborts the search.
    pub fn run_with<F>(mut self, mut before_step: F) -> Result<Vec<PartialHypothesis>>
    where
        F: FnMut(usize, usize) -> Result<()>,
    {
        let total = self.onsets.len();
        loop {
            match self.state {
                SearchState::Complete => break,
                SearchState::Expanding(index) => before_step(index, total)?,
                SearchState::Initialized => {}
            }
            self.step()?;
        }
        self.finish()
    }

    /// Take the final frontier, checking every hypothesis covers every onset.
    pub fn finish(self) -> Result<Vec<PartialHypothesis>> {
        if self.state != SearchState::Complete {
            return Err(Error::InvalidState(format!(
                "search finished in state {:?}",
                self.state
            )));
        }
        let total = self.onsets.len();
        if let Some(bad) = self.frontier.iter().find(|h| h.len() != total) {
            return Err(Error::InvalidState(format!(
                "hypothesis has {} symbols for {} onsets",
                bad.len(),
                total
            )));
        }
        if self.frontier.is_empty() {
            return Err(Error::InvalidState("search ended with an empty beam".into()));
        }
        Ok(self.frontier)
    }

    fn expand(&mut self, index: usize) -> Result<()> {
        let onsets = self.onsets;
        let events = onsets.as_slice();
        let event = &events[index];
        let step = StepEvent {
            index,
            event,
            interval: self.intervals[index],
            hand_interval: self.hand_intervals[index],
        };

        let scores = {
            let contexts: Vec<StepContext<'_>> = self
                .frontier
                .iter()
                .map(|h| StepContext {
                    symbols: &h.symbols,
                    last_hand: h.last_hand,
                    state: &h.scorer_state,
                })
                .collect();
            let scores = self
                .scorer
                .score_batch(&step, &contexts)
                .map_err(|e| Error::ScoringFailure {
                    index,
                    message: e.to_string(),
                })?;
            if scores.len() != contexts.len() {
                let e = ScorerError::BatchSize {
                    expected: contexts.len(),
                    got: scores.len(),
                };
                return Err(Error::ScoringFailure {
                    index,
                    message: e.to_string(),
                });
            }
            scores
        };

        let parents = std::mem::take(&mut self.frontier);
        let mut children = Vec::with_capacity(parents.len() * 2);

        for (parent, score) in parents.iter().zip(scores) {
            score.distribution.validate(event.drum_type, index)?;

            for (symbol, p) in score.distribution.support() {
                let mut symbols = Vec::with_capacity(parent.symbols.len() + 1);
                symbols.extend_from_slice(&parent.symbols);
                symbols.push(symbol);

                let mut motifs = parent.motifs.clone();
                let last_hand = match symbol.hand() {
                    Some(hand) => {
                        motifs.observe(hand, index, events, self.config.flam_threshold);
                        Some(hand)
                    }
                    None => parent.last_hand,
                };

                children.push(PartialHypothesis {
                    symbols,
                    cumulative_log_score: parent.cumulative_log_score + p.ln(),
                    last_hand,
                    last_step_prob: p,
                    motifs,
                    scorer_state: score.state.clone(),
                });
            }
        }

        let generated = children.len();
        children.sort_by(rank_order);

        let window = self.config.dedup_window;
        let mut seen: HashSet<Vec<StickingSymbol>> = HashSet::with_capacity(generated);
        let mut survivors = Vec::with_capacity(self.config.beam_width.min(generated));
        let mut collapsed = 0usize;

        for child in children {
            if seen.insert(child.dedup_key(window).to_vec()) {
                if survivors.len() < self.config.beam_width {
                    survivors.push(child);
                }
            } else {
                collapsed += 1;
            }
        }

        debug!(
            step = index,
            generated,
            collapsed,
            beam = survivors.len(),
            "beam step"
        );

        self.frontier = survivors;
        Ok(())
    }
}
