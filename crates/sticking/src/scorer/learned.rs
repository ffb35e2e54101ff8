//! Inference for a small recurrent scorer trained offline.
//!
//! Per event the input vector is the drum embedding, then
//! `[velocity, ioi, position, has_position]`, then a one-hot of the
//! hypothesis's previous symbol in L, R, K order. One Elman step
//! `h' = tanh(Wx x + Wh h + b)` feeds a two-way output layer over L and R.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::onset::DrumType;
use crate::symbol::{Distribution, StickingSymbol};
use crate::{Error, Result};

use super::{ScorerError, ScorerState, SequenceScorer, StepContext, StepEvent, StepScore};

/// Numeric features after the embedding.
const DENSE_FEATURES: usize = 4;
/// Previous-symbol one-hot.
const PREV_FEATURES: usize = 3;

fn default_max_ioi() -> f64 {
    1.0
}

/// Row-major weight matrices as stored in the JSON weight file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedWeights {
    pub hidden_size: usize,
    pub embedding_dim: usize,
    /// One row per drum type, in `DrumType::ALL` order.
    pub drum_embeddings: Vec<Vec<f64>>,
    /// hidden_size × (embedding_dim + 7)
    pub input_weights: Vec<Vec<f64>>,
    /// hidden_size × hidden_size
    pub recurrent_weights: Vec<Vec<f64>>,
    pub hidden_bias: Vec<f64>,
    /// 2 × hidden_size, rows L then R.
    pub output_weights: Vec<Vec<f64>>,
    pub output_bias: Vec<f64>,
    /// Seconds. Inter-onset times are clipped to this and divided by it.
    #[serde(default = "default_max_ioi")]
    pub max_ioi: f64,
}

impl LearnedWeights {
    /// All-zero weights: every hand decision is 50/50.
    pub fn neutral(hidden_size: usize) -> Self {
        let embedding_dim = 4;
        let input_dim = embedding_dim + DENSE_FEATURES + PREV_FEATURES;
        Self {
            hidden_size,
            embedding_dim,
            drum_embeddings: vec![vec![0.0; embedding_dim]; DrumType::COUNT],
            input_weights: vec![vec![0.0; input_dim]; hidden_size],
            recurrent_weights: vec![vec![0.0; hidden_size]; hidden_size],
            hidden_bias: vec![0.0; hidden_size],
            output_weights: vec![vec![0.0; hidden_size]; 2],
            output_bias: vec![0.0; 2],
            max_ioi: default_max_ioi(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ModelLoad(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&content)
            .map_err(|e| Error::ModelLoad(format!("{}: {}", path.display(), strip_prefix(&e))))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let weights: Self =
            serde_json::from_str(json).map_err(|e| Error::ModelLoad(e.to_string()))?;
        weights.validate()?;
        Ok(weights)
    }

    pub fn input_dim(&self) -> usize {
        self.embedding_dim + DENSE_FEATURES + PREV_FEATURES
    }

    pub fn validate(&self) -> Result<()> {
        let h = self.hidden_size;
        if h == 0 {
            return Err(Error::ModelLoad("hidden_size must be at least 1".into()));
        }
        if !self.max_ioi.is_finite() || self.max_ioi <= 0.0 {
            return Err(Error::ModelLoad(format!(
                "max_ioi must be positive, got {}",
                self.max_ioi
            )));
        }

        check_matrix(
            "drum_embeddings",
            &self.drum_embeddings,
            DrumType::COUNT,
            self.embedding_dim,
        )?;
        check_matrix("input_weights", &self.input_weights, h, self.input_dim())?;
        check_matrix("recurrent_weights", &self.recurrent_weights, h, h)?;
        check_vector("hidden_bias", &self.hidden_bias, h)?;
        check_matrix("output_weights", &self.output_weights, 2, h)?;
        check_vector("output_bias", &self.output_bias, 2)?;
        Ok(())
    }
}

fn check_vector(name: &str, v: &[f64], len: usize) -> Result<()> {
    if v.len() != len {
        return Err(Error::ModelLoad(format!(
            "{name}: expected {len} values, found {}",
            v.len()
        )));
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(Error::ModelLoad(format!("{name}: non-finite value")));
    }
    Ok(())
}

fn check_matrix(name: &str, m: &[Vec<f64>], rows: usize, cols: usize) -> Result<()> {
    if m.len() != rows {
        return Err(Error::ModelLoad(format!(
            "{name}: expected {rows} rows, found {}",
            m.len()
        )));
    }
    for (i, row) in m.iter().enumerate() {
        check_vector(&format!("{name}[{i}]"), row, cols)?;
    }
    Ok(())
}

fn strip_prefix(err: &Error) -> String {
    match err {
        Error::ModelLoad(msg) => msg.clone(),
        other => other.to_string(),
    }
}

fn dot(row: &[f64], x: &[f64]) -> f64 {
    row.iter().zip(x).map(|(w, v)| w * v).sum()
}

/// Recurrent scorer over shared, read-only weights.
#[derive(Debug, Clone)]
pub struct LearnedScorer {
    weights: Arc<LearnedWeights>,
}

impl LearnedScorer {
    /// Fails with `Error::ModelLoad` if the matrix shapes disagree.
    pub fn new(weights: Arc<LearnedWeights>) -> Result<Self> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(Arc::new(LearnedWeights::load(path)?))
    }

    pub fn weights(&self) -> &Arc<LearnedWeights> {
        &self.weights
    }

    fn features(&self, step: &StepEvent<'_>, context: &StepContext<'_>) -> Vec<f64> {
        let w = &self.weights;
        let event = step.event;
        let mut x = Vec::with_capacity(w.input_dim());

        x.extend_from_slice(&w.drum_embeddings[event.drum_type.index()]);

        let ioi = step.hand_interval.unwrap_or(w.max_ioi).clamp(0.0, w.max_ioi) / w.max_ioi;
        x.push(event.velocity);
        x.push(ioi);
        match event.position_in_bar {
            Some(pos) => x.extend_from_slice(&[pos, 1.0]),
            None => x.extend_from_slice(&[0.0, 0.0]),
        }

        let mut prev = [0.0; PREV_FEATURES];
        if let Some(last) = context.symbols.last() {
            let slot = match last {
                StickingSymbol::L => 0,
                StickingSymbol::R => 1,
                StickingSymbol::K => 2,
            };
            prev[slot] = 1.0;
        }
        x.extend_from_slice(&prev);
        x
    }

    fn step(&self, x: &[f64], h: &[f64]) -> Vec<f64> {
        let w = &self.weights;
        (0..w.hidden_size)
            .map(|j| {
                (dot(&w.input_weights[j], x) + dot(&w.recurrent_weights[j], h) + w.hidden_bias[j])
                    .tanh()
            })
            .collect()
    }

    fn hand_distribution(&self, h: &[f64]) -> Distribution {
        let w = &self.weights;
        let l = dot(&w.output_weights[0], h) + w.output_bias[0];
        let r = dot(&w.output_weights[1], h) + w.output_bias[1];
        let m = l.max(r);
        let el = (l - m).exp();
        let er = (r - m).exp();
        Distribution::hands(el / (el + er), er / (el + er))
    }
}

impl SequenceScorer for LearnedScorer {
    fn name(&self) -> &'static str {
        "learned"
    }

    fn initial_state(&self) -> ScorerState {
        ScorerState::Hidden(vec![0.0; self.weights.hidden_size])
    }

    fn score_next(
        &self,
        step: &StepEvent<'_>,
        context: &StepContext<'_>,
    ) -> std::result::Result<StepScore, ScorerError> {
        let expected = self.weights.hidden_size;
        let zeros;
        let h: &[f64] = match context.state {
            ScorerState::Hidden(h) if h.len() == expected => h,
            ScorerState::Hidden(h) => {
                return Err(ScorerError::StateShape {
                    expected,
                    got: h.len(),
                })
            }
            ScorerState::Stateless => {
                zeros = vec![0.0; expected];
                &zeros
            }
        };

        let x = self.features(step, context);
        let next = self.step(&x, h);

        // Kicks still advance the recurrent state.
        let distribution = if step.event.drum_type.is_kick() {
            Distribution::forced_kick()
        } else {
            self.hand_distribution(&next)
        };

        Ok(StepScore {
            distribution,
            state: ScorerState::Hidden(next),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onset::OnsetEvent;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn run(
        scorer: &LearnedScorer,
        event: &OnsetEvent,
        symbols: &[StickingSymbol],
        state: &ScorerState,
    ) -> StepScore {
        let step = StepEvent {
            index: symbols.len(),
            event,
            interval: Some(0.25),
            hand_interval: Some(0.25),
        };
        let ctx = StepContext {
            symbols,
            last_hand: None,
            state,
        };
        scorer.score_next(&step, &ctx).unwrap()
    }

    #[test]
    fn neutral_weights_are_uniform() {
        let scorer = LearnedScorer::new(Arc::new(LearnedWeights::neutral(8))).unwrap();
        let snare = OnsetEvent::new(0.0, DrumType::Snare, 0.8);
        let out = run(&scorer, &snare, &[], &scorer.initial_state());
        assert_eq!(out.distribution, Distribution::hands(0.5, 0.5));
        assert_eq!(out.state, ScorerState::Hidden(vec![0.0; 8]));
    }

    #[test]
    fn kick_forced_and_state_advances() {
        let mut w = LearnedWeights::neutral(2);
        w.hidden_bias = vec![0.5, -0.5];
        let scorer = LearnedScorer::new(Arc::new(w)).unwrap();

        let kick = OnsetEvent::new(0.0, DrumType::Kick, 1.0);
        let out = run(&scorer, &kick, &[], &scorer.initial_state());
        assert_eq!(out.distribution, Distribution::forced_kick());
        match out.state {
            ScorerState::Hidden(h) => {
                assert!((h[0] - 0.5f64.tanh()).abs() < 1e-12);
                assert!((h[1] + 0.5f64.tanh()).abs() < 1e-12);
            }
            other => panic!("expected hidden state, got {other:?}"),
        }
    }

    #[test]
    fn previous_symbol_feeds_the_output() {
        // Hidden unit 0 copies "previous was R"; output favours L when it fires.
        let mut w = LearnedWeights::neutral(1);
        let prev_r = w.embedding_dim + DENSE_FEATURES + 1;
        w.input_weights[0][prev_r] = 3.0;
        w.output_weights = vec![vec![2.0], vec![-2.0]];
        let scorer = LearnedScorer::new(Arc::new(w)).unwrap();

        let snare = OnsetEvent::new(0.5, DrumType::Snare, 0.8);
        let after_r = run(&scorer, &snare, &[StickingSymbol::R], &scorer.initial_state());
        assert!(after_r.distribution.left > 0.95);

        let after_l = run(&scorer, &snare, &[StickingSymbol::L], &scorer.initial_state());
        assert_eq!(after_l.distribution, Distribution::hands(0.5, 0.5));
    }

    #[test]
    fn mismatched_state_is_an_error() {
        let scorer = LearnedScorer::new(Arc::new(LearnedWeights::neutral(4))).unwrap();
        let snare = OnsetEvent::new(0.0, DrumType::Snare, 0.8);
        let state = ScorerState::Hidden(vec![0.0; 3]);
        let step = StepEvent {
            index: 0,
            event: &snare,
            interval: None,
            hand_interval: None,
        };
        let ctx = StepContext {
            symbols: &[],
            last_hand: None,
            state: &state,
        };
        assert!(matches!(
            scorer.score_next(&step, &ctx),
            Err(ScorerError::StateShape { expected: 4, got: 3 })
        ));
    }

    #[test]
    fn loads_from_json_file() {
        let json = serde_json::to_string(&LearnedWeights::neutral(3)).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let scorer = LearnedScorer::from_path(file.path()).unwrap();
        assert_eq!(scorer.weights().hidden_size, 3);
    }

    #[test]
    fn wrong_shapes_rejected() {
        let mut w = LearnedWeights::neutral(3);
        w.recurrent_weights.pop();
        let json = serde_json::to_string(&w).unwrap();
        let err = LearnedWeights::from_json_str(&json).unwrap_err();
        assert!(matches!(err, Error::ModelLoad(ref m) if m.contains("recurrent_weights")));

        let mut w = LearnedWeights::neutral(3);
        w.drum_embeddings[2] = vec![0.0; 7];
        assert!(w.validate().is_err());

        assert!(matches!(
            LearnedWeights::from_json_str("{\"hidden_size\": 2}"),
            Err(Error::ModelLoad(_))
        ));
    }

    #[test]
    fn missing_file_is_model_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LearnedWeights::load(dir.path().join("weights.json")).unwrap_err();
        assert!(matches!(err, Error::ModelLoad(_)));
    }
}
