//! Request-level entry point: configuration, scorer selection, timeouts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sticking_conf::StickingConf;
use tracing::{debug, info, warn};

use crate::beam::{BeamConfig, BeamSearch};
use crate::onset::{DrumType, OnsetSequence};
use crate::ranker::HypothesisList;
use crate::rules::{HandPolicy, RuleConfig, RuleEngine};
use crate::scorer::{LearnedScorer, RuleScorer, SequenceScorer};
use crate::symbol::Hand;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum ScorerKind {
    Rule,
    Learned { weights_path: PathBuf },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub beam_width: usize,
    pub dedup_window: usize,
    /// Seconds.
    pub flam_threshold: f64,
    pub rules: RuleConfig,
    /// Rule scorer softmax temperature.
    pub temperature: f64,
    pub scorer: ScorerKind,
    /// Checked before every beam step.
    pub timeout: Option<Duration>,
    /// Velocity below which a hand hit renders lowercase.
    pub ghost_velocity: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            beam_width: 3,
            dedup_window: 6,
            flam_threshold: 0.03,
            rules: RuleConfig::default(),
            temperature: 1.0,
            scorer: ScorerKind::Rule,
            timeout: None,
            ghost_velocity: 0.35,
        }
    }
}

impl EngineConfig {
    pub fn beam(&self) -> BeamConfig {
        BeamConfig {
            beam_width: self.beam_width,
            dedup_window: self.dedup_window,
            flam_threshold: self.flam_threshold,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.beam().validate()?;

        let r = &self.rules;
        if !r.double_stroke_threshold.is_finite() || r.double_stroke_threshold < 0.0 {
            return Err(Error::Config(format!(
                "double-stroke threshold must be non-negative, got {}",
                r.double_stroke_threshold
            )));
        }
        for (name, value) in [
            ("alternation_bonus", r.alternation_bonus),
            ("double_stroke_bonus", r.double_stroke_bonus),
            ("accent_bonus", r.accent_bonus),
        ] {
            if !value.is_finite() {
                return Err(Error::Config(format!("{name} must be finite, got {value}")));
            }
        }
        if r.beats_per_bar == 0 {
            return Err(Error::Config("beats_per_bar must be at least 1".into()));
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(Error::Config(format!(
                "temperature must be positive, got {}",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.ghost_velocity) {
            return Err(Error::Config(format!(
                "ghost_velocity must be within [0, 1], got {}",
                self.ghost_velocity
            )));
        }
        Ok(())
    }
}

impl TryFrom<&StickingConf> for EngineConfig {
    type Error = Error;

    fn try_from(conf: &StickingConf) -> Result<Self> {
        let mut rules = RuleConfig::default();
        rules.initial_hand = conf.rules.initial_hand.parse::<Hand>()?;
        rules.double_stroke_threshold = conf.rules.double_stroke_ms / 1000.0;
        rules.alternation_bonus = conf.rules.alternation_bonus;
        rules.double_stroke_bonus = conf.rules.double_stroke_bonus;
        rules.accent_bonus = conf.rules.accent_bonus;
        rules.beats_per_bar = conf.search.beats_per_bar;
        for (drum, policy) in &conf.rules.policies {
            rules.set_policy(drum.parse::<DrumType>()?, policy.parse::<HandPolicy>()?);
        }

        let scorer = match conf.scorer.kind.as_str() {
            "rule" => ScorerKind::Rule,
            "learned" => {
                let weights_path = conf.scorer.weights.clone().ok_or_else(|| {
                    Error::Config("learned scorer requires scorer.weights".into())
                })?;
                ScorerKind::Learned { weights_path }
            }
            other => return Err(Error::Config(format!("unknown scorer kind: {other}"))),
        };

        let config = Self {
            beam_width: conf.search.beam_width,
            dedup_window: conf.search.dedup_window,
            flam_threshold: conf.rules.flam_ms / 1000.0,
            rules,
            temperature: conf.rules.temperature,
            scorer,
            timeout: conf.search.timeout_ms.map(Duration::from_millis),
            ghost_velocity: conf.output.ghost_velocity,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Turns onset sequences into ranked sticking hypotheses.
///
/// Holds no per-request state, so one engine can serve many threads.
pub struct StickingEngine {
    config: EngineConfig,
    scorer: Arc<dyn SequenceScorer>,
}

impl StickingEngine {
    /// Build the scorer named by `config.scorer`. Learned weights load here.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let scorer: Arc<dyn SequenceScorer> = match &config.scorer {
            ScorerKind::Rule => Arc::new(RuleScorer::new(
                RuleEngine::new(config.rules.clone()),
                config.temperature,
            )?),
            ScorerKind::Learned { weights_path } => {
                let scorer = LearnedScorer::from_path(weights_path)?;
                info!(
                    path = %weights_path.display(),
                    hidden = scorer.weights().hidden_size,
                    "loaded learned scorer weights"
                );
                Arc::new(scorer)
            }
        };
        Ok(Self { config, scorer })
    }

    /// Use a caller-supplied scorer; `config.scorer` is ignored.
    pub fn with_scorer(config: EngineConfig, scorer: Arc<dyn SequenceScorer>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, scorer })
    }

    pub fn from_conf(conf: &StickingConf) -> Result<Self> {
        Self::new(EngineConfig::try_from(conf)?)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scorer_name(&self) -> &'static str {
        self.scorer.name()
    }

    pub fn transcribe(&self, onsets: &OnsetSequence) -> Result<HypothesisList> {
        self.transcribe_with_progress(onsets, |_, _| {})
    }

    /// Like `transcribe`, reporting `(processed, total)` before each step.
    pub fn transcribe_with_progress<F>(
        &self,
        onsets: &OnsetSequence,
        mut progress: F,
    ) -> Result<HypothesisList>
    where
        F: FnMut(usize, usize),
    {
        let total = onsets.len();
        if total == 0 {
            debug!("empty onset sequence");
            return Ok(HypothesisList::empty_input());
        }

        let started = Instant::now();
        let deadline = self.config.timeout.map(|t| started + t);
        debug!(events = total, scorer = self.scorer.name(), "transcription started");

        let search = BeamSearch::new(self.scorer.as_ref(), self.config.beam(), onsets)?;
        let result = search
            .run_with(|processed, total| {
                progress(processed, total);
                match deadline {
                    Some(d) if Instant::now() >= d => Err(Error::Timeout { processed, total }),
                    _ => Ok(()),
                }
            })
            .and_then(|beam| HypothesisList::from_beam(&beam, self.config.rules.beats_per_bar));

        match &result {
            Ok(list) => {
                progress(total, total);
                info!(
                    events = total,
                    hypotheses = list.len(),
                    confidence = list.primary().confidence,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "transcription complete"
                );
            }
            Err(e) => warn!(events = total, error = %e, "transcription failed"),
        }
        result
    }
}

impl std::fmt::Debug for StickingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StickingEngine")
            .field("config", &self.config)
            .field("scorer", &self.scorer.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    #[test]
    fn defaults_survive_conversion() {
        let config = EngineConfig::try_from(&StickingConf::default()).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn conf_strings_become_typed_values() {
        let mut conf = StickingConf::default();
        conf.rules.initial_hand = "left".into();
        conf.rules.double_stroke_ms = 90.0;
        conf.search.timeout_ms = Some(250);
        conf.rules.policies = BTreeMap::from([("tom_hi".to_string(), "free".to_string())]);

        let config = EngineConfig::try_from(&conf).unwrap();
        assert_eq!(config.rules.initial_hand, Hand::Left);
        assert!((config.rules.double_stroke_threshold - 0.09).abs() < 1e-12);
        assert_eq!(config.timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.rules.policy(DrumType::TomHi), HandPolicy::Free);
        assert_eq!(config.rules.policy(DrumType::Snare), HandPolicy::AlternateWithDoubles);
    }

    #[test]
    fn bad_conf_values_are_config_errors() {
        let mut conf = StickingConf::default();
        conf.scorer.kind = "oracle".into();
        assert!(matches!(EngineConfig::try_from(&conf), Err(Error::Config(_))));

        let mut conf = StickingConf::default();
        conf.scorer.kind = "learned".into();
        assert!(matches!(EngineConfig::try_from(&conf), Err(Error::Config(_))));

        let mut conf = StickingConf::default();
        conf.rules.policies.insert("cowbell".into(), "free".into());
        assert!(matches!(EngineConfig::try_from(&conf), Err(Error::Config(_))));

        let mut conf = StickingConf::default();
        conf.search.beam_width = 0;
        assert!(matches!(EngineConfig::try_from(&conf), Err(Error::Config(_))));
    }

    #[test]
    fn missing_weights_file_fails_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            scorer: ScorerKind::Learned {
                weights_path: dir.path().join("absent.json"),
            },
            ..EngineConfig::default()
        };
        assert!(matches!(StickingEngine::new(config), Err(Error::ModelLoad(_))));
    }

    #[test]
    fn empty_input_skips_search() {
        let engine = StickingEngine::new(EngineConfig::default()).unwrap();
        let mut calls = 0;
        let list = engine
            .transcribe_with_progress(&OnsetSequence::empty(), |_, _| calls += 1)
            .unwrap();
        assert_eq!(list, HypothesisList::empty_input());
        assert_eq!(calls, 0);
    }
}
