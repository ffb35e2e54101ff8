//! Final hypotheses and their renderings.
//!
//! Confidences are a softmax over the retained beam's cumulative log
//! scores. They are relative within one response and not comparable
//! across responses.

use serde::Serialize;
use serde_json::{json, Value};

use crate::beam::PartialHypothesis;
use crate::onset::OnsetSequence;
use crate::patterns::pattern_label;
use crate::symbol::{sticking_string, StickingSymbol};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hypothesis {
    pub sticking: Vec<StickingSymbol>,
    /// In (0, 1]. Non-increasing by rank.
    pub confidence: f64,
    pub pattern_label: String,
    /// 0 is the primary.
    pub rank: usize,
}

impl Hypothesis {
    pub fn sticking_string(&self) -> String {
        sticking_string(&self.sticking)
    }

    /// Compact "RlKRL" form with ghost-note hands lowercased.
    ///
    /// A hit is a ghost note when its velocity is below `ghost_velocity`.
    pub fn dynamics_notation(&self, onsets: &OnsetSequence, ghost_velocity: f64) -> String {
        self.sticking
            .iter()
            .zip(onsets.iter())
            .map(|(symbol, event)| {
                let c = symbol.as_char();
                if symbol.hand().is_some() && event.velocity < ghost_velocity {
                    c.to_ascii_lowercase()
                } else {
                    c
                }
            })
            .collect()
    }

    fn to_json(&self) -> Value {
        json!({
            "sticking": self.sticking_string(),
            "confidence": self.confidence,
            "pattern": self.pattern_label,
        })
    }
}

/// Ranked output of one request. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HypothesisList {
    hypotheses: Vec<Hypothesis>,
}

impl HypothesisList {
    /// The trivial answer for an empty clip.
    pub fn empty_input() -> Self {
        Self {
            hypotheses: vec![Hypothesis {
                sticking: Vec::new(),
                confidence: 1.0,
                pattern_label: "No onsets".to_string(),
                rank: 0,
            }],
        }
    }

    /// Map a completed beam, already in rank order, to output records.
    pub fn from_beam(beam: &[PartialHypothesis], beats_per_bar: u32) -> Result<Self> {
        let best = beam
            .first()
            .ok_or_else(|| Error::InvalidState("no hypotheses to rank".into()))?
            .cumulative_log_score;

        let weights: Vec<f64> = beam
            .iter()
            .map(|h| (h.cumulative_log_score - best).exp())
            .collect();
        let total: f64 = weights.iter().sum();

        let hypotheses = beam
            .iter()
            .zip(weights)
            .enumerate()
            .map(|(rank, (h, w))| Hypothesis {
                sticking: h.symbols.clone(),
                confidence: (w / total).max(f64::MIN_POSITIVE),
                pattern_label: pattern_label(h.pattern_tags(), beats_per_bar),
                rank,
            })
            .collect();

        Ok(Self { hypotheses })
    }

    pub fn primary(&self) -> &Hypothesis {
        &self.hypotheses[0]
    }

    pub fn alternatives(&self) -> &[Hypothesis] {
        &self.hypotheses[1..]
    }

    pub fn as_slice(&self) -> &[Hypothesis] {
        &self.hypotheses
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Hypothesis> {
        self.hypotheses.iter()
    }

    pub fn len(&self) -> usize {
        self.hypotheses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hypotheses.is_empty()
    }

    pub fn into_vec(self) -> Vec<Hypothesis> {
        self.hypotheses
    }

    /// `{"primary": {...}, "alternatives": [...]}`
    pub fn to_json(&self) -> Value {
        json!({
            "primary": self.primary().to_json(),
            "alternatives": self.alternatives().iter().map(Hypothesis::to_json).collect::<Vec<_>>(),
        })
    }

    pub fn report(&self) -> String {
        let mut out = String::new();
        let primary = self.primary();
        out.push_str(&format!(
            "Primary: {} ({:.1}%) {}\n",
            primary.sticking_string(),
            primary.confidence * 100.0,
            primary.pattern_label
        ));

        if !self.alternatives().is_empty() {
            out.push_str("Alternatives:\n");
            for alt in self.alternatives() {
                out.push_str(&format!(
                    "  {}. {} ({:.1}%) {}\n",
                    alt.rank,
                    alt.sticking_string(),
                    alt.confidence * 100.0,
                    alt.pattern_label
                ));
            }
        }
        out
    }
}

impl<'a> IntoIterator for &'a HypothesisList {
    type Item = &'a Hypothesis;
    type IntoIter = std::slice::Iter<'a, Hypothesis>;

    fn into_iter(self) -> Self::IntoIter {
        self.hypotheses.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beam::{BeamConfig, BeamSearch};
    use crate::onset::{DrumType, OnsetEvent};
    use crate::scorer::RuleScorer;
    use pretty_assertions::assert_eq;

    fn ranked(onsets: &OnsetSequence, beam_width: usize) -> HypothesisList {
        let scorer = RuleScorer::default();
        let config = BeamConfig {
            beam_width,
            ..BeamConfig::default()
        };
        let beam = BeamSearch::new(&scorer, config, onsets).unwrap().run().unwrap();
        HypothesisList::from_beam(&beam, 4).unwrap()
    }

    fn groove() -> OnsetSequence {
        OnsetSequence::new(vec![
            OnsetEvent::new(0.0, DrumType::Kick, 0.9).at_position(0.0),
            OnsetEvent::new(0.25, DrumType::Snare, 0.8).at_position(0.25),
            OnsetEvent::new(0.5, DrumType::HihatClosed, 0.2).at_position(0.5),
            OnsetEvent::new(0.75, DrumType::Snare, 0.8).at_position(0.75),
        ])
        .unwrap()
    }

    #[test]
    fn empty_input_is_single_certain_hypothesis() {
        let list = HypothesisList::empty_input();
        assert_eq!(list.len(), 1);
        assert_eq!(list.primary().sticking_string(), "");
        assert_eq!(list.primary().confidence, 1.0);
        assert!(list.alternatives().is_empty());
    }

    #[test]
    fn confidences_are_a_softmax() {
        let list = ranked(&groove(), 3);
        let total: f64 = list.iter().map(|h| h.confidence).sum();
        assert!((total - 1.0).abs() < 1e-9);
        for pair in list.as_slice().windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
        let ranks: Vec<usize> = list.iter().map(|h| h.rank).collect();
        assert_eq!(ranks, vec![0, 1, 2]);
    }

    #[test]
    fn json_shape() {
        let list = ranked(&groove(), 2);
        let v = list.to_json();
        assert_eq!(v["primary"]["sticking"], "K R L R");
        assert_eq!(v["primary"]["pattern"], "Standard alternating");
        assert_eq!(v["alternatives"].as_array().unwrap().len(), 1);
        assert!(v["primary"]["confidence"].as_f64().unwrap() > 0.5);
    }

    #[test]
    fn ghost_notes_lowercased() {
        let onsets = groove();
        let list = ranked(&onsets, 1);
        assert_eq!(list.primary().dynamics_notation(&onsets, 0.35), "KRlR");
        assert_eq!(list.primary().dynamics_notation(&onsets, 0.0), "KRLR");
    }

    #[test]
    fn report_lists_alternatives() {
        let list = ranked(&groove(), 2);
        let report = list.report();
        assert!(report.starts_with("Primary: K R L R ("));
        assert!(report.contains("Alternatives:\n  1. "));
    }

    #[test]
    fn empty_beam_is_invalid_state() {
        assert!(matches!(
            HypothesisList::from_beam(&[], 4),
            Err(Error::InvalidState(_))
        ));
    }
}
