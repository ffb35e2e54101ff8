//! Configuration sections. Values stay loosely typed here (hand names,
//! policy names as strings); the engine validates them on conversion.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Beam search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConf {
    /// Hypotheses retained per step (primary + alternatives).
    #[serde(default = "SearchConf::default_beam_width")]
    pub beam_width: usize,

    /// Trailing symbols compared when collapsing near-duplicates.
    #[serde(default = "SearchConf::default_dedup_window")]
    pub dedup_window: usize,

    /// Request deadline in milliseconds. Absent means no deadline.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Beats per bar, used when labelling motif positions.
    #[serde(default = "SearchConf::default_beats_per_bar")]
    pub beats_per_bar: u32,
}

impl SearchConf {
    fn default_beam_width() -> usize {
        3
    }

    fn default_dedup_window() -> usize {
        6
    }

    fn default_beats_per_bar() -> u32 {
        4
    }
}

impl Default for SearchConf {
    fn default() -> Self {
        Self {
            beam_width: Self::default_beam_width(),
            dedup_window: Self::default_dedup_window(),
            timeout_ms: None,
            beats_per_bar: Self::default_beats_per_bar(),
        }
    }
}

/// Constraint and heuristic weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesConf {
    /// Hand that takes the first hand hit: "R" or "L".
    #[serde(default = "RulesConf::default_initial_hand")]
    pub initial_hand: String,

    /// Snare inter-onset interval below which a repeated hand is favoured.
    #[serde(default = "RulesConf::default_double_stroke_ms")]
    pub double_stroke_ms: f64,

    /// Hand hits closer than this with different hands are tagged as flams.
    #[serde(default = "RulesConf::default_flam_ms")]
    pub flam_ms: f64,

    /// Softmax temperature for the rule scorer.
    #[serde(default = "RulesConf::default_temperature")]
    pub temperature: f64,

    #[serde(default = "RulesConf::default_alternation_bonus")]
    pub alternation_bonus: f64,

    #[serde(default = "RulesConf::default_double_stroke_bonus")]
    pub double_stroke_bonus: f64,

    /// Lead-hand bonus on on-beat hits. 0 disables accenting.
    #[serde(default)]
    pub accent_bonus: f64,

    /// Per drum type hand policy overrides, e.g. `tom_hi = "free"`.
    #[serde(default)]
    pub policies: BTreeMap<String, String>,
}

impl RulesConf {
    fn default_initial_hand() -> String {
        "R".to_string()
    }

    fn default_double_stroke_ms() -> f64 {
        120.0
    }

    fn default_flam_ms() -> f64 {
        30.0
    }

    fn default_temperature() -> f64 {
        1.0
    }

    fn default_alternation_bonus() -> f64 {
        1.0
    }

    fn default_double_stroke_bonus() -> f64 {
        1.5
    }
}

impl Default for RulesConf {
    fn default() -> Self {
        Self {
            initial_hand: Self::default_initial_hand(),
            double_stroke_ms: Self::default_double_stroke_ms(),
            flam_ms: Self::default_flam_ms(),
            temperature: Self::default_temperature(),
            alternation_bonus: Self::default_alternation_bonus(),
            double_stroke_bonus: Self::default_double_stroke_bonus(),
            accent_bonus: 0.0,
            policies: BTreeMap::new(),
        }
    }
}

/// Which scorer drives the search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerConf {
    /// "rule" or "learned".
    #[serde(default = "ScorerConf::default_kind")]
    pub kind: String,

    /// JSON weight file for the learned scorer.
    #[serde(default)]
    pub weights: Option<PathBuf>,
}

impl ScorerConf {
    fn default_kind() -> String {
        "rule".to_string()
    }
}

impl Default for ScorerConf {
    fn default() -> Self {
        Self {
            kind: Self::default_kind(),
            weights: None,
        }
    }
}

/// Output rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConf {
    /// Hand hits quieter than this render lowercase in dynamics notation.
    #[serde(default = "OutputConf::default_ghost_velocity")]
    pub ghost_velocity: f64,
}

impl OutputConf {
    fn default_ghost_velocity() -> f64 {
        0.35
    }
}

impl Default for OutputConf {
    fn default() -> Self {
        Self {
            ghost_velocity: Self::default_ghost_velocity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConf {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "TelemetryConf::default_log_level")]
    pub log_level: String,
}

impl TelemetryConf {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConf {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
