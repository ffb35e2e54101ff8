//! Minimal configuration loading for the sticking engine.
//!
//! Values here are loosely typed (hand and policy names are
//! strings). The engine crate converts a [`StickingConf`] into its own typed
//! configuration and rejects anything it cannot interpret.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/sticking/config.toml` (system)
//! 2. `~/.config/sticking/config.toml` (user)
//! 3. `./sticking.toml` (local override, or an explicit path)
//! 4. Environment variables (`STICKING_*`)
//!
//! # Example Config
//!
//! ```toml
//! [search]
//! beam_width = 4
//! dedup_window = 6
//! timeout_ms = 2000
//!
//! [rules]
//! initial_hand = "R"
//! double_stroke_ms = 110.0
//! temperature = 0.8
//!
//! [rules.policies]
//! tom_lo = "free"
//!
//! [scorer]
//! kind = "learned"
//! weights = "~/.local/share/sticking/scorer.json"
//!
//! [telemetry]
//! log_level = "sticking=debug"
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use sections::{OutputConf, RulesConf, ScorerConf, SearchConf, TelemetryConf};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete sticking engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StickingConf {
    #[serde(default)]
    pub search: SearchConf,

    #[serde(default)]
    pub rules: RulesConf,

    #[serde(default)]
    pub scorer: ScorerConf,

    #[serde(default)]
    pub output: OutputConf,

    #[serde(default)]
    pub telemetry: TelemetryConf,
}

impl StickingConf {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with `config_path` replacing the local
    /// `./sticking.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::load_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let mut config = match sources.files.last() {
            Some(last) => loader::into_config(merged, last)?,
            None => StickingConf::default(),
        };

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# Sticking Engine Configuration\n\n");

        output.push_str("[search]\n");
        output.push_str(&format!("beam_width = {}\n", self.search.beam_width));
        output.push_str(&format!("dedup_window = {}\n", self.search.dedup_window));
        if let Some(ms) = self.search.timeout_ms {
            output.push_str(&format!("timeout_ms = {}\n", ms));
        }
        output.push_str(&format!("beats_per_bar = {}\n", self.search.beats_per_bar));

        output.push_str("\n[rules]\n");
        output.push_str(&format!("initial_hand = \"{}\"\n", self.rules.initial_hand));
        output.push_str(&format!(
            "double_stroke_ms = {:?}\n",
            self.rules.double_stroke_ms
        ));
        output.push_str(&format!("flam_ms = {:?}\n", self.rules.flam_ms));
        output.push_str(&format!("temperature = {:?}\n", self.rules.temperature));
        output.push_str(&format!(
            "alternation_bonus = {:?}\n",
            self.rules.alternation_bonus
        ));
        output.push_str(&format!(
            "double_stroke_bonus = {:?}\n",
            self.rules.double_stroke_bonus
        ));
        output.push_str(&format!("accent_bonus = {:?}\n", self.rules.accent_bonus));

        output.push_str("\n[rules.policies]\n");
        for (drum, policy) in &self.rules.policies {
            output.push_str(&format!("{} = \"{}\"\n", drum, policy));
        }

        output.push_str("\n[scorer]\n");
        output.push_str(&format!("kind = \"{}\"\n", self.scorer.kind));
        if let Some(weights) = &self.scorer.weights {
            output.push_str(&format!("weights = \"{}\"\n", weights.display()));
        }

        output.push_str("\n[output]\n");
        output.push_str(&format!(
            "ghost_velocity = {:?}\n",
            self.output.ghost_velocity
        ));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = \"{}\"\n", self.telemetry.log_level));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StickingConf::default();
        assert_eq!(config.search.beam_width, 3);
        assert_eq!(config.rules.initial_hand, "R");
        assert_eq!(config.scorer.kind, "rule");
        assert!(config.search.timeout_ms.is_none());
    }

    #[test]
    fn test_to_toml() {
        let mut config = StickingConf::default();
        config.rules.policies.insert("tom_lo".to_string(), "free".to_string());
        let toml = config.to_toml();
        assert!(toml.contains("[search]"));
        assert!(toml.contains("[rules.policies]"));
        assert!(toml.contains("tom_lo = \"free\""));
        assert!(!toml.contains("timeout_ms"));
    }

    #[test]
    fn test_to_toml_parses_back() {
        let mut config = StickingConf::default();
        config.search.timeout_ms = Some(1500);
        config.rules.temperature = 0.5;
        let parsed: StickingConf = toml::from_str(&config.to_toml()).unwrap();
        assert_eq!(parsed, config);
    }
}
