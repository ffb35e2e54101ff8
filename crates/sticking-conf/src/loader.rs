//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, StickingConf};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with an explicit override path.
///
/// If `override_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/override).
pub fn discover_config_files_with_override(override_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/sticking/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("sticking/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = override_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("sticking.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<StickingConf, ConfigError> {
    let table = load_table(path)?;
    into_config(table, path)
}

/// Load a TOML file as an untyped table, checked against the config schema.
///
/// Only keys the file sets are present, so later files can be layered with
/// [`merge_tables`].
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_table(&contents, path)
}

fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    into_config(table.clone(), path)?;
    Ok(table)
}

/// Type a (possibly merged) table. Missing keys take their defaults.
pub fn into_config(table: toml::Table, path: &Path) -> Result<StickingConf, ConfigError> {
    let mut config: StickingConf = toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    if let Some(weights) = config.scorer.weights.take() {
        config.scorer.weights = Some(expand_path(&weights.to_string_lossy()));
    }

    Ok(config)
}

#[cfg(test)]
fn parse_toml(contents: &str, path: &Path) -> Result<StickingConf, ConfigError> {
    into_config(parse_table(contents, path)?, path)
}

/// Layer `overlay` onto `base`. Nested tables merge key by key, any other
/// value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(incoming) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, incoming);
                continue;
            }
            base.insert(key, toml::Value::Table(incoming));
        } else {
            base.insert(key, value);
        }
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut StickingConf, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Unparseable numeric values are ignored and not recorded as overrides.
pub fn apply_overrides_from<F>(config: &mut StickingConf, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("STICKING_BEAM_WIDTH") {
        if let Ok(width) = v.parse() {
            config.search.beam_width = width;
            sources.env_overrides.push("STICKING_BEAM_WIDTH".to_string());
        }
    }
    if let Some(v) = lookup("STICKING_DEDUP_WINDOW") {
        if let Ok(window) = v.parse() {
            config.search.dedup_window = window;
            sources.env_overrides.push("STICKING_DEDUP_WINDOW".to_string());
        }
    }
    if let Some(v) = lookup("STICKING_TIMEOUT_MS") {
        if let Ok(ms) = v.parse() {
            config.search.timeout_ms = Some(ms);
            sources.env_overrides.push("STICKING_TIMEOUT_MS".to_string());
        }
    }

    if let Some(v) = lookup("STICKING_DOUBLE_STROKE_MS") {
        if let Ok(ms) = v.parse() {
            config.rules.double_stroke_ms = ms;
            sources.env_overrides.push("STICKING_DOUBLE_STROKE_MS".to_string());
        }
    }
    if let Some(v) = lookup("STICKING_INITIAL_HAND") {
        config.rules.initial_hand = v;
        sources.env_overrides.push("STICKING_INITIAL_HAND".to_string());
    }
    if let Some(v) = lookup("STICKING_TEMPERATURE") {
        if let Ok(t) = v.parse() {
            config.rules.temperature = t;
            sources.env_overrides.push("STICKING_TEMPERATURE".to_string());
        }
    }

    if let Some(v) = lookup("STICKING_SCORER") {
        config.scorer.kind = v;
        sources.env_overrides.push("STICKING_SCORER".to_string());
    }
    if let Some(v) = lookup("STICKING_WEIGHTS") {
        config.scorer.weights = Some(expand_path(&v));
        sources.env_overrides.push("STICKING_WEIGHTS".to_string());
    }

    if let Some(v) = lookup("STICKING_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("STICKING_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}

/// Expand a leading `~/` or `$VAR` in a path.
pub fn expand_path(path: &str) -> PathBuf {
    let home = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf());
    expand_path_with(path, home.as_deref(), |name| env::var(name).ok())
}

/// Expand a path against an explicit home dir and variable lookup.
///
/// An unknown variable or a missing home leaves the path as written.
pub fn expand_path_with<F>(path: &str, home: Option<&Path>, lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    let expanded = if let Some(rest) = path.strip_prefix("~/") {
        home.map(|h| h.join(rest))
    } else if let Some(var) = path.strip_prefix('$') {
        let (name, rest) = var.split_once('/').unwrap_or((var, ""));
        lookup(name).map(|value| {
            let base = PathBuf::from(value);
            if rest.is_empty() {
                base
            } else {
                base.join(rest)
            }
        })
    } else {
        None
    };

    expanded.unwrap_or_else(|| PathBuf::from(path))
}
