//! TOML configuration files and sweep presets.
//!
//! A run file deserializes straight into `BacktestConfig`; every section is
//! optional. A presets file holds a `[[preset]]` array where each entry is a
//! name plus a partial config that is deep-merged onto a base config:
//!
//! ```toml
//! [[preset]]
//! name = "tight-stop"
//! rotation = { stop_loss = 0.05 }
//!
//! [[preset]]
//! name = "monthly"
//! rebalance = { type = "monthly" }
//! ```
//!
//! Dates are quoted ISO strings (`start = "2021-01-04"`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use etfmom_core::{BacktestConfig, ConfigError};

/// Errors from reading config and preset files.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("preset '{preset}' could not be merged: {reason}")]
    Merge { preset: String, reason: String },

    #[error("duplicate preset name '{0}'")]
    DuplicatePreset(String),

    #[error("invalid config: {0}")]
    Invalid(#[from] ConfigError),
}

/// Parse and validate a run config from TOML text.
pub fn parse_config(text: &str) -> Result<BacktestConfig, ConfigFileError> {
    let config: BacktestConfig = toml::from_str(text).map_err(|source| ConfigFileError::Parse {
        origin: "config".into(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Read, parse and validate a run config file.
pub fn load_config(path: &Path) -> Result<BacktestConfig, ConfigFileError> {
    let text = read(path)?;
    parse_config(&text).map_err(|e| match e {
        ConfigFileError::Parse { source, .. } => ConfigFileError::Parse {
            origin: path.display().to_string(),
            source,
        },
        other => other,
    })
}

/// One named partial override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    #[serde(flatten)]
    pub overrides: toml::Table,
}

impl Preset {
    /// Deep-merge the overrides onto `base` and validate the result.
    ///
    /// Tables merge key by key; any other value (including arrays such as the
    /// risk ladder) replaces the base value wholesale.
    pub fn apply(&self, base: &BacktestConfig) -> Result<BacktestConfig, ConfigFileError> {
        let merge_err = |reason: String| ConfigFileError::Merge {
            preset: self.name.clone(),
            reason,
        };

        let mut value = toml::Value::try_from(base).map_err(|e| merge_err(e.to_string()))?;
        let toml::Value::Table(ref mut table) = value else {
            return Err(merge_err("base config is not a table".into()));
        };
        merge_tables(table, &self.overrides);

        let config: BacktestConfig = value
            .try_into()
            .map_err(|e: toml::de::Error| merge_err(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
struct PresetFile {
    #[serde(default, rename = "preset")]
    presets: Vec<Preset>,
}

/// Parse a presets document. Names must be unique.
pub fn parse_presets(text: &str) -> Result<Vec<Preset>, ConfigFileError> {
    let file: PresetFile = toml::from_str(text).map_err(|source| ConfigFileError::Parse {
        origin: "presets".into(),
        source,
    })?;
    let mut seen = std::collections::BTreeSet::new();
    for preset in &file.presets {
        if !seen.insert(preset.name.as_str()) {
            return Err(ConfigFileError::DuplicatePreset(preset.name.clone()));
        }
    }
    Ok(file.presets)
}

/// Read a presets file.
pub fn load_presets(path: &Path) -> Result<Vec<Preset>, ConfigFileError> {
    parse_presets(&read(path)?)
}

fn read(path: &Path) -> Result<String, ConfigFileError> {
    std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn merge_tables(base: &mut toml::Table, overrides: &toml::Table) {
    for (key, value) in overrides {
        match (base.get_mut(key), value) {
            (Some(toml::Value::Table(dst)), toml::Value::Table(src)) => merge_tables(dst, src),
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etfmom_core::RebalanceFrequency;

    const BASE: &str = r#"
universe = ["510300", "510500", "159915"]
benchmark = "000300"
start = "2021-01-04"
end = "2023-12-29"
"#;

    #[test]
    fn minimal_file_uses_defaults() {
        let config = parse_config(BASE).unwrap();
        assert_eq!(config.universe.len(), 3);
        assert_eq!(config.selection.min_percentile, 60.0);
        assert_eq!(config.rebalance, RebalanceFrequency::Weekly);
    }

    #[test]
    fn sections_override_defaults() {
        let text = format!(
            "{BASE}\n[selection]\nmax_correlation = 0.7\n\n\
             [rebalance]\ntype = \"every_sessions\"\nsessions = 10\n"
        );
        let config = parse_config(&text).unwrap();
        assert_eq!(config.selection.max_correlation, 0.7);
        assert_eq!(config.selection.min_percentile, 60.0);
        assert_eq!(config.rebalance, RebalanceFrequency::EverySessions { sessions: 10 });
    }

    #[test]
    fn invalid_values_rejected_on_load() {
        let text = format!("{BASE}\n[selection]\nmax_correlation = 1.5\n");
        let err = parse_config(&text).unwrap_err();
        assert!(matches!(
            err,
            ConfigFileError::Invalid(ConfigError::CorrelationOutOfRange(_))
        ));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = parse_config("universe = [").unwrap_err();
        assert!(matches!(err, ConfigFileError::Parse { .. }));
    }

    #[test]
    fn load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/etfmom.toml")).unwrap_err();
        assert!(matches!(err, ConfigFileError::Io { .. }));
    }

    #[test]
    fn preset_merges_nested_tables() {
        let base = parse_config(BASE).unwrap();
        let presets = parse_presets(
            r#"
[[preset]]
name = "tight"
rotation = { stop_loss = 0.05 }
selection = { min_percentile = 70.0 }
"#,
        )
        .unwrap();
        let cfg = presets[0].apply(&base).unwrap();
        assert_eq!(cfg.rotation.stop_loss, 0.05);
        assert_eq!(cfg.selection.min_percentile, 70.0);
        // Untouched siblings survive the merge.
        assert_eq!(cfg.selection.max_correlation, base.selection.max_correlation);
        assert_eq!(cfg.rotation.observation_period, base.rotation.observation_period);
        assert_eq!(cfg.universe, base.universe);
    }

    #[test]
    fn preset_switches_rebalance_variant() {
        let base = parse_config(BASE).unwrap();
        let presets = parse_presets(
            "[[preset]]\nname = \"monthly\"\nrebalance = { type = \"monthly\" }\n",
        )
        .unwrap();
        let cfg = presets[0].apply(&base).unwrap();
        assert_eq!(cfg.rebalance, RebalanceFrequency::Monthly);
    }

    #[test]
    fn preset_producing_invalid_config_fails() {
        let base = parse_config(BASE).unwrap();
        let text = "[[preset]]\nname = \"bad\"\ncosts = { commission_rate = 2.0 }\n";
        let presets = parse_presets(text).unwrap();
        assert!(matches!(
            presets[0].apply(&base),
            Err(ConfigFileError::Invalid(ConfigError::InvalidCostRate { .. }))
        ));
    }

    #[test]
    fn duplicate_preset_names_rejected() {
        let err =
            parse_presets("[[preset]]\nname = \"a\"\n\n[[preset]]\nname = \"a\"\n").unwrap_err();
        assert!(matches!(err, ConfigFileError::DuplicatePreset(name) if name == "a"));
    }

    #[test]
    fn preset_changes_run_id() {
        let base = parse_config(BASE).unwrap();
        let presets = parse_presets("[[preset]]\nname = \"x\"\nrisk_free_rate = 0.02\n").unwrap();
        let cfg = presets[0].apply(&base).unwrap();
        assert_ne!(cfg.run_id(), base.run_id());
    }
}
