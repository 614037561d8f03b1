//! Cost settings and the optional YAML configuration file.
//!
//! The engine never reads configuration on its own: callers build a
//! [`CostSettings`] (usually from an [`EngineConfig`]) and pass it into every
//! derivation. Changing the rework factor means deriving again.

use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{fields::SemanticField, resolver::AliasTable};

pub const DEFAULT_REWORK_FACTOR: f64 = 3.0;
pub const DEFAULT_REWORK_UNIT_COST: f64 = 50.0;
pub const DEFAULT_SCRAP_UNIT_COST: f64 = 100.0;
pub const DEFAULT_PENALTY_PER_NOTE: f64 = 75.0;
pub const DEFAULT_ASSUMED_UNIT_PRICE: f64 = 100.0;
pub const DEFAULT_PERCENTAGE_CAP: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostSettings {
    /// Multiplier on `time × hourly rate` for one rework.
    pub rework_factor: f64,
    /// Flat cost per defect when time or rate columns are missing.
    pub rework_unit_cost_fallback: f64,
    /// Flat cost per second-choice unit when no unit price column exists.
    pub scrap_unit_cost_fallback: f64,
    /// Cost per defect-note point when no penalty amount column exists.
    pub penalty_per_note: f64,
    /// Unit price assumed when the CNQ ratio falls back to quantities.
    pub assumed_unit_price: f64,
    pub percentage_cap: f64,
}

impl Default for CostSettings {
    fn default() -> Self {
        Self {
            rework_factor: DEFAULT_REWORK_FACTOR,
            rework_unit_cost_fallback: DEFAULT_REWORK_UNIT_COST,
            scrap_unit_cost_fallback: DEFAULT_SCRAP_UNIT_COST,
            penalty_per_note: DEFAULT_PENALTY_PER_NOTE,
            assumed_unit_price: DEFAULT_ASSUMED_UNIT_PRICE,
            percentage_cap: DEFAULT_PERCENTAGE_CAP,
        }
    }
}

impl CostSettings {
    pub fn with_rework_factor(self, rework_factor: f64) -> Self {
        Self {
            rework_factor,
            ..self
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(flatten)]
    pub settings: CostSettings,
    /// Additional column names per field, tried after the built-in aliases.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<SemanticField, Vec<String>>,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config: EngineConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config YAML {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_yaml::from_str(contents).context("Parsing config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_rework_factor(self.settings.rework_factor)?;
        ensure!(
            self.settings.percentage_cap > 0.0,
            "percentage_cap must be positive (got {})",
            self.settings.percentage_cap
        );
        Ok(())
    }

    pub fn alias_table(&self) -> AliasTable {
        AliasTable::with_extra(&self.aliases)
    }
}

/// The dashboards accept factors between 1 and 10; any positive value is
/// meaningful to the engine.
pub fn validate_rework_factor(value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value > 0.0,
        "Rework factor must be a positive number (got {value})"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_uses_dashboard_defaults() {
        let config = EngineConfig::from_yaml_str("{}").expect("parse");
        assert_eq!(config.settings, CostSettings::default());
        assert_eq!(config.settings.rework_factor, 3.0);
        assert!(config.aliases.is_empty());
    }

    #[test]
    fn yaml_overrides_settings_and_aliases() {
        let config = EngineConfig::from_yaml_str(
            "rework_factor: 4.5\npenalty_per_note: 10\naliases:\n  chain: [LigneMontage]\n  QuantityInspected: [Sondage]\n",
        )
        .expect("parse");
        assert_eq!(config.settings.rework_factor, 4.5);
        assert_eq!(config.settings.penalty_per_note, 10.0);
        assert_eq!(config.settings.scrap_unit_cost_fallback, 100.0);
        assert_eq!(
            config.aliases.get(&SemanticField::QuantityInspected),
            Some(&vec!["Sondage".to_string()])
        );
        let table = config.alias_table();
        assert_eq!(
            table.aliases(SemanticField::Chain).last().map(|s| s.as_str()),
            Some("LigneMontage")
        );
    }

    #[test]
    fn non_positive_factor_is_rejected() {
        assert!(EngineConfig::from_yaml_str("rework_factor: 0").is_err());
        assert!(validate_rework_factor(-1.0).is_err());
        assert!(validate_rework_factor(2.5).is_ok());
    }

    #[test]
    fn unknown_alias_field_is_rejected() {
        let err = EngineConfig::from_yaml_str("aliases:\n  colour: [x]\n").unwrap_err();
        assert!(format!("{err:#}").contains("colour"));
    }
}
