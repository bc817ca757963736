use std::fs;
use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::parser::{GateVariant, ParseOptions};
use crate::reconcile::DEFAULT_MATCH_TOLERANCE;

pub const DEFAULT_CONFIG_FILE: &str = "crone-ingest.json";
pub const DEFAULT_CLIENT_MARKER: &str = "North American Nickel";
pub const DEFAULT_STATION_SUFFIX: &str = "N";

/// On-disk configuration; every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub match_tolerance: Option<f64>,
    #[serde(default)]
    pub gate_variant: Option<GateVariant>,
    #[serde(default)]
    pub skip_if_survey_exists: Option<bool>,
    #[serde(default)]
    pub client_marker: Option<String>,
    #[serde(default)]
    pub station_label_suffix: Option<String>,
    #[serde(default)]
    pub line_hint_pattern: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub match_tolerance: f64,
    pub gate_variant: GateVariant,
    pub skip_if_survey_exists: bool,
    pub client_marker: String,
    pub station_label_suffix: String,
    pub line_hint_pattern: Option<Regex>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            match_tolerance: DEFAULT_MATCH_TOLERANCE,
            gate_variant: GateVariant::default(),
            skip_if_survey_exists: false,
            client_marker: DEFAULT_CLIENT_MARKER.to_string(),
            station_label_suffix: DEFAULT_STATION_SUFFIX.to_string(),
            line_hint_pattern: None,
        }
    }
}

impl IngestConfig {
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            gate_variant: self.gate_variant,
            client_marker: self.client_marker.clone(),
        }
    }

    /// Line/profile hint taken from a file name with `line_hint_pattern`.
    pub fn line_hint_for(&self, file_name: &str) -> Option<String> {
        let pattern = self.line_hint_pattern.as_ref()?;
        let caps = pattern.captures(file_name)?;
        caps.get(1)
            .or_else(|| caps.get(0))
            .map(|found| found.as_str().to_string())
            .filter(|hint| !hint.is_empty())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `crone-ingest.json` in the working directory when no
    /// path is given. Only an explicitly named file is required to exist.
    pub fn resolve(path: Option<&str>) -> Result<IngestConfig, IngestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(IngestConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| IngestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| IngestError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<IngestConfig, IngestError> {
        let defaults = IngestConfig::default();

        let match_tolerance = config.match_tolerance.unwrap_or(defaults.match_tolerance);
        if !match_tolerance.is_finite() || match_tolerance < 0.0 {
            return Err(IngestError::InvalidConfig(format!(
                "match_tolerance must be a finite, non-negative number (got {match_tolerance})"
            )));
        }

        let line_hint_pattern = config
            .line_hint_pattern
            .map(|pattern| {
                Regex::new(&pattern).map_err(|err| {
                    IngestError::InvalidConfig(format!("line_hint_pattern: {err}"))
                })
            })
            .transpose()?;

        Ok(IngestConfig {
            match_tolerance,
            gate_variant: config.gate_variant.unwrap_or(defaults.gate_variant),
            skip_if_survey_exists: config
                .skip_if_survey_exists
                .unwrap_or(defaults.skip_if_survey_exists),
            client_marker: config.client_marker.unwrap_or(defaults.client_marker),
            station_label_suffix: config
                .station_label_suffix
                .unwrap_or(defaults.station_label_suffix),
            line_hint_pattern,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.match_tolerance, 50.0);
        assert_eq!(resolved.gate_variant, GateVariant::BackwardScan);
        assert!(!resolved.skip_if_survey_exists);
        assert_eq!(resolved.station_label_suffix, "N");
    }

    #[test]
    fn line_hint_uses_first_group() {
        let config = Config {
            line_hint_pattern: Some(r"^(\d+[NSEW])".to_string()),
            ..Config::default()
        };
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.line_hint_for("100EAV.STP").as_deref(), Some("100E"));
        assert_eq!(resolved.line_hint_for("loop.STP"), None);
    }
}
