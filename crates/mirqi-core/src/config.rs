//! MIRQI Configuration Management
//!
//! Handles configuration from environment variables and TOML files,
//! with defaults matching the published MIRQI settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::category::CategoryRegistry;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// MIRQI scoring weights
    pub scoring: ScoringConfig,

    /// Negation and attribute resolution settings
    pub resolver: ResolverConfig,

    /// Built-in phrase detector triggers
    pub detector: DetectorConfig,

    /// Ordered observation categories
    pub categories: CategoryRegistry,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_override()
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Merge with environment variables; every variable that is set wins
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        if let Ok(weight) = std::env::var("MIRQI_POS_WEIGHT") {
            self.scoring.pos_weight = parse_weight("MIRQI_POS_WEIGHT", weight)?;
        }
        if let Ok(weight) = std::env::var("MIRQI_ATTRIBUTE_WEIGHT") {
            self.scoring.attribute_weight = parse_weight("MIRQI_ATTRIBUTE_WEIGHT", weight)?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.json_format = format.eq_ignore_ascii_case("json");
        }

        Ok(self)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scoring.validate()?;
        if self.categories.is_empty() {
            return Err(ConfigError::MissingRequired("categories".to_string()));
        }
        if self.resolver.negative_sentence_pattern.trim().is_empty() {
            return Err(ConfigError::MissingRequired(
                "resolver.negative_sentence_pattern".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_weight(key: &str, value: String) -> Result<f64, ConfigError> {
    match value.parse::<f64>() {
        Ok(weight) if (0.0..=1.0).contains(&weight) => Ok(weight),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
    }
}

/// MIRQI scoring weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Share of the score given to positive/uncertain findings
    pub pos_weight: f64,

    /// Share of a true-positive hit earned through attribute agreement
    pub attribute_weight: f64,
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("scoring.pos_weight", self.pos_weight),
            ("scoring.attribute_weight", self.attribute_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            pos_weight: 0.8,
            attribute_weight: 0.3,
        }
    }
}

/// Negation and attribute resolution settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Concept id that is always negated ("negative")
    pub negative_concept: String,

    /// Concept id that is always uncertain ("suspected")
    pub uncertain_concept: String,

    /// Case-insensitive sentence pattern that negates the whole sentence
    pub negative_sentence_pattern: String,

    /// Dependency labels that bind attribute words
    pub attribute_dependencies: Vec<String>,

    /// POS tags never used as attribute words
    pub excluded_tags: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            negative_concept: "C0332125".to_string(),
            uncertain_concept: "C0332148".to_string(),
            negative_sentence_pattern: r"^(findings|impression): no ".to_string(),
            attribute_dependencies: [
                "amod",
                "nsubj",
                "dep",
                "neg",
                "dobj",
                "conj:or",
                "compound",
                "nmod:within",
                "advmod",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            excluded_tags: vec!["LS".to_string(), "VB".to_string()],
        }
    }
}

/// Trigger phrases for the built-in phrase detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Phrases that open a negation scope
    pub negation_triggers: Vec<String>,

    /// Phrases that open an uncertainty scope
    pub uncertainty_triggers: Vec<String>,

    /// Phrases that close an open scope
    pub scope_terminators: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        fn owned(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        Self {
            negation_triggers: owned(&[
                "no",
                "not",
                "without",
                "negative for",
                "free of",
                "resolution of",
                "resolved",
                "absence of",
                "no evidence of",
                "clear of",
            ]),
            uncertainty_triggers: owned(&[
                "may",
                "possible",
                "possibly",
                "probable",
                "likely",
                "suggest",
                "suggests",
                "suspicious for",
                "cannot be excluded",
                "cannot exclude",
                "concern for",
                "versus",
                "questionable",
            ]),
            scope_terminators: owned(&["but", "however", "although", "which", ";"]),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!((config.scoring.pos_weight - 0.8).abs() < 1e-12);
        assert!((config.scoring.attribute_weight - 0.3).abs() < 1e-12);
        assert_eq!(config.categories.len(), 20);
        assert_eq!(config.resolver.attribute_dependencies.len(), 9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_weight_range() {
        assert!(parse_weight("K", "0.5".to_string()).is_ok());
        assert!(parse_weight("K", "1.5".to_string()).is_err());
        assert!(parse_weight("K", "heavy".to_string()).is_err());
    }

    #[test]
    fn test_scoring_validate() {
        let scoring = ScoringConfig {
            pos_weight: -0.1,
            attribute_weight: 0.3,
        };
        assert!(scoring.validate().is_err());
    }

    #[test]
    fn test_from_file_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[scoring]
pos_weight = 0.6

[resolver]
excluded_tags = ["LS", "VB", "DT"]

[logging]
level = "debug"
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert!((config.scoring.pos_weight - 0.6).abs() < 1e-12);
        assert!((config.scoring.attribute_weight - 0.3).abs() < 1e-12);
        assert_eq!(config.resolver.excluded_tags.len(), 3);
        assert_eq!(config.resolver.negative_concept, "C0332125");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.categories.len(), 20);
    }

    #[test]
    fn test_from_file_custom_categories() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"categories = ["Other Finding", "Edema"]"#).unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.categories.len(), 2);
        assert_eq!(config.categories.index_of("Edema"), Some(1));
    }

    #[test]
    fn test_from_file_rejects_bad_weight() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scoring]\nattribute_weight = 2.0").unwrap();

        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_env_override_wins_even_with_default_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[scoring]
pos_weight = 0.6
attribute_weight = 0.5

[logging]
level = "debug"
json_format = true
"#
        )
        .unwrap();
        let from_file = AppConfig::from_file(file.path()).unwrap();

        // Only this test touches these variables
        let vars = [
            ("MIRQI_POS_WEIGHT", "0.8"),
            ("MIRQI_ATTRIBUTE_WEIGHT", "0.3"),
            ("LOG_LEVEL", "info"),
            ("LOG_FORMAT", "text"),
        ];
        for (key, value) in vars {
            std::env::set_var(key, value);
        }
        let merged = from_file.clone().with_env_override();
        std::env::set_var("MIRQI_POS_WEIGHT", "1.7");
        let rejected = from_file.with_env_override();
        for (key, _) in vars {
            std::env::remove_var(key);
        }

        let merged = merged.unwrap();
        assert!((merged.scoring.pos_weight - 0.8).abs() < 1e-12);
        assert!((merged.scoring.attribute_weight - 0.3).abs() < 1e-12);
        assert_eq!(merged.logging.level, "info");
        assert!(!merged.logging.json_format);
        assert!(matches!(rejected, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_from_file_missing() {
        let err = AppConfig::from_file("/nonexistent/mirqi.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }
}
