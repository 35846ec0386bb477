//! Unified configuration for catalink resolution runs.
//!
//! Configuration is loaded with precedence: CLI args > Env vars > Config file > Profile > Defaults
//!
//! # Example config file (catalink.toml)
//! ```toml
//! profile = "same-catalog"
//! similarity_threshold = 88.0
//!
//! [confidence_thresholds]
//! high = 90.0
//! medium = 78.0
//! low = 60.0
//!
//! [checkpoint]
//! path = "/var/lib/catalink/match.ckpt"
//! every = 250
//! ```
//!
//! Environment variables use the `CATALINK_` prefix with `__` between
//! nesting levels, e.g. `CATALINK_CONFIDENCE_THRESHOLDS__HIGH=90`.

pub mod defaults;
mod tuning;

pub use defaults::*;
pub use tuning::*;

use crate::normalize::YearBounds;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration of a resolution run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Preset that seeds year windows and thresholds
    pub profile: MatchProfile,
    /// Dedup union cutoff on the overall score (0-100)
    pub similarity_threshold: f64,
    /// Cross-catalog year agreement window
    pub year_tolerance: u32,
    /// Graded year window of the dedup score
    pub dedup_year_tolerance: u32,
    /// Words in the title prefix block key
    pub title_prefix_length: usize,
    /// Blocking fan-out cap
    pub max_candidates_per_record: usize,
    /// Surname ratio cutoff (0-100)
    pub author_match_threshold: f64,
    pub confidence_thresholds: ConfidenceThresholds,
    pub weights: ScoreWeights,
    /// Escalate ambiguous pairs to the arbitration oracle
    pub use_arbitration: bool,
    pub arbitration: ArbitrationConfig,
    pub checkpoint: CheckpointConfig,
    /// Nearest neighbours pulled from an embedding store
    pub embedding_top_k: usize,
    pub year_bounds: YearBounds,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        let tuning = MatchTuning::cross_catalog();
        Self {
            profile: MatchProfile::CrossCatalog,
            similarity_threshold: tuning.similarity_threshold,
            year_tolerance: tuning.year_tolerance,
            dedup_year_tolerance: DEFAULT_DEDUP_YEAR_TOLERANCE,
            title_prefix_length: DEFAULT_TITLE_PREFIX_LENGTH,
            max_candidates_per_record: DEFAULT_MAX_CANDIDATES_PER_RECORD,
            author_match_threshold: DEFAULT_AUTHOR_MATCH_THRESHOLD,
            confidence_thresholds: tuning.confidence_thresholds,
            weights: ScoreWeights::default(),
            use_arbitration: false,
            arbitration: ArbitrationConfig::default(),
            checkpoint: CheckpointConfig::default(),
            embedding_top_k: DEFAULT_EMBEDDING_TOP_K,
            year_bounds: YearBounds::default(),
        }
    }
}

impl ResolverConfig {
    /// Defaults seeded from a profile preset.
    pub fn for_profile(profile: MatchProfile) -> Self {
        let tuning = MatchTuning::from_profile(profile);
        Self {
            profile,
            similarity_threshold: tuning.similarity_threshold,
            year_tolerance: tuning.year_tolerance,
            confidence_thresholds: tuning.confidence_thresholds,
            ..Self::default()
        }
    }

    /// Load configuration with precedence: CLI args > Env > File > Profile > Defaults
    ///
    /// # Arguments
    /// * `config_path` - Optional path to TOML config file
    /// * `overrides` - CLI overrides to apply on top
    pub fn load(
        config_path: Option<&Path>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        // The profile itself may come from any layer, so resolve it first.
        let profile: MatchProfile = Self::layered(Self::default(), config_path, &overrides)
            .extract_inner("profile")?;

        let config: Self =
            Self::layered(Self::for_profile(profile), config_path, &overrides).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment and optional config file only (no CLI overrides)
    pub fn from_env(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load(config_path, ConfigOverrides::default())
    }

    fn layered(base: Self, config_path: Option<&Path>, overrides: &ConfigOverrides) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(base));

        // Layer 1: Config file (if provided)
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Layer 2: Environment variables with CATALINK_ prefix
        figment = figment.merge(Env::prefixed("CATALINK_").split("__"));

        // Layer 3: CLI overrides
        figment.merge(Serialized::defaults(overrides))
    }

    /// Reject threshold and sizing misconfiguration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_percent("similarity_threshold", self.similarity_threshold)?;
        check_percent("author_match_threshold", self.author_match_threshold)?;

        let t = &self.confidence_thresholds;
        check_percent("confidence_thresholds.high", t.high)?;
        check_percent("confidence_thresholds.medium", t.medium)?;
        check_percent("confidence_thresholds.low", t.low)?;
        if t.medium > t.high {
            return Err(ConfigError::invalid(
                "confidence_thresholds.medium",
                t.medium,
                format!("must not exceed high ({})", t.high),
            ));
        }
        if t.low > t.medium {
            return Err(ConfigError::invalid(
                "confidence_thresholds.low",
                t.low,
                format!("must not exceed medium ({})", t.medium),
            ));
        }

        let w = &self.weights;
        for (field, value) in [
            ("weights.title", w.title),
            ("weights.author", w.author),
            ("weights.year", w.year),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(field, value, "must be a non-negative number"));
            }
        }
        if w.title + w.author + w.year <= 0.0 {
            return Err(ConfigError::invalid(
                "weights",
                w.title + w.author + w.year,
                "at least one weight must be positive",
            ));
        }

        check_positive("title_prefix_length", self.title_prefix_length)?;
        check_positive("max_candidates_per_record", self.max_candidates_per_record)?;
        check_positive("checkpoint.every", self.checkpoint.every)?;
        check_positive("arbitration.max_concurrency", self.arbitration.max_concurrency)?;
        check_positive(
            "arbitration.requests_per_second",
            self.arbitration.requests_per_second as usize,
        )?;
        check_positive("arbitration.timeout_secs", self.arbitration.timeout_secs as usize)?;
        if self.arbitration.max_retries > 1 {
            return Err(ConfigError::invalid(
                "arbitration.max_retries",
                self.arbitration.max_retries,
                "at most one retry is allowed",
            ));
        }

        if self.year_bounds.min > self.year_bounds.max {
            return Err(ConfigError::invalid(
                "year_bounds.min",
                self.year_bounds.min,
                format!("must not exceed year_bounds.max ({})", self.year_bounds.max),
            ));
        }
        Ok(())
    }
}

fn check_percent(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, value, "must be within 0-100"))
    }
}

fn check_positive(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::invalid(field, value, "must be at least 1"))
    } else {
        Ok(())
    }
}

/// Arbitration oracle adapter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrationConfig {
    /// Messages endpoint URL
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Per-call timeout (seconds)
    pub timeout_secs: u64,
    /// Retries after a transport failure
    pub max_retries: u32,
    /// Concurrent in-flight calls
    pub max_concurrency: usize,
    pub requests_per_second: u32,
    pub max_tokens: u32,
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ARBITRATION_ENDPOINT.to_string(),
            model: DEFAULT_ARBITRATION_MODEL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout_secs: DEFAULT_ARBITRATION_TIMEOUT_SECS,
            max_retries: DEFAULT_ARBITRATION_MAX_RETRIES,
            max_concurrency: DEFAULT_ARBITRATION_CONCURRENCY,
            requests_per_second: DEFAULT_ARBITRATION_RPS,
            max_tokens: DEFAULT_ARBITRATION_MAX_TOKENS,
        }
    }
}

/// Checkpointing of cross-catalog match results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Snapshot file; checkpointing is off when unset
    pub path: Option<PathBuf>,
    /// Source records processed between flushes
    pub every: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: None,
            every: DEFAULT_CHECKPOINT_EVERY,
        }
    }
}

/// CLI overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<MatchProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_tolerance: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_candidates_per_record: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_arbitration: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<CheckpointOverrides>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub every: Option<usize>,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] figment::Error),
    #[error("invalid configuration: {field} = {value} ({reason})")]
    Invalid {
        field: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(
        field: &'static str,
        value: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Self::Invalid {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        let config = ResolverConfig::default();
        assert_eq!(config.profile, MatchProfile::CrossCatalog);
        assert_eq!(config.similarity_threshold, DEFAULT_SIMILARITY_THRESHOLD);
        assert_eq!(config.year_tolerance, 30);
        assert_eq!(config.checkpoint.every, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_profile_serde() {
        let json = serde_json::to_string(&MatchProfile::SameCatalog).unwrap();
        assert_eq!(json, "\"same-catalog\"");

        let profile: MatchProfile = serde_json::from_str("\"reprints\"").unwrap();
        assert_eq!(profile, MatchProfile::Reprints);
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let mut config = ResolverConfig::default();
        config.confidence_thresholds.low = 80.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("confidence_thresholds.low"));

        let mut config = ResolverConfig::default();
        config.similarity_threshold = 120.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_layered_loading() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "catalink.toml",
                r#"
                profile = "same-catalog"
                title_prefix_length = 2

                [confidence_thresholds]
                high = 90.0
                "#,
            )?;
            jail.set_env("CATALINK_CONFIDENCE_THRESHOLDS__MEDIUM", "80");
            jail.set_env("CATALINK_USE_ARBITRATION", "true");

            let overrides = ConfigOverrides {
                similarity_threshold: Some(92.0),
                ..Default::default()
            };
            let config =
                ResolverConfig::load(Some(Path::new("catalink.toml")), overrides).unwrap();

            assert_eq!(config.profile, MatchProfile::SameCatalog);
            // Seeded by the profile, untouched by other layers.
            assert_eq!(config.year_tolerance, 5);
            assert_eq!(config.title_prefix_length, 2);
            assert_eq!(config.confidence_thresholds.high, 90.0);
            assert_eq!(config.confidence_thresholds.medium, 80.0);
            assert_eq!(config.confidence_thresholds.low, DEFAULT_LOW_THRESHOLD);
            assert!(config.use_arbitration);
            assert_eq!(config.similarity_threshold, 92.0);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "catalink.toml",
                r#"
                [confidence_thresholds]
                high = 50.0
                "#,
            )?;
            let result = ResolverConfig::from_env(Some(Path::new("catalink.toml")));
            assert!(matches!(result, Err(ConfigError::Invalid { .. })));
            Ok(())
        });
    }
}
