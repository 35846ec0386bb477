use super::defaults::*;
use serde::{Deserialize, Serialize};

/// Named preset of year windows and thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MatchProfile {
    /// Duplicate entries inside one catalog (repeated imports)
    SameCatalog,
    /// Different catalogs describing the same edition
    #[default]
    CrossCatalog,
    /// Later printings and reissues of a work
    Reprints,
}

impl MatchProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchProfile::SameCatalog => "same-catalog",
            MatchProfile::CrossCatalog => "cross-catalog",
            MatchProfile::Reprints => "reprints",
        }
    }
}

/// Tier cutoffs on the 0-100 title evidence scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceThresholds {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            high: DEFAULT_HIGH_THRESHOLD,
            medium: DEFAULT_MEDIUM_THRESHOLD,
            low: DEFAULT_LOW_THRESHOLD,
        }
    }
}

/// Weights of the overall dedup score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub title: f64,
    pub author: f64,
    pub year: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE_WEIGHT,
            author: DEFAULT_AUTHOR_WEIGHT,
            year: DEFAULT_YEAR_WEIGHT,
        }
    }
}

/// Profile-dependent matching knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchTuning {
    pub year_tolerance: u32,
    pub similarity_threshold: f64,
    pub confidence_thresholds: ConfidenceThresholds,
}

impl Default for MatchTuning {
    fn default() -> Self {
        Self::cross_catalog()
    }
}

impl MatchTuning {
    pub fn from_profile(profile: MatchProfile) -> Self {
        match profile {
            MatchProfile::SameCatalog => Self::same_catalog(),
            MatchProfile::CrossCatalog => Self::cross_catalog(),
            MatchProfile::Reprints => Self::reprints(),
        }
    }

    /// Tight year window for duplicate imports of the same entry.
    pub fn same_catalog() -> Self {
        Self {
            year_tolerance: 5,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            confidence_thresholds: ConfidenceThresholds::default(),
        }
    }

    pub fn cross_catalog() -> Self {
        Self {
            year_tolerance: DEFAULT_YEAR_TOLERANCE,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            confidence_thresholds: ConfidenceThresholds::default(),
        }
    }

    /// Reprints keep the title but drift in date; accept a looser medium tier.
    pub fn reprints() -> Self {
        Self {
            year_tolerance: 10,
            similarity_threshold: 80.0,
            confidence_thresholds: ConfidenceThresholds {
                high: DEFAULT_HIGH_THRESHOLD,
                medium: 70.0,
                low: DEFAULT_LOW_THRESHOLD,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_keep_threshold_order() {
        for profile in [
            MatchProfile::SameCatalog,
            MatchProfile::CrossCatalog,
            MatchProfile::Reprints,
        ] {
            let tuning = MatchTuning::from_profile(profile);
            let t = tuning.confidence_thresholds;
            assert!(t.low <= t.medium && t.medium <= t.high, "{}", profile.as_str());
        }
    }

    #[test]
    fn test_year_windows_by_profile() {
        assert_eq!(MatchTuning::same_catalog().year_tolerance, 5);
        assert_eq!(MatchTuning::cross_catalog().year_tolerance, 30);
        assert_eq!(MatchTuning::reprints().year_tolerance, 10);
    }
}
