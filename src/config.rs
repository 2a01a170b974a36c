//! Engine configuration
//!
//! All thresholds, intervals and sensitivity settings live in a single typed
//! [`EngineConfig`] injected at session construction. Every field has a
//! documented default, so an empty TOML/JSON document yields a working engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::EngineError;

/// Touch sensitivity profile selected per child
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SensitivityProfile {
    /// Most forgiving: widest tolerance, smallest drag threshold
    Alta,
    #[default]
    Media,
    /// Strictest: narrowest tolerance, largest drag threshold
    Baja,
}

/// Concrete pixel and timing settings of a sensitivity profile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileSettings {
    /// Extra pixels around each element's bounding box
    pub touch_tolerance_outer_px: f64,
    /// Displacement above which a gesture becomes a drag
    pub drag_threshold_px: f64,
    /// Window after a multitouch release in which a new touch-down is ignored
    pub multitouch_debounce_ms: u64,
}

impl SensitivityProfile {
    pub const ALL: [SensitivityProfile; 3] = [
        SensitivityProfile::Alta,
        SensitivityProfile::Media,
        SensitivityProfile::Baja,
    ];

    pub fn settings(self) -> ProfileSettings {
        match self {
            SensitivityProfile::Alta => ProfileSettings {
                touch_tolerance_outer_px: 20.0,
                drag_threshold_px: 5.0,
                multitouch_debounce_ms: 100,
            },
            SensitivityProfile::Media => ProfileSettings {
                touch_tolerance_outer_px: 15.0,
                drag_threshold_px: 10.0,
                multitouch_debounce_ms: 150,
            },
            SensitivityProfile::Baja => ProfileSettings {
                touch_tolerance_outer_px: 10.0,
                drag_threshold_px: 15.0,
                multitouch_debounce_ms: 200,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SensitivityProfile::Alta => "alta",
            SensitivityProfile::Media => "media",
            SensitivityProfile::Baja => "baja",
        }
    }
}

impl fmt::Display for SensitivityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensitivityProfile {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alta" | "high" => Ok(SensitivityProfile::Alta),
            "media" | "medium" => Ok(SensitivityProfile::Media),
            "baja" | "low" => Ok(SensitivityProfile::Baja),
            _ => Err(EngineError::UnknownProfile(format!(
                "'{s}' (expected one of: alta, media, baja)"
            ))),
        }
    }
}

impl TryFrom<String> for SensitivityProfile {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SensitivityProfile> for String {
    fn from(profile: SensitivityProfile) -> Self {
        profile.as_str().to_string()
    }
}

/// Score bands on the 0-100 scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Below this a remote "help" recommendation is ignored
    pub frustration_low: f64,
    pub frustration_medium: f64,
    pub frustration_high: f64,
    /// Engagement below this suggests changing the activity
    pub disengagement_threshold: f64,
    /// Remote results below this confidence (0-1) are ignored
    pub min_remote_confidence: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            frustration_low: 30.0,
            frustration_medium: 60.0,
            frustration_high: 80.0,
            disengagement_threshold: 20.0,
            min_remote_confidence: 0.7,
        }
    }
}

/// Rolling window bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Maximum number of records kept
    pub capacity: usize,
    /// Records older than this are evicted
    pub max_age_ms: u64,
    /// Fewer records than this means "insufficient data"
    pub minimum_sample_size: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            capacity: 120,
            max_age_ms: 120_000,
            minimum_sample_size: 5,
        }
    }
}

/// Intervals that govern debounce, cooldown and evaluation cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Interactions closer than this to the previous accepted one are dropped
    pub debounce_ms: u64,
    /// Minimum gap between two emitted suggestions
    pub cooldown_ms: u64,
    /// Periodic evaluation interval
    pub evaluation_interval_ms: u64,
    /// Evaluate after every Nth accepted interaction
    pub evaluate_every_n: usize,
    /// Upper bound on the remote analysis call
    pub remote_timeout_ms: u64,
    /// How long a high interaction rate must last to count as overstimulation
    pub overstimulation_sustain_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            cooldown_ms: 60_000,
            evaluation_interval_ms: 30_000,
            evaluate_every_n: 5,
            remote_timeout_ms: 2_000,
            overstimulation_sustain_ms: 300_000,
        }
    }
}

impl TimingConfig {
    pub fn debounce(&self) -> chrono::Duration {
        millis(self.debounce_ms)
    }

    pub fn cooldown(&self) -> chrono::Duration {
        millis(self.cooldown_ms)
    }

    pub fn evaluation_interval(&self) -> chrono::Duration {
        millis(self.evaluation_interval_ms)
    }

    pub fn overstimulation_sustain(&self) -> chrono::Duration {
        millis(self.overstimulation_sustain_ms)
    }

    pub fn remote_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.remote_timeout_ms)
    }
}

/// Parameters of the local scoring heuristic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Precision below this counts as a miss
    pub low_precision_threshold: f64,
    /// Misses in the window that push frustration into the high band
    pub frustration_run_length: usize,
    /// Precision above this counts toward a celebration streak
    pub celebration_precision: f64,
    /// Consecutive precise interactions needed to celebrate
    pub celebration_run_length: usize,
    /// Interaction rate considered overstimulating (per second)
    pub overstimulation_rate_per_sec: f64,
    /// Rate at which the pace component of engagement saturates
    pub engagement_reference_rate: f64,
    /// Distance from the ideal point at which precision reaches zero
    pub max_relevant_distance_px: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            low_precision_threshold: 0.3,
            frustration_run_length: 15,
            celebration_precision: 0.9,
            celebration_run_length: 25,
            overstimulation_rate_per_sec: 100.0 / 60.0,
            engagement_reference_rate: 1.0,
            max_relevant_distance_px: 100.0,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sensitivity: SensitivityProfile,
    /// Produce a difficulty recommendation every K completions
    pub difficulty_every_completions: usize,
    pub thresholds: Thresholds,
    pub window: WindowConfig,
    pub timing: TimingConfig,
    pub scoring: ScoringConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sensitivity: SensitivityProfile::default(),
            difficulty_every_completions: 5,
            thresholds: Thresholds::default(),
            window: WindowConfig::default(),
            timing: TimingConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Default configuration with a specific sensitivity profile
    pub fn with_profile(sensitivity: SensitivityProfile) -> Self {
        Self {
            sensitivity,
            ..Self::default()
        }
    }

    /// Settings of the active sensitivity profile
    pub fn profile(&self) -> ProfileSettings {
        self.sensitivity.settings()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(s: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.toml` or `.json` file
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&contents),
            Some("json") => Self::from_json_str(&contents),
            _ => Err(EngineError::Config(format!(
                "unsupported config file extension: {}",
                path.display()
            ))),
        }
    }

    /// Serialize to pretty TOML
    pub fn to_toml_string(&self) -> Result<String, EngineError> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Check every value is in range. Returns the first violation.
    pub fn validate(&self) -> Result<(), EngineError> {
        let t = &self.thresholds;
        for (name, value) in [
            ("thresholds.frustration_low", t.frustration_low),
            ("thresholds.frustration_medium", t.frustration_medium),
            ("thresholds.frustration_high", t.frustration_high),
            ("thresholds.disengagement_threshold", t.disengagement_threshold),
        ] {
            require_range(name, value, 0.0, 100.0)?;
        }
        if !(t.frustration_low < t.frustration_medium && t.frustration_medium < t.frustration_high)
        {
            return Err(EngineError::Config(format!(
                "frustration bands must increase strictly (got {}/{}/{})",
                t.frustration_low, t.frustration_medium, t.frustration_high
            )));
        }
        require_range("thresholds.min_remote_confidence", t.min_remote_confidence, 0.0, 1.0)?;

        let w = &self.window;
        require_positive_count("window.capacity", w.capacity)?;
        require_positive_count("window.minimum_sample_size", w.minimum_sample_size)?;
        if w.minimum_sample_size > w.capacity {
            return Err(EngineError::Config(format!(
                "window.minimum_sample_size ({}) exceeds window.capacity ({})",
                w.minimum_sample_size, w.capacity
            )));
        }
        if w.max_age_ms == 0 {
            return Err(EngineError::Config("window.max_age_ms must be > 0".to_string()));
        }

        let timing = &self.timing;
        require_positive_count("timing.evaluate_every_n", timing.evaluate_every_n)?;
        if timing.evaluation_interval_ms == 0 {
            return Err(EngineError::Config(
                "timing.evaluation_interval_ms must be > 0".to_string(),
            ));
        }
        if timing.remote_timeout_ms == 0 {
            return Err(EngineError::Config(
                "timing.remote_timeout_ms must be > 0".to_string(),
            ));
        }

        let s = &self.scoring;
        require_range("scoring.low_precision_threshold", s.low_precision_threshold, 0.0, 1.0)?;
        require_range("scoring.celebration_precision", s.celebration_precision, 0.0, 1.0)?;
        require_positive_count("scoring.frustration_run_length", s.frustration_run_length)?;
        require_positive_count("scoring.celebration_run_length", s.celebration_run_length)?;
        for (name, value) in [
            ("scoring.overstimulation_rate_per_sec", s.overstimulation_rate_per_sec),
            ("scoring.engagement_reference_rate", s.engagement_reference_rate),
            ("scoring.max_relevant_distance_px", s.max_relevant_distance_px),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(EngineError::Config(format!("{name} must be > 0 (got {value})")));
            }
        }

        require_positive_count("difficulty_every_completions", self.difficulty_every_completions)?;
        Ok(())
    }
}

fn millis(ms: u64) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

fn require_range(name: &str, value: f64, min: f64, max: f64) -> Result<(), EngineError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(EngineError::Config(format!(
            "{name} must be within {min}..={max} (got {value})"
        )))
    }
}

fn require_positive_count(name: &str, value: usize) -> Result<(), EngineError> {
    if value == 0 {
        Err(EngineError::Config(format!("{name} must be >= 1")))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_profile_ordering_invariant() {
        let alta = SensitivityProfile::Alta.settings();
        let media = SensitivityProfile::Media.settings();
        let baja = SensitivityProfile::Baja.settings();

        assert!(alta.touch_tolerance_outer_px > media.touch_tolerance_outer_px);
        assert!(media.touch_tolerance_outer_px > baja.touch_tolerance_outer_px);
        assert!(alta.drag_threshold_px < media.drag_threshold_px);
        assert!(media.drag_threshold_px < baja.drag_threshold_px);
    }

    #[test]
    fn test_profile_values() {
        let tolerances: Vec<f64> = SensitivityProfile::ALL
            .iter()
            .map(|p| p.settings().touch_tolerance_outer_px)
            .collect();
        let drags: Vec<f64> = SensitivityProfile::ALL
            .iter()
            .map(|p| p.settings().drag_threshold_px)
            .collect();

        assert_eq!(tolerances, vec![20.0, 15.0, 10.0]);
        assert_eq!(drags, vec![5.0, 10.0, 15.0]);
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!("alta".parse::<SensitivityProfile>().unwrap(), SensitivityProfile::Alta);
        assert_eq!(" Media ".parse::<SensitivityProfile>().unwrap(), SensitivityProfile::Media);
        assert_eq!("low".parse::<SensitivityProfile>().unwrap(), SensitivityProfile::Baja);

        let err = "extrema".parse::<SensitivityProfile>().unwrap_err();
        assert!(matches!(err, EngineError::UnknownProfile(_)));
        assert!(err.to_string().contains("extrema"));
    }

    #[test]
    fn test_empty_documents_yield_defaults() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
        assert_eq!(EngineConfig::from_json_str("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_partial_toml_override() {
        let toml = r#"
            sensitivity = "alta"

            [timing]
            cooldown_ms = 90000

            [thresholds]
            frustration_high = 85.0
        "#;

        let config = EngineConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.sensitivity, SensitivityProfile::Alta);
        assert_eq!(config.timing.cooldown_ms, 90_000);
        assert_eq!(config.timing.debounce_ms, 50);
        assert_eq!(config.thresholds.frustration_high, 85.0);
        assert_eq!(config.thresholds.frustration_medium, 60.0);
    }

    #[test]
    fn test_unknown_profile_fails_fast() {
        let err = EngineConfig::from_json_str(r#"{"sensitivity": "turbo"}"#).unwrap_err();
        assert!(err.to_string().contains("turbo"));
    }

    #[test]
    fn test_unordered_bands_rejected() {
        let json = r#"{"thresholds": {"frustration_medium": 90.0}}"#;
        let err = EngineConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let mut config = EngineConfig::default();
        config.thresholds.min_remote_confidence = 1.5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.window.minimum_sample_size = 500;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.scoring.max_relevant_distance_px = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.timing.evaluate_every_n = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip_of_defaults() {
        let config = EngineConfig::with_profile(SensitivityProfile::Baja);
        let toml = config.to_toml_string().unwrap();
        assert!(toml.contains("sensitivity = \"baja\""));
        assert_eq!(EngineConfig::from_toml_str(&toml).unwrap(), config);
    }
}
