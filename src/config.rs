use std::path::Path;

use serde::Deserialize;

use crate::alignment::language::LanguageProfile;
use crate::error::ConfigurationError;

/// Alignment tunables, threaded immutably through every stage.
///
/// Every field has a default; JSON files only need the overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    /// Language profile id (`"ja"` or `"en"`).
    pub language: String,
    /// Weight of the log-squared duration prior in the DP cost.
    pub duration_penalty_weight: f64,
    /// Nucleus length, in multiples of the vowel prior, before an
    /// elongation merge is considered.
    pub elongation_threshold_multiplier: f64,
    pub melisma_threshold_seconds: f64,
    /// Alternative melisma trigger relative to the line's median syllable.
    pub melisma_median_multiplier: f64,
    pub vibrato_filter_window_ms: f64,
    /// Boundary disagreements shorter than this are treated as vibrato flicker.
    pub vibrato_min_duration_ms: f64,
    pub scorer_timeout_ms: u64,
    /// Added to every probability when the first search finds no finite path.
    pub probability_floor_epsilon: f32,
    /// Posterior a held vowel must keep to count as sustained.
    pub sustain_probability: f32,
    /// Posterior of a different symbol that counts as a new onset.
    pub onset_spike_probability: f32,
    /// Allow silence to absorb frames before the first and after the last phoneme.
    pub edge_silence: bool,
    pub enable_elongation_merge: bool,
    pub enable_melisma: bool,
    pub enable_vibrato_filter: bool,
    /// Worker threads for batch alignment; 0 uses available parallelism.
    pub worker_threads: usize,
}

impl AlignerConfig {
    pub const DEFAULT_SCORER_TIMEOUT_MS: u64 = 30_000;

    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            context: "read aligner config",
            source,
        })?;
        Self::from_json_str(&data)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let config: Self =
            serde_json::from_str(json).map_err(|source| ConfigurationError::Json {
                context: "parse aligner config",
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        LanguageProfile::by_id(&self.language)?;

        non_negative("duration_penalty_weight", self.duration_penalty_weight)?;
        if !(self.elongation_threshold_multiplier.is_finite()
            && self.elongation_threshold_multiplier >= 1.0)
        {
            return Err(ConfigurationError::invalid(
                "elongation_threshold_multiplier",
                self.elongation_threshold_multiplier,
                "must be a finite value >= 1",
            ));
        }
        positive("melisma_threshold_seconds", self.melisma_threshold_seconds)?;
        positive("melisma_median_multiplier", self.melisma_median_multiplier)?;
        positive("vibrato_filter_window_ms", self.vibrato_filter_window_ms)?;
        positive("vibrato_min_duration_ms", self.vibrato_min_duration_ms)?;
        if self.scorer_timeout_ms == 0 {
            return Err(ConfigurationError::invalid(
                "scorer_timeout_ms",
                self.scorer_timeout_ms,
                "must be > 0",
            ));
        }
        if !(self.probability_floor_epsilon.is_finite()
            && self.probability_floor_epsilon > 0.0
            && self.probability_floor_epsilon < 1.0)
        {
            return Err(ConfigurationError::invalid(
                "probability_floor_epsilon",
                self.probability_floor_epsilon,
                "must be in (0, 1)",
            ));
        }
        unit_interval("sustain_probability", self.sustain_probability)?;
        unit_interval("onset_spike_probability", self.onset_spike_probability)?;
        Ok(())
    }

    pub fn scorer_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.scorer_timeout_ms)
    }
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            language: "ja".to_string(),
            duration_penalty_weight: 1.0,
            elongation_threshold_multiplier: 3.0,
            melisma_threshold_seconds: 1.5,
            melisma_median_multiplier: 3.0,
            vibrato_filter_window_ms: 100.0,
            vibrato_min_duration_ms: 80.0,
            scorer_timeout_ms: Self::DEFAULT_SCORER_TIMEOUT_MS,
            probability_floor_epsilon: 1e-4,
            sustain_probability: 0.5,
            onset_spike_probability: 0.5,
            edge_silence: true,
            enable_elongation_merge: true,
            enable_melisma: true,
            enable_vibrato_filter: true,
            worker_threads: 0,
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigurationError::invalid(field, value, "must be a finite value > 0"))
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigurationError::invalid(field, value, "must be a finite value >= 0"))
    }
}

fn unit_interval(field: &'static str, value: f32) -> Result<(), ConfigurationError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigurationError::invalid(field, value, "must be in (0, 1]"))
    }
}
