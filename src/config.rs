//! Session configuration
//!
//! Defaults come from the constants in the crate root. A JSON file can
//! override any subset of fields; CLI flags are applied on top by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExperimentError;
use crate::types::ArchitectureMode;
use crate::{
    ANCHOR_AMPLITUDE, CLOSENESS_SAFE_ZONE, COMMS_PERIOD_MS, DEFAULT_TRIALS, EMA_ALPHA,
    FIELD_SIZE, FINISH_LINGER_MS, HAND_PROXIMITY_RANGE, HAND_Y_RANGE, JUMP_REJECT_THRESHOLD,
    LIKELIHOOD_SIGMA, LIKELIHOOD_TAU, MAJORITY_SAMPLE_SIZE, OBJECT_ANCHORS, PHASE_POLL_MS,
    STIMULUS_SIGMA,
};

/// Inclusive range used by the validity gates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

impl From<(f64, f64)> for Range {
    fn from((min, max): (f64, f64)) -> Self {
        Self::new(min, max)
    }
}

/// Where the hand stimulus of HAND_MOTION mode comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandSource {
    /// `hand_y` / `hand_proximity` signals published by the scene
    #[default]
    Signals,
    /// Tracked controller pose, encoded as closeness to the table
    Pose,
}

/// Filter tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub majority_sample_size: usize,
    pub ema_alpha: f64,
    pub hand_y_range: Range,
    pub hand_proximity_range: Range,
    pub jump_threshold: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            majority_sample_size: MAJORITY_SAMPLE_SIZE,
            ema_alpha: EMA_ALPHA,
            hand_y_range: HAND_Y_RANGE.into(),
            hand_proximity_range: HAND_PROXIMITY_RANGE.into(),
            jump_threshold: JUMP_REJECT_THRESHOLD,
        }
    }
}

/// Layout of the intention field axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    pub size: f64,
    /// Anchor of object 1, 2, 3 in that order
    pub anchors: [f64; 3],
    pub stimulus_sigma: f64,
    pub anchor_amplitude: f64,
    pub safe_zone: f64,
    pub likelihood_tau: f64,
    pub likelihood_sigma: f64,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            size: FIELD_SIZE,
            anchors: OBJECT_ANCHORS,
            stimulus_sigma: STIMULUS_SIGMA,
            anchor_amplitude: ANCHOR_AMPLITUDE,
            safe_zone: CLOSENESS_SAFE_ZONE,
            likelihood_tau: LIKELIHOOD_TAU,
            likelihood_sigma: LIKELIHOOD_SIGMA,
        }
    }
}

/// Everything needed to run one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub mode: ArchitectureMode,
    pub hand_source: HandSource,
    pub comms_period_ms: u64,
    pub phase_poll_ms: u64,
    pub trials: u32,
    pub linger_ms: u64,
    /// Poll the hand pose on its own connection and thread
    pub separate_pose_channel: bool,
    pub output_dir: PathBuf,
    pub filters: FilterConfig,
    pub field: FieldConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            mode: ArchitectureMode::default(),
            hand_source: HandSource::default(),
            comms_period_ms: COMMS_PERIOD_MS,
            phase_poll_ms: PHASE_POLL_MS,
            trials: DEFAULT_TRIALS,
            linger_ms: FINISH_LINGER_MS,
            separate_pose_channel: false,
            output_dir: PathBuf::from("./output"),
            filters: FilterConfig::default(),
            field: FieldConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Read a JSON file; missing fields keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ExperimentError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn comms_period(&self) -> Duration {
        Duration::from_millis(self.comms_period_ms)
    }

    pub fn phase_poll(&self) -> Duration {
        Duration::from_millis(self.phase_poll_ms)
    }

    pub fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }

    /// Reject values the loop cannot work with
    pub fn validate(&self) -> Result<(), ExperimentError> {
        let invalid = |details: &str| {
            Err(ExperimentError::InvalidConfig {
                details: details.to_string(),
            })
        };

        if self.trials == 0 {
            return invalid("trials must be at least 1");
        }
        if self.filters.majority_sample_size == 0 {
            return invalid("majority_sample_size must be at least 1");
        }
        if !(self.filters.ema_alpha > 0.0 && self.filters.ema_alpha <= 1.0) {
            return invalid("ema_alpha must be in (0, 1]");
        }
        if self.field.size <= 0.0 {
            return invalid("field size must be positive");
        }
        if self
            .field
            .anchors
            .iter()
            .any(|anchor| *anchor < 0.0 || *anchor > self.field.size)
        {
            return invalid("anchors must lie on the field axis");
        }
        Ok(())
    }
}
