//! Handover: signal synchronization loop for human-robot joint action
//!
//! Simulator signals → filters → intention field → target decision → simulator

pub mod config;
pub mod core;
pub mod error;
pub mod types;

// =============================================================================
// LOOP CADENCE
// =============================================================================

/// Default period of the read → decide → write cycle (milliseconds)
pub const COMMS_PERIOD_MS: u64 = 10;

/// Pause between two polls of a lifecycle wait (milliseconds)
pub const PHASE_POLL_MS: u64 = 10;

/// How long to keep the loop alive after the last trial (milliseconds)
pub const FINISH_LINGER_MS: u64 = 10_000;

/// Trials run per session unless configured otherwise
pub const DEFAULT_TRIALS: u32 = 20;

/// Number of objects on the table; a trial ends after this many placements
pub const OBJECT_COUNT: usize = 3;

// =============================================================================
// DENOISING
// =============================================================================

/// Raw reads per majority vote of a presence signal
pub const MAJORITY_SAMPLE_SIZE: usize = 5;

/// Smoothing factor for hand telemetry
pub const EMA_ALPHA: f64 = 0.2;

/// Accepted `hand_y` range (inclusive)
pub const HAND_Y_RANGE: (f64, f64) = (0.1, 90.0);

/// Accepted `hand_proximity` range (inclusive)
pub const HAND_PROXIMITY_RANGE: (f64, f64) = (0.1, 20.0);

/// Raw telemetry value meaning "no reading"
pub const NO_READING_SENTINEL: f64 = -1.0;

/// Largest accepted hand displacement between two cycles
pub const JUMP_REJECT_THRESHOLD: f64 = 0.9;

// =============================================================================
// INTENTION FIELD
// =============================================================================

/// Length of the circular encoding axis
pub const FIELD_SIZE: f64 = 50.0;

/// Anchor positions on the field axis, in evaluation order (object 1, 2, 3)
pub const OBJECT_ANCHORS: [f64; OBJECT_COUNT] = [37.5, 25.0, 12.5];

/// Width of object and hand stimuli
pub const STIMULUS_SIGMA: f64 = 3.0;

/// Amplitude of a live object anchor
pub const ANCHOR_AMPLITUDE: f64 = 5.0;

/// Lower bound on hand distance when converting it to closeness
pub const CLOSENESS_SAFE_ZONE: f64 = 0.1;

/// Prediction horizon of the action-likelihood estimator (seconds)
pub const LIKELIHOOD_TAU: f64 = 0.1;

/// Spatial spread of the action-likelihood estimator
pub const LIKELIHOOD_SIGMA: f64 = 0.1;

// =============================================================================
// MONITOR
// =============================================================================

/// Journal records and poses the status monitor keeps in memory
pub const MONITOR_JOURNAL_CAPACITY: usize = 1_000;

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
