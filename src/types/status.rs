//! Live status published by the loop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ArchitectureMode, Phase};

/// State of the session as of the last completed cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopStatus {
    pub timestamp: DateTime<Utc>,
    pub phase: Phase,
    pub mode: ArchitectureMode,
    /// 1-based trial in progress
    pub trial: u32,
    pub trials_total: u32,
    pub target_object: u8,
    pub place_count: usize,
    pub objects: [bool; 3],
    pub cycles: u64,
    pub loop_alive: bool,
}

impl LoopStatus {
    pub fn new(mode: ArchitectureMode, trials_total: u32) -> Self {
        Self {
            timestamp: Utc::now(),
            phase: Phase::AwaitingConnection,
            mode,
            trial: 1,
            trials_total,
            target_object: 0,
            place_count: 0,
            objects: [false; 3],
            cycles: 0,
            loop_alive: false,
        }
    }

    /// Single-line form for the console
    pub fn to_parseable_string(&self) -> String {
        format!(
            "phase={} | trial={}/{} | target={} | placed={} | cycles={}",
            self.phase, self.trial, self.trials_total, self.target_object, self.place_count, self.cycles
        )
    }
}
