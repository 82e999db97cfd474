//! Decision strategy of the robot

use serde::{Deserialize, Serialize};

/// How the robot picks its next target object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArchitectureMode {
    /// Hand height and proximity drive a single hand stimulus
    #[default]
    HandMotion,
    /// Per-object reach likelihoods drive one stimulus per object
    ActionLikelihood,
    /// The field only sees which objects are present
    NoAnticipation,
    /// No field: lowest-numbered present object
    Baseline,
}

impl ArchitectureMode {
    /// Value written to the `architectureMode` signal
    pub fn tag(&self) -> i32 {
        match self {
            ArchitectureMode::HandMotion => 0,
            ArchitectureMode::ActionLikelihood => 1,
            ArchitectureMode::NoAnticipation => 2,
            ArchitectureMode::Baseline => 3,
        }
    }

    /// Whether the mode consults the intention field at all
    pub fn uses_field(&self) -> bool {
        !matches!(self, ArchitectureMode::Baseline)
    }
}

impl std::fmt::Display for ArchitectureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ArchitectureMode::HandMotion => "HAND_MOTION",
            ArchitectureMode::ActionLikelihood => "ACTION_LIKELIHOOD",
            ArchitectureMode::NoAnticipation => "NO_ANTICIPATION",
            ArchitectureMode::Baseline => "BASELINE",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode() {
        assert_eq!(ArchitectureMode::default(), ArchitectureMode::HandMotion);
        assert_eq!(ArchitectureMode::default().tag(), 0);
    }

    #[test]
    fn test_only_baseline_skips_field() {
        assert!(ArchitectureMode::HandMotion.uses_field());
        assert!(ArchitectureMode::NoAnticipation.uses_field());
        assert!(!ArchitectureMode::Baseline.uses_field());
    }
}
