//! Experiment lifecycle phases

use serde::{Deserialize, Serialize};

/// Coarse lifecycle stage of a session
///
/// Phases only move forward within a trial. A new trial re-enters
/// `AwaitingSimStart`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Simulator not reachable yet
    AwaitingConnection,
    /// Start flag written, waiting for `simStarted`
    AwaitingSimStart,
    /// Scene running, waiting for objects to spawn
    AwaitingObjects,
    /// Full decision logic active
    Running,
    /// Loop stopped, session torn down or failed
    Finished,
}

impl Phase {
    /// Decision logic only runs in this phase
    pub fn is_running(&self) -> bool {
        *self == Phase::Running
    }

    pub fn is_finished(&self) -> bool {
        *self == Phase::Finished
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::AwaitingConnection => "AWAITING_CONNECTION",
            Phase::AwaitingSimStart => "AWAITING_SIM_START",
            Phase::AwaitingObjects => "AWAITING_OBJECTS",
            Phase::Running => "RUNNING",
            Phase::Finished => "FINISHED",
        };
        write!(f, "{}", name)
    }
}
