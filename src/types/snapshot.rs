//! One poll of the simulator and the command written back

use serde::{Deserialize, Serialize};

use crate::types::ArchitectureMode;

/// Identifier of one of the three table objects (1-based on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(u8);

impl ObjectId {
    pub const ALL: [ObjectId; 3] = [ObjectId(1), ObjectId(2), ObjectId(3)];

    /// Build from the wire value; 0 and anything above 3 mean "no object"
    pub fn new(id: i32) -> Option<Self> {
        match id {
            1..=3 => Some(Self(id as u8)),
            _ => None,
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based slot for per-object arrays
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::new(index as i32 + 1)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who performed an action on an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Agent {
    Robot,
    Human,
}

/// Grasp and place flags of one agent, per object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEvents {
    pub grasp: [bool; 3],
    pub place: [bool; 3],
}

impl AgentEvents {
    pub fn grasped(&self, object: ObjectId) -> bool {
        self.grasp[object.index()]
    }

    pub fn placed(&self, object: ObjectId) -> bool {
        self.place[object.index()]
    }
}

/// Counters reported by the scene for the trial summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialCounters {
    pub replanning: i32,
    pub collisions: i32,
    pub robot_idle_time: f64,
    pub human_idle_time: f64,
    pub common_grasp: bool,
}

impl std::fmt::Display for TrialCounters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "replanning={} collisions={} robot_idle={:.2}s human_idle={:.2}s common_grasp={}",
            self.replanning,
            self.collisions,
            self.robot_idle_time,
            self.human_idle_time,
            self.common_grasp
        )
    }
}

/// Incoming signals as read in a single poll
///
/// A snapshot is never patched in place: the loop builds a new one every
/// cycle so all fields belong to the same poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub sim_started: bool,
    /// Presence of object 1..3 in the workspace
    pub objects: [bool; 3],
    pub hand_y: f64,
    pub hand_proximity: f64,
    pub robot_approaching: bool,
    pub robot: AgentEvents,
    pub human: AgentEvents,
    pub can_be_restarted: bool,
    pub counters: TrialCounters,
}

impl SignalSnapshot {
    pub fn is_present(&self, object: ObjectId) -> bool {
        self.objects[object.index()]
    }

    /// True while at least one object is still on the table
    pub fn any_object_present(&self) -> bool {
        self.objects.iter().any(|present| *present)
    }

    pub fn events(&self, agent: Agent) -> &AgentEvents {
        match agent {
            Agent::Robot => &self.robot,
            Agent::Human => &self.human,
        }
    }

    /// Return to the power-on state
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Values the loop writes back every cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingCommand {
    pub start_sim: bool,
    /// 0 = none, 1..3 = object id
    pub target_object: u8,
    pub restart: bool,
    pub mode: ArchitectureMode,
}

impl OutgoingCommand {
    pub fn new(mode: ArchitectureMode) -> Self {
        Self {
            start_sim: false,
            target_object: 0,
            restart: false,
            mode,
        }
    }

    pub fn target(&self) -> Option<ObjectId> {
        ObjectId::new(i32::from(self.target_object))
    }

    pub fn set_target(&mut self, target: Option<ObjectId>) {
        self.target_object = target.map_or(0, ObjectId::get);
    }

    /// Keep the mode, drop everything else
    pub fn clear(&mut self) {
        *self = Self::new(self.mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_wire_range() {
        assert_eq!(ObjectId::new(0), None);
        assert_eq!(ObjectId::new(4), None);
        assert_eq!(ObjectId::new(-1), None);
        assert_eq!(ObjectId::new(2).map(ObjectId::index), Some(1));
        assert_eq!(ObjectId::from_index(2).map(ObjectId::get), Some(3));
    }

    #[test]
    fn test_any_object_present() {
        let mut snapshot = SignalSnapshot::default();
        assert!(!snapshot.any_object_present());
        snapshot.objects[2] = true;
        assert!(snapshot.any_object_present());
        snapshot.clear();
        assert!(!snapshot.any_object_present());
    }

    #[test]
    fn test_command_clear_keeps_mode() {
        let mut command = OutgoingCommand::new(ArchitectureMode::ActionLikelihood);
        command.start_sim = true;
        command.set_target(ObjectId::new(2));
        command.clear();
        assert_eq!(command, OutgoingCommand::new(ArchitectureMode::ActionLikelihood));
    }
}
