//! Simulator signal namespace
//!
//! Names are case-sensitive and must match the scene scripts exactly.

pub const START_SIM: &str = "startSim";
pub const SIM_STARTED: &str = "simStarted";
pub const TARGET_OBJECT: &str = "targetObject";
pub const ARCHITECTURE_MODE: &str = "architectureMode";
pub const CAN_BE_RESTARTED: &str = "canBeRestarted";
pub const RESTART: &str = "restart";

pub const OBJECT_EXISTS: [&str; 3] = ["object1", "object2", "object3"];

pub const HAND_Y: &str = "hand_y";
pub const HAND_PROXIMITY: &str = "hand_proximity";

pub const ROBOT_APPROACHING: &str = "robotApproaching";

/// Aggregate flags of older scenes; only zeroed at session start
pub const OBJECT_GRASPED: &str = "objectGrasped";
pub const OBJECT_PLACED: &str = "objectPlaced";

pub const ROBOT_GRASP: [&str; 3] = ["robotGraspObj1", "robotGraspObj2", "robotGraspObj3"];
pub const ROBOT_PLACE: [&str; 3] = ["robotPlaceObj1", "robotPlaceObj2", "robotPlaceObj3"];
pub const HUMAN_GRASP: [&str; 3] = ["humanGraspObj1", "humanGraspObj2", "humanGraspObj3"];
pub const HUMAN_PLACE: [&str; 3] = ["humanPlaceObj1", "humanPlaceObj2", "humanPlaceObj3"];

// Trial summary counters
pub const REPLANNING_COUNT: &str = "numberOfReplanning";
pub const COLLISION_COUNT: &str = "numberOfCollisions";
pub const ROBOT_IDLE_TIME: &str = "robotIdleTime";
pub const HUMAN_IDLE_TIME: &str = "humanIdleTime";
pub const COMMON_GRASP: &str = "commonGrasp";

/// Scene object that tracks the participant's right hand
pub const HAND_HANDLE: &str = "RightController";

pub const OBJECT_HANDLES: [&str; 3] = ["object_1", "object_2", "object_3"];

/// Every integer signal the loop reads or writes
pub fn integer_signals() -> impl Iterator<Item = &'static str> {
    [
        START_SIM,
        SIM_STARTED,
        TARGET_OBJECT,
        ARCHITECTURE_MODE,
        CAN_BE_RESTARTED,
        RESTART,
        ROBOT_APPROACHING,
        OBJECT_GRASPED,
        OBJECT_PLACED,
        REPLANNING_COUNT,
        COLLISION_COUNT,
        COMMON_GRASP,
    ]
    .into_iter()
    .chain(OBJECT_EXISTS)
    .chain(ROBOT_GRASP)
    .chain(ROBOT_PLACE)
    .chain(HUMAN_GRASP)
    .chain(HUMAN_PLACE)
}

/// Every float signal the loop reads or writes
pub fn float_signals() -> impl Iterator<Item = &'static str> {
    [HAND_Y, HAND_PROXIMITY, ROBOT_IDLE_TIME, HUMAN_IDLE_TIME].into_iter()
}
