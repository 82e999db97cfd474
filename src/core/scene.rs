//! Scripted scene for dry runs
//!
//! Plays the simulator side of a [`MemoryChannel`]: starts when `startSim`
//! is raised, spawns the three objects, then alternates human and robot
//! pickups until the table is empty and waits for the restart handshake.
//! The robot always takes the second object of a trial, choosing whatever
//! `targetObject` the loop currently writes.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::core::channel::MemoryChannel;
use crate::core::experiment::StopHandle;
use crate::types::{names, Agent, ObjectId, Pose, Position};
use crate::{NO_READING_SENTINEL, OBJECT_COUNT};

/// Ticks a hand or gripper needs to reach an object
const REACH_TICKS: u32 = 20;

/// Ticks between a grasp and the matching place
const CARRY_TICKS: u32 = 5;

/// Ticks the robot waits for a usable target before the human steps in
const ROBOT_PATIENCE: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Idle,
    HumanReach { object: ObjectId, step: u32 },
    RobotWait { waited: u32 },
    RobotReach { object: ObjectId, step: u32 },
    Carry { agent: Agent, object: ObjectId, step: u32 },
    AwaitRestart,
}

/// Tick-driven simulator stand-in
#[derive(Debug)]
pub struct ScriptedScene {
    channel: MemoryChannel,
    anchors: [f64; 3],
    stage: Stage,
    trial: u32,
    pickups: usize,
    ticks: u64,
}

fn table_position(object: ObjectId) -> Position {
    Position::new(0.45 + 0.15 * object.index() as f64, -0.1, 0.731)
}

fn rest_position() -> Position {
    Position::new(0.6, 0.1, 0.2)
}

impl ScriptedScene {
    /// `anchors` are the field positions of the objects; the scripted hand
    /// telemetry points at them while reaching.
    pub fn new(channel: MemoryChannel, anchors: [f64; 3]) -> Self {
        Self {
            channel,
            anchors,
            stage: Stage::Idle,
            trial: 0,
            pickups: 0,
            ticks: 0,
        }
    }

    /// Trials started so far
    pub fn trial(&self) -> u32 {
        self.trial
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advance the script by one step
    pub fn tick(&mut self) {
        self.ticks += 1;
        let stage = self.stage;
        self.stage = match stage {
            Stage::Idle => {
                if self.channel.peek_int(names::START_SIM) == 1 {
                    self.channel.put_bool(names::SIM_STARTED, true);
                    self.spawn_objects();
                    self.next_pickup()
                } else {
                    Stage::Idle
                }
            }
            Stage::HumanReach { object, step } => {
                self.move_hand(object, f64::from(step) / f64::from(REACH_TICKS));
                if step >= REACH_TICKS {
                    self.grasp(Agent::Human, object);
                    Stage::Carry { agent: Agent::Human, object, step: 0 }
                } else {
                    Stage::HumanReach { object, step: step + 1 }
                }
            }
            Stage::RobotWait { waited } => {
                let target = ObjectId::new(self.channel.peek_int(names::TARGET_OBJECT))
                    .filter(|object| self.is_present(*object));
                match target {
                    Some(object) => {
                        self.channel.put_bool(names::ROBOT_APPROACHING, true);
                        Stage::RobotReach { object, step: 0 }
                    }
                    None if waited >= ROBOT_PATIENCE => self.human_pickup(),
                    None => Stage::RobotWait { waited: waited + 1 },
                }
            }
            Stage::RobotReach { object, step } => {
                if step >= REACH_TICKS {
                    self.grasp(Agent::Robot, object);
                    Stage::Carry { agent: Agent::Robot, object, step: 0 }
                } else {
                    Stage::RobotReach { object, step: step + 1 }
                }
            }
            Stage::Carry { agent, object, step } => {
                if step >= CARRY_TICKS {
                    self.place(agent, object);
                    self.finish_pickup()
                } else {
                    Stage::Carry { agent, object, step: step + 1 }
                }
            }
            Stage::AwaitRestart => {
                if self.channel.peek_int(names::RESTART) == 1 {
                    self.respawn();
                    self.next_pickup()
                } else {
                    Stage::AwaitRestart
                }
            }
        };
    }

    /// Tick every `period` on a thread until stopped
    pub fn spawn(mut self, stop: StopHandle, period: Duration) -> io::Result<JoinHandle<ScriptedScene>> {
        thread::Builder::new().name("scripted-scene".to_string()).spawn(move || {
            while !stop.is_stopped() {
                self.tick();
                thread::sleep(period);
            }
            self
        })
    }

    fn is_present(&self, object: ObjectId) -> bool {
        self.channel.peek_int(names::OBJECT_EXISTS[object.index()]) == 1
    }

    fn spawn_objects(&mut self) {
        self.trial += 1;
        self.pickups = 0;
        for object in ObjectId::ALL {
            self.channel.put_bool(names::OBJECT_EXISTS[object.index()], true);
            self.channel.set_pose(
                names::OBJECT_HANDLES[object.index()],
                Pose {
                    position: table_position(object),
                    ..Pose::default()
                },
            );
        }
        self.rest_hand();
        self.channel.put_bool(names::CAN_BE_RESTARTED, false);
        debug!(trial = self.trial, "scene objects spawned");
    }

    fn respawn(&mut self) {
        for name in names::ROBOT_GRASP
            .into_iter()
            .chain(names::ROBOT_PLACE)
            .chain(names::HUMAN_GRASP)
            .chain(names::HUMAN_PLACE)
        {
            self.channel.put_bool(name, false);
        }
        self.channel.put_bool(names::ROBOT_APPROACHING, false);
        self.spawn_objects();
    }

    fn next_pickup(&self) -> Stage {
        if self.pickups == 1 {
            Stage::RobotWait { waited: 0 }
        } else {
            self.human_pickup()
        }
    }

    /// Lowest present object the robot is not heading for, if there is a choice
    fn human_pickup(&self) -> Stage {
        let target = ObjectId::new(self.channel.peek_int(names::TARGET_OBJECT));
        let present: Vec<ObjectId> = ObjectId::ALL
            .into_iter()
            .filter(|object| self.is_present(*object))
            .collect();
        let choice = present
            .iter()
            .copied()
            .find(|object| Some(*object) != target)
            .or_else(|| present.first().copied());
        match choice {
            Some(object) => Stage::HumanReach { object, step: 0 },
            None => Stage::AwaitRestart,
        }
    }

    fn finish_pickup(&mut self) -> Stage {
        self.pickups += 1;
        self.rest_hand();
        if self.pickups < OBJECT_COUNT {
            return self.next_pickup();
        }

        self.channel.put_int(names::REPLANNING_COUNT, self.trial as i32);
        self.channel.put_int(names::COLLISION_COUNT, 0);
        self.channel.put_float(names::ROBOT_IDLE_TIME, 1.5);
        self.channel.put_float(names::HUMAN_IDLE_TIME, 0.5 * f64::from(self.trial));
        self.channel.put_bool(names::COMMON_GRASP, false);
        self.channel.put_bool(names::CAN_BE_RESTARTED, true);
        Stage::AwaitRestart
    }

    fn move_hand(&mut self, object: ObjectId, progress: f64) {
        let from = rest_position();
        let to = table_position(object);
        let position = Position::new(
            from.x + (to.x - from.x) * progress,
            from.y + (to.y - from.y) * progress,
            from.z + (to.z - from.z) * progress,
        );
        self.channel.set_pose(
            names::HAND_HANDLE,
            Pose {
                position,
                ..Pose::default()
            },
        );
        self.channel.put_float(names::HAND_Y, self.anchors[object.index()]);
        self.channel.put_float(names::HAND_PROXIMITY, 1.0 + 9.0 * progress);
    }

    fn rest_hand(&mut self) {
        self.channel.set_pose(
            names::HAND_HANDLE,
            Pose {
                position: rest_position(),
                ..Pose::default()
            },
        );
        self.channel.put_float(names::HAND_Y, NO_READING_SENTINEL);
        self.channel.put_float(names::HAND_PROXIMITY, NO_READING_SENTINEL);
    }

    fn grasp(&mut self, agent: Agent, object: ObjectId) {
        let flags = match agent {
            Agent::Robot => names::ROBOT_GRASP,
            Agent::Human => names::HUMAN_GRASP,
        };
        self.channel.put_bool(flags[object.index()], true);
        self.channel.put_bool(names::OBJECT_EXISTS[object.index()], false);
    }

    fn place(&mut self, agent: Agent, object: ObjectId) {
        let flags = match agent {
            Agent::Robot => names::ROBOT_PLACE,
            Agent::Human => names::HUMAN_PLACE,
        };
        self.channel.put_bool(flags[object.index()], true);
        if agent == Agent::Robot {
            self.channel.put_bool(names::ROBOT_APPROACHING, false);
        }
        debug!(?agent, %object, "scene object placed");
    }
}
