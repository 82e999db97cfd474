//! Event-edge state machine
//!
//! Every boolean event signal has its own [`EdgeDetector`]; a journal line
//! is produced only on a strict Low → High transition of the raw signal.
//!
//! On top of the detectors, [`EventTracker`] applies a two-level gate:
//!
//! - AWAITING_TARGET → AWAITING_GRASP: the robot heads for a target that
//!   differs from the last one logged
//! - AWAITING_GRASP → AWAITING_PLACE: the robot grasps an object
//! - any place event → AWAITING_TARGET
//!
//! Place events are not gated: they are logged and counted in any gate
//! state, while robot grasps are only logged in AWAITING_GRASP.

use serde::{Deserialize, Serialize};

use crate::types::{Agent, EventTag, ObjectId, SignalSnapshot, TrialCounters};
use crate::OBJECT_COUNT;

/// Level of a tracked signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeState {
    Low,
    High,
}

/// Transition reported by a detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

/// Strict 0 → 1 / 1 → 0 detector for one boolean signal
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    state: EdgeState,
    /// Cleared by `reset` while the raw signal is still high
    armed: bool,
    last_raw: bool,
}

impl Default for EdgeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self {
            state: EdgeState::Low,
            armed: true,
            last_raw: false,
        }
    }

    /// Feed this cycle's raw value
    pub fn observe(&mut self, current: bool) -> Option<Edge> {
        self.last_raw = current;
        if !self.armed {
            // A signal still high from before the reset must drop first
            self.armed = !current;
            return None;
        }
        match (self.state, current) {
            (EdgeState::Low, true) => {
                self.state = EdgeState::High;
                Some(Edge::Rising)
            }
            (EdgeState::High, false) => {
                self.state = EdgeState::Low;
                Some(Edge::Falling)
            }
            _ => None,
        }
    }

    /// True on a Low → High transition only
    pub fn rising(&mut self, current: bool) -> bool {
        self.observe(current) == Some(Edge::Rising)
    }

    pub fn state(&self) -> EdgeState {
        self.state
    }

    /// Back to Low; a signal that is still high cannot fire until it drops
    pub fn reset(&mut self) {
        self.state = EdgeState::Low;
        self.armed = !self.last_raw;
    }

    /// Back to the power-on state
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

/// Position of the robot in the target → grasp → place cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gate {
    AwaitingTarget,
    AwaitingGrasp,
    AwaitingPlace,
}

/// Domain event recognised in one cycle
#[derive(Debug, Clone, PartialEq)]
pub enum TrackedEvent {
    ObjectAppeared(ObjectId),
    ObjectRemoved(ObjectId),
    TargetChanged(ObjectId),
    Grasp { agent: Agent, object: ObjectId },
    Place { agent: Agent, object: ObjectId, count: usize },
    TrialComplete { trial: u32, counters: TrialCounters },
}

impl TrackedEvent {
    pub fn tag(&self) -> EventTag {
        match self {
            TrackedEvent::ObjectAppeared(_)
            | TrackedEvent::ObjectRemoved(_)
            | TrackedEvent::TrialComplete { .. } => EventTag::Control,
            TrackedEvent::TargetChanged(_) => EventTag::Robot,
            TrackedEvent::Grasp { agent, .. } | TrackedEvent::Place { agent, .. } => match agent {
                Agent::Robot => EventTag::Robot,
                Agent::Human => EventTag::Human,
            },
        }
    }

    pub fn message(&self) -> String {
        match self {
            TrackedEvent::ObjectAppeared(object) => {
                format!("Object {} is available in the workspace.", object)
            }
            TrackedEvent::ObjectRemoved(object) => {
                format!("Object {} was removed from the workspace.", object)
            }
            TrackedEvent::TargetChanged(object) => format!("Robot is targeting object {}.", object),
            TrackedEvent::Grasp { agent, object } => {
                format!("{} is grasping object {}.", agent_name(*agent), object)
            }
            TrackedEvent::Place { agent, object, count } => format!(
                "{} has placed object {} ({}/{}).",
                agent_name(*agent),
                object,
                count,
                OBJECT_COUNT
            ),
            TrackedEvent::TrialComplete { trial, counters } => {
                format!("Trial {} finished. {}", trial, counters)
            }
        }
    }
}

fn agent_name(agent: Agent) -> &'static str {
    match agent {
        Agent::Robot => "Robot",
        Agent::Human => "Human",
    }
}

/// Detectors of one agent's grasp/place flags
#[derive(Debug, Clone, Default)]
struct AgentDetectors {
    grasp: [EdgeDetector; 3],
    place: [EdgeDetector; 3],
}

impl AgentDetectors {
    fn reset(&mut self) {
        self.grasp.iter_mut().chain(self.place.iter_mut()).for_each(EdgeDetector::reset);
    }

    fn states(&self) -> impl Iterator<Item = EdgeState> + '_ {
        self.grasp.iter().chain(self.place.iter()).map(EdgeDetector::state)
    }
}

/// Edge detection and gating for the whole event namespace
#[derive(Debug, Clone)]
pub struct EventTracker {
    presence: [EdgeDetector; 3],
    robot: AgentDetectors,
    human: AgentDetectors,
    gate: Gate,
    last_target: Option<ObjectId>,
    place_count: usize,
    trials_completed: u32,
}

impl Default for EventTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl EventTracker {
    pub fn new() -> Self {
        Self {
            presence: Default::default(),
            robot: AgentDetectors::default(),
            human: AgentDetectors::default(),
            gate: Gate::AwaitingTarget,
            last_target: None,
            place_count: 0,
            trials_completed: 0,
        }
    }

    /// Run every detector over one snapshot
    ///
    /// `decision` is this cycle's target decision of the robot.
    pub fn observe(&mut self, snapshot: &SignalSnapshot, decision: Option<ObjectId>) -> Vec<TrackedEvent> {
        let mut events = Vec::new();

        for object in ObjectId::ALL {
            match self.presence[object.index()].observe(snapshot.is_present(object)) {
                Some(Edge::Rising) => events.push(TrackedEvent::ObjectAppeared(object)),
                Some(Edge::Falling) => events.push(TrackedEvent::ObjectRemoved(object)),
                None => {}
            }
        }

        if self.gate == Gate::AwaitingTarget && snapshot.robot_approaching {
            if let Some(target) = decision.filter(|t| Some(*t) != self.last_target) {
                self.last_target = Some(target);
                self.gate = Gate::AwaitingGrasp;
                events.push(TrackedEvent::TargetChanged(target));
            }
        }

        for object in ObjectId::ALL {
            let i = object.index();
            if self.robot.grasp[i].rising(snapshot.robot.grasp[i]) && self.gate == Gate::AwaitingGrasp {
                self.gate = Gate::AwaitingPlace;
                events.push(TrackedEvent::Grasp { agent: Agent::Robot, object });
            }
            if self.human.grasp[i].rising(snapshot.human.grasp[i]) {
                events.push(TrackedEvent::Grasp { agent: Agent::Human, object });
            }
        }

        for agent in [Agent::Robot, Agent::Human] {
            for object in ObjectId::ALL {
                let i = object.index();
                let placed = snapshot.events(agent).place[i];
                let rose = match agent {
                    Agent::Robot => self.robot.place[i].rising(placed),
                    Agent::Human => self.human.place[i].rising(placed),
                };
                if !rose {
                    continue;
                }
                self.place_count += 1;
                self.gate = Gate::AwaitingTarget;
                events.push(TrackedEvent::Place {
                    agent,
                    object,
                    count: self.place_count,
                });

                // A place later in this same poll counts toward the next trial
                if self.place_count >= OBJECT_COUNT {
                    self.trials_completed += 1;
                    events.push(TrackedEvent::TrialComplete {
                        trial: self.trials_completed,
                        counters: snapshot.counters,
                    });
                    self.roll_over();
                }
            }
        }

        events
    }

    /// End-of-trial reset: gate, counters and every event detector
    fn roll_over(&mut self) {
        self.gate = Gate::AwaitingTarget;
        self.last_target = None;
        self.place_count = 0;
        self.robot.reset();
        self.human.reset();
    }

    /// Reset for a restarted trial, keeping the completed-trial count
    ///
    /// Presence detectors start over so objects of the new trial are
    /// reported again; event flags still high from the old trial must
    /// drop before they can fire.
    pub fn reset_for_trial(&mut self) {
        self.roll_over();
        self.presence.iter_mut().for_each(EdgeDetector::clear);
    }

    pub fn gate(&self) -> Gate {
        self.gate
    }

    pub fn place_count(&self) -> usize {
        self.place_count
    }

    pub fn trials_completed(&self) -> u32 {
        self.trials_completed
    }

    pub fn last_target(&self) -> Option<ObjectId> {
        self.last_target
    }

    /// True when every grasp/place detector sits at Low
    pub fn all_events_low(&self) -> bool {
        self.robot
            .states()
            .chain(self.human.states())
            .all(|state| state == EdgeState::Low)
    }
}
