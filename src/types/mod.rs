//! Data types shared by the loop, the filters and the monitor

pub mod names;

mod architecture;
mod event;
mod phase;
mod pose;
mod snapshot;
mod status;

pub use architecture::ArchitectureMode;
pub use event::{EventRecord, EventTag};
pub use phase::Phase;
pub use pose::{Orientation, Pose, Position};
pub use snapshot::{Agent, AgentEvents, ObjectId, OutgoingCommand, SignalSnapshot, TrialCounters};
pub use status::LoopStatus;
