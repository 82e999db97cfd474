//! Core modules for the synchronization loop

pub mod channel;
pub mod filters;
pub mod intention;
pub mod edges;
pub mod journal;
pub mod session;
pub mod experiment;
pub mod scene;
pub mod api;

pub use channel::{read_snapshot, reset_signals, write_command, MemoryChannel, ObjectHandle, SignalChannel};
pub use filters::{majority, Ema, JumpReject, TelemetryFilter};
pub use intention::{classify_centroid, InputPeakField, IntentionAdapter, IntentionField, StimulusSlot};
pub use edges::{EdgeDetector, EventTracker, Gate, TrackedEvent};
pub use journal::{EventSink, Fanout, MemoryJournal, SessionJournal};
pub use session::{CycleInput, CycleReport, SyncSession};
pub use experiment::{Experiment, ExperimentHandle, ExperimentSummary, SharedBoard, StopHandle};
pub use scene::ScriptedScene;
pub use api::{create_router, run_server, MonitorState};
