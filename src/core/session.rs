//! Synchronization session: the read → filter → decide → edges → command cycle
//!
//! All per-trial state (filters, edge trackers, field stimuli, last decision)
//! lives here and is reset at the start of every trial.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::{ExperimentConfig, FieldConfig, HandSource};
use crate::core::edges::{EventTracker, TrackedEvent};
use crate::core::filters::{JumpReject, TelemetryFilter};
use crate::core::intention::{reach_likelihood, IntentionAdapter, IntentionField};
use crate::core::journal::EventSink;
use crate::error::{ExperimentError, FieldError};
use crate::types::{
    ArchitectureMode, EventRecord, ObjectId, OutgoingCommand, Pose, Position, SignalSnapshot,
};

/// Everything one cycle consumes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleInput {
    pub snapshot: SignalSnapshot,
    /// Raw controller pose, when one was read this cycle
    pub hand: Option<Pose>,
    /// Object positions (object 1, 2, 3); only read in ACTION_LIKELIHOOD mode
    pub objects: Option<[Position; 3]>,
    /// Time since the previous cycle
    pub elapsed: Duration,
}

impl CycleInput {
    pub fn new(snapshot: SignalSnapshot) -> Self {
        Self {
            snapshot,
            hand: None,
            objects: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn with_hand(mut self, pose: Pose) -> Self {
        self.hand = Some(pose);
        self
    }

    pub fn with_objects(mut self, objects: [Position; 3]) -> Self {
        self.objects = Some(objects);
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }
}

/// Outcome of one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub decision: Option<ObjectId>,
    pub events: Vec<TrackedEvent>,
    pub trial_complete: bool,
}

/// Per-session decision state
pub struct SyncSession {
    mode: ArchitectureMode,
    hand_source: HandSource,
    layout: FieldConfig,
    telemetry: TelemetryFilter,
    jump: JumpReject,
    previous_hand: Option<Position>,
    adapter: IntentionAdapter,
    tracker: EventTracker,
    decision: Option<ObjectId>,
    sink: Arc<dyn EventSink>,
    cycles: u64,
}

impl SyncSession {
    pub fn new(config: &ExperimentConfig, field: Box<dyn IntentionField>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            mode: config.mode,
            hand_source: config.hand_source,
            layout: config.field.clone(),
            telemetry: TelemetryFilter::new(&config.filters),
            jump: JumpReject::new(config.filters.jump_threshold),
            previous_hand: None,
            adapter: IntentionAdapter::new(field, config.field.clone()),
            tracker: EventTracker::new(),
            decision: None,
            sink,
            cycles: 0,
        }
    }

    /// Run one full cycle and update `command` in place
    pub fn step(&mut self, input: &CycleInput, command: &mut OutgoingCommand) -> Result<CycleReport, ExperimentError> {
        self.cycles += 1;
        let snapshot = &input.snapshot;

        let telemetry = self.telemetry.apply(snapshot.hand_y, snapshot.hand_proximity);
        let hand = input.hand.map(|pose| self.jump.filter(pose.position));

        let decision = match self.mode {
            ArchitectureMode::HandMotion => {
                match (self.hand_source, hand, telemetry) {
                    (HandSource::Pose, Some(position), _) => self.adapter.set_hand_pose_stimulus(&position)?,
                    (HandSource::Signals, _, Some(reading)) => self.adapter.set_hand_stimulus(reading)?,
                    _ => {}
                }
                self.adapter.target_object()?
            }
            ArchitectureMode::ActionLikelihood => match self.likelihoods(hand, input) {
                Some(likelihoods) => {
                    self.adapter.set_likelihood_stimuli(likelihoods)?;
                    self.adapter.target_object()?
                }
                // Nothing to go on this cycle
                None => self.decision,
            },
            ArchitectureMode::NoAnticipation => self.adapter.target_object()?,
            ArchitectureMode::Baseline => ObjectId::ALL
                .into_iter()
                .find(|object| snapshot.is_present(*object)),
        };
        if hand.is_some() {
            self.previous_hand = hand;
        }

        if decision != self.decision {
            debug!(
                from = self.decision.map_or(0, ObjectId::get),
                to = decision.map_or(0, ObjectId::get),
                "target decision changed"
            );
        }
        self.decision = decision;
        command.set_target(decision);

        let events = self.tracker.observe(snapshot, decision);
        let mut trial_complete = false;
        for event in &events {
            match event {
                TrackedEvent::ObjectAppeared(object) if self.mode.uses_field() => {
                    self.adapter.add_target_object(*object)?
                }
                TrackedEvent::ObjectRemoved(object) if self.mode.uses_field() => {
                    self.adapter.remove_target_object(*object)?
                }
                TrackedEvent::TrialComplete { .. } => trial_complete = true,
                _ => {}
            }
            let record = EventRecord::new(event.tag(), event.message());
            info!(tag = %record.tag, "{}", record.message);
            self.sink.record(&record)?;
        }

        Ok(CycleReport {
            decision,
            events,
            trial_complete,
        })
    }

    /// Per-object reach likelihoods, zero for absent objects
    ///
    /// `None` when there is no motion estimate yet or every likelihood is zero.
    fn likelihoods(&self, hand: Option<Position>, input: &CycleInput) -> Option<[f64; 3]> {
        let hand = hand?;
        let previous = self.previous_hand?;
        let objects = input.objects?;
        let dt = input.elapsed.as_secs_f64();

        let mut likelihoods = [0.0; 3];
        for object in ObjectId::ALL {
            if input.snapshot.is_present(object) {
                likelihoods[object.index()] = reach_likelihood(
                    &hand,
                    &previous,
                    &objects[object.index()],
                    dt,
                    self.layout.likelihood_tau,
                    self.layout.likelihood_sigma,
                );
            }
        }
        if likelihoods.iter().all(|likelihood| *likelihood == 0.0) {
            None
        } else {
            Some(likelihoods)
        }
    }

    /// Start a new trial from a clean slate
    pub fn reset_for_trial(&mut self) -> Result<(), FieldError> {
        self.telemetry.reset();
        self.jump.reset();
        self.previous_hand = None;
        self.decision = None;
        self.tracker.reset_for_trial();
        self.adapter.reset()
    }

    pub fn mode(&self) -> ArchitectureMode {
        self.mode
    }

    pub fn decision(&self) -> Option<ObjectId> {
        self.decision
    }

    pub fn tracker(&self) -> &EventTracker {
        &self.tracker
    }

    pub fn adapter(&self) -> &IntentionAdapter {
        &self.adapter
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}
