//! Experiment lifecycle and threads
//!
//! - lifecycle thread: connection wait, signal reset, first-trial phase
//!   waits, then spawns and joins the loop and tears the session down
//! - loop thread: fixed-period cycles, restart handshake between trials,
//!   linger after the last one
//! - pose thread (optional): polls the hand pose on a second channel
//!
//! The channel is owned by the lifecycle thread until the first trial is
//! running, then moved into the loop thread and handed back on exit. Threads
//! only share a [`SharedBoard`] and two stop flags.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::ExperimentConfig;
use crate::core::channel::{read_snapshot, reset_signals, write_command, ObjectHandle, SignalChannel};
use crate::core::intention::IntentionField;
use crate::core::journal::EventSink;
use crate::core::session::{CycleInput, SyncSession};
use crate::error::{ChannelError, ExperimentError};
use crate::types::{
    names, ArchitectureMode, EventRecord, EventTag, LoopStatus, OutgoingCommand, Phase, Pose,
    Position, SignalSnapshot,
};

/// Scalar state shared by the lifecycle, loop and pose threads
#[derive(Debug, Clone, PartialEq)]
pub struct SharedBoard {
    pub phase: Phase,
    pub snapshot: SignalSnapshot,
    pub command: OutgoingCommand,
    pub hand_pose: Option<Pose>,
    /// 1-based trial in progress
    pub trial: u32,
    pub trials_completed: u32,
    pub place_count: usize,
    pub cycles: u64,
    pub loop_alive: bool,
}

impl SharedBoard {
    fn new(mode: ArchitectureMode) -> Self {
        Self {
            phase: Phase::AwaitingConnection,
            snapshot: SignalSnapshot::default(),
            command: OutgoingCommand::new(mode),
            hand_pose: None,
            trial: 1,
            trials_completed: 0,
            place_count: 0,
            cycles: 0,
            loop_alive: false,
        }
    }

    pub fn status(&self, trials_total: u32) -> LoopStatus {
        LoopStatus {
            timestamp: Utc::now(),
            phase: self.phase,
            mode: self.command.mode,
            trial: self.trial,
            trials_total,
            target_object: self.command.target_object,
            place_count: self.place_count,
            objects: self.snapshot.objects,
            cycles: self.cycles,
            loop_alive: self.loop_alive,
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub trials_completed: u32,
    pub cycles: u64,
    /// Ended by a stop request rather than by finishing the trials
    pub stopped: bool,
}

/// Cloneable stop request, e.g. for a Ctrl-C handler
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct Shared {
    board: Arc<Mutex<SharedBoard>>,
    stop: StopHandle,
    /// Set by the lifecycle once the loop has exited
    teardown: Arc<AtomicBool>,
    status: Option<Arc<watch::Sender<LoopStatus>>>,
    trials: u32,
}

impl Shared {
    fn phase(&self) -> Phase {
        self.board.lock().phase
    }

    fn update(&self, apply: impl FnOnce(&mut SharedBoard)) {
        apply(&mut self.board.lock());
    }

    fn set_phase(&self, phase: Phase) {
        self.update(|board| board.phase = phase);
        info!(%phase, "phase changed");
        self.publish();
    }

    fn publish(&self) {
        if let Some(sender) = &self.status {
            let status = self.board.lock().status(self.trials);
            sender.send_replace(status);
        }
    }

    fn stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    fn halted(&self) -> bool {
        self.stopped() || self.teardown.load(Ordering::SeqCst)
    }

    fn finish(&self) {
        self.update(|board| {
            board.phase = Phase::Finished;
            board.loop_alive = false;
        });
        self.publish();
    }

    fn summary(&self) -> ExperimentSummary {
        let board = self.board.lock();
        ExperimentSummary {
            trials_completed: board.trials_completed,
            cycles: board.cycles,
            stopped: self.stopped(),
        }
    }
}

/// Lifecycle-only phase progression for one poll
///
/// Writes the start flag while waiting for the scene, clears the restart
/// flag once objects are back.
pub fn advance_phase(phase: Phase, snapshot: &SignalSnapshot, command: &mut OutgoingCommand) -> Phase {
    match phase {
        Phase::AwaitingSimStart => {
            command.start_sim = true;
            if snapshot.sim_started {
                Phase::AwaitingObjects
            } else {
                phase
            }
        }
        Phase::AwaitingObjects if snapshot.any_object_present() => {
            command.restart = false;
            Phase::Running
        }
        other => other,
    }
}

/// Scene handles resolved once per session
#[derive(Debug, Clone, Copy)]
struct SceneHandles {
    hand: ObjectHandle,
    objects: [ObjectHandle; 3],
}

impl SceneHandles {
    fn resolve(channel: &mut dyn SignalChannel) -> Result<Self, ChannelError> {
        let hand = channel.object_handle(names::HAND_HANDLE)?;
        let mut objects = [ObjectHandle(0); 3];
        for (slot, name) in objects.iter_mut().zip(names::OBJECT_HANDLES) {
            *slot = channel.object_handle(name)?;
        }
        Ok(Self { hand, objects })
    }

    fn object_positions(&self, channel: &mut dyn SignalChannel) -> Result<[Position; 3], ChannelError> {
        let mut positions = [Position::default(); 3];
        for (slot, handle) in positions.iter_mut().zip(self.objects) {
            *slot = channel.object_pose(handle)?.position;
        }
        Ok(positions)
    }
}

/// A configured session, ready to start
pub struct Experiment {
    config: ExperimentConfig,
    channel: Box<dyn SignalChannel>,
    pose_channel: Option<Box<dyn SignalChannel>>,
    field: Box<dyn IntentionField>,
    sink: Arc<dyn EventSink>,
    status: Option<watch::Sender<LoopStatus>>,
}

impl Experiment {
    pub fn new(
        config: ExperimentConfig,
        channel: Box<dyn SignalChannel>,
        field: Box<dyn IntentionField>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            channel,
            pose_channel: None,
            field,
            sink,
            status: None,
        }
    }

    /// Second connection for the pose thread
    pub fn with_pose_channel(mut self, channel: Box<dyn SignalChannel>) -> Self {
        self.pose_channel = Some(channel);
        self
    }

    /// Publish a [`LoopStatus`] after every cycle and phase change
    pub fn with_status(mut self, sender: watch::Sender<LoopStatus>) -> Self {
        self.status = Some(sender);
        self
    }

    /// Spawn the lifecycle thread
    pub fn start(self) -> Result<ExperimentHandle, ExperimentError> {
        self.config.validate()?;
        let pose_channel = match (self.config.separate_pose_channel, self.pose_channel) {
            (true, None) => {
                return Err(ExperimentError::InvalidConfig {
                    details: "separate_pose_channel needs a pose channel".to_string(),
                })
            }
            (true, channel) => channel,
            (false, _) => None,
        };

        let shared = Shared {
            board: Arc::new(Mutex::new(SharedBoard::new(self.config.mode))),
            stop: StopHandle::default(),
            teardown: Arc::new(AtomicBool::new(false)),
            status: self.status.map(Arc::new),
            trials: self.config.trials,
        };
        shared.publish();

        let session = SyncSession::new(&self.config, self.field, self.sink.clone());
        let parts = Parts {
            config: self.config,
            channel: self.channel,
            pose_channel,
            session,
            sink: self.sink,
            shared: shared.clone(),
        };
        let lifecycle = thread::Builder::new()
            .name("lifecycle".to_string())
            .spawn(move || run_lifecycle(parts))?;

        Ok(ExperimentHandle { shared, lifecycle })
    }
}

/// Running session
pub struct ExperimentHandle {
    shared: Shared,
    lifecycle: JoinHandle<Result<ExperimentSummary, ExperimentError>>,
}

impl ExperimentHandle {
    pub fn stop_handle(&self) -> StopHandle {
        self.shared.stop.clone()
    }

    /// Ask every thread to exit after its current iteration
    pub fn stop(&self) {
        self.shared.stop.stop();
    }

    pub fn phase(&self) -> Phase {
        self.shared.phase()
    }

    /// False before the loop starts and after it exits, including on failure
    pub fn is_loop_alive(&self) -> bool {
        self.shared.board.lock().loop_alive
    }

    pub fn is_finished(&self) -> bool {
        self.lifecycle.is_finished()
    }

    pub fn board(&self) -> SharedBoard {
        self.shared.board.lock().clone()
    }

    pub fn status(&self) -> LoopStatus {
        self.shared.board.lock().status(self.shared.trials)
    }

    /// Wait for the lifecycle thread; returns the loop's error if it failed
    pub fn join(self) -> Result<ExperimentSummary, ExperimentError> {
        self.lifecycle.join().map_err(|_| ExperimentError::LoopPanicked)?
    }
}

struct Parts {
    config: ExperimentConfig,
    channel: Box<dyn SignalChannel>,
    pose_channel: Option<Box<dyn SignalChannel>>,
    session: SyncSession,
    sink: Arc<dyn EventSink>,
    shared: Shared,
}

fn run_lifecycle(parts: Parts) -> Result<ExperimentSummary, ExperimentError> {
    let shared = parts.shared.clone();
    let result = drive(parts);
    if let Err(error) = &result {
        error!(%error, "experiment failed");
    }
    shared.finish();
    result.map(|_| shared.summary())
}

fn drive(parts: Parts) -> Result<(), ExperimentError> {
    let Parts {
        config,
        mut channel,
        pose_channel,
        session,
        sink,
        shared,
    } = parts;

    shared.set_phase(Phase::AwaitingConnection);
    while !channel.connect() {
        if shared.stopped() {
            return Ok(());
        }
        thread::sleep(config.phase_poll());
    }
    info!(mode = %config.mode, trials = config.trials, "connected to simulator");

    reset_signals(channel.as_mut())?;
    channel.start_simulation()?;
    let handles = SceneHandles::resolve(channel.as_mut())?;
    sink.record(&EventRecord::new(
        EventTag::Control,
        format!("Architecture {} selected for {} trials.", config.mode, config.trials),
    ))?;

    let mut command = OutgoingCommand::new(config.mode);
    shared.set_phase(Phase::AwaitingSimStart);
    if !wait_for_running(channel.as_mut(), &mut command, &shared, &config)? {
        return Ok(());
    }
    sink.record(&EventRecord::new(EventTag::Control, "Trial 1 started."))?;

    let pose_thread = match pose_channel {
        Some(pose_channel) => Some(spawn_pose_thread(pose_channel, shared.clone(), sink.clone(), &config)?),
        None => None,
    };

    let sync_loop = SyncLoop {
        pose_from_board: pose_thread.is_some(),
        channel,
        session,
        command,
        handles,
        sink,
        shared: shared.clone(),
        config: config.clone(),
        awaiting_restart: false,
        last_cycle: None,
        linger_until: None,
    };
    let loop_thread = thread::Builder::new()
        .name("sync-loop".to_string())
        .spawn(move || sync_loop.run())?;
    let joined = loop_thread.join();

    shared.teardown.store(true, Ordering::SeqCst);
    if let Some(pose_thread) = pose_thread {
        if pose_thread.join().is_err() {
            warn!("hand pose thread panicked");
        }
    }

    let (mut channel, outcome) = joined.map_err(|_| ExperimentError::LoopPanicked)?;
    if let Err(error) = channel.stop_simulation() {
        warn!(%error, "could not stop the simulation");
    }
    outcome
}

/// Poll until the first trial is running; false when stopped first
fn wait_for_running(
    channel: &mut dyn SignalChannel,
    command: &mut OutgoingCommand,
    shared: &Shared,
    config: &ExperimentConfig,
) -> Result<bool, ExperimentError> {
    loop {
        if shared.stopped() {
            return Ok(false);
        }
        let snapshot = read_snapshot(channel, config.filters.majority_sample_size)?;
        let phase = shared.phase();
        let next = advance_phase(phase, &snapshot, command);
        write_command(channel, command)?;
        shared.update(|board| {
            board.snapshot = snapshot;
            board.command = *command;
        });
        if next != phase {
            shared.set_phase(next);
        }
        if next.is_running() {
            return Ok(true);
        }
        thread::sleep(config.phase_poll());
    }
}

fn spawn_pose_thread(
    mut channel: Box<dyn SignalChannel>,
    shared: Shared,
    sink: Arc<dyn EventSink>,
    config: &ExperimentConfig,
) -> std::io::Result<JoinHandle<()>> {
    let period = config.comms_period();
    let poll = config.phase_poll();
    thread::Builder::new().name("hand-pose".to_string()).spawn(move || {
        if let Err(error) = poll_hand_pose(channel.as_mut(), &shared, sink.as_ref(), period, poll) {
            warn!(%error, "hand pose thread stopped");
        }
    })
}

fn poll_hand_pose(
    channel: &mut dyn SignalChannel,
    shared: &Shared,
    sink: &dyn EventSink,
    period: Duration,
    poll: Duration,
) -> Result<(), ExperimentError> {
    while !channel.connect() {
        if shared.halted() {
            return Ok(());
        }
        thread::sleep(poll);
    }
    let hand = channel.object_handle(names::HAND_HANDLE)?;
    while !shared.halted() {
        let pose = channel.object_pose(hand)?;
        shared.update(|board| board.hand_pose = Some(pose));
        sink.pose(&pose)?;
        thread::sleep(period);
    }
    Ok(())
}

/// State owned by the loop thread
struct SyncLoop {
    channel: Box<dyn SignalChannel>,
    session: SyncSession,
    command: OutgoingCommand,
    handles: SceneHandles,
    sink: Arc<dyn EventSink>,
    shared: Shared,
    config: ExperimentConfig,
    pose_from_board: bool,
    awaiting_restart: bool,
    last_cycle: Option<Instant>,
    linger_until: Option<Instant>,
}

impl SyncLoop {
    fn run(mut self) -> (Box<dyn SignalChannel>, Result<(), ExperimentError>) {
        self.shared.update(|board| board.loop_alive = true);
        let result = self.run_cycles();
        match &result {
            Err(error) => {
                error!(%error, "synchronization loop failed");
                self.shared.finish();
            }
            Ok(()) => {
                self.shared.update(|board| board.loop_alive = false);
                self.shared.publish();
            }
        }
        (self.channel, result)
    }

    fn run_cycles(&mut self) -> Result<(), ExperimentError> {
        let period = self.config.comms_period();
        while !self.shared.stopped() {
            if self.linger_until.is_some_and(|deadline| Instant::now() >= deadline) {
                break;
            }
            self.cycle()?;
            thread::sleep(period);
        }
        Ok(())
    }

    fn cycle(&mut self) -> Result<(), ExperimentError> {
        let snapshot = read_snapshot(self.channel.as_mut(), self.config.filters.majority_sample_size)?;
        let hand = self.hand_pose()?;
        let phase = self.shared.phase();

        if phase.is_running() && self.linger_until.is_none() {
            let objects = match self.config.mode {
                ArchitectureMode::ActionLikelihood => Some(self.handles.object_positions(self.channel.as_mut())?),
                _ => None,
            };
            let now = Instant::now();
            let elapsed = self.last_cycle.map_or(Duration::ZERO, |last| now.duration_since(last));
            self.last_cycle = Some(now);

            let input = CycleInput {
                snapshot,
                hand,
                objects,
                elapsed,
            };
            let report = self.session.step(&input, &mut self.command)?;
            if report.trial_complete {
                self.end_trial()?;
            }
        } else if phase.is_running() {
            self.command.set_target(None);
        } else {
            self.wait_step(phase, &snapshot)?;
        }

        write_command(self.channel.as_mut(), &self.command)?;

        let tracker = self.session.tracker();
        let command = self.command;
        self.shared.update(|board| {
            board.snapshot = snapshot;
            board.command = command;
            board.place_count = tracker.place_count();
            board.trials_completed = tracker.trials_completed();
            board.cycles += 1;
        });
        self.shared.publish();
        Ok(())
    }

    /// Hand pose for this cycle, appended to the trace on every cycle
    ///
    /// With a pose thread the pose comes from the board and that thread
    /// writes the trace.
    fn hand_pose(&mut self) -> Result<Option<Pose>, ExperimentError> {
        if self.pose_from_board {
            return Ok(self.shared.board.lock().hand_pose);
        }
        let pose = self.channel.object_pose(self.handles.hand)?;
        self.shared.update(|board| board.hand_pose = Some(pose));
        self.sink.pose(&pose)?;
        Ok(Some(pose))
    }

    fn end_trial(&mut self) -> Result<(), ExperimentError> {
        let completed = self.session.tracker().trials_completed();
        self.last_cycle = None;
        self.command.set_target(None);

        if completed >= self.config.trials {
            info!(trials = completed, "all trials completed");
            self.sink.record(&EventRecord::new(
                EventTag::Control,
                format!("All {} trials completed.", completed),
            ))?;
            self.linger_until = Some(Instant::now() + self.config.linger());
        } else {
            self.awaiting_restart = true;
            self.shared.set_phase(Phase::AwaitingSimStart);
        }
        Ok(())
    }

    /// One poll outside RUNNING: restart handshake, then phase waits
    fn wait_step(&mut self, phase: Phase, snapshot: &SignalSnapshot) -> Result<(), ExperimentError> {
        if self.awaiting_restart {
            if snapshot.can_be_restarted {
                self.awaiting_restart = false;
                self.command.restart = true;
                self.session.reset_for_trial()?;
                let trial = self.session.tracker().trials_completed() + 1;
                self.shared.update(|board| board.trial = trial);
                self.sink.record(&EventRecord::new(
                    EventTag::Control,
                    format!("Restarting the scene for trial {}.", trial),
                ))?;
            }
            return Ok(());
        }

        let next = advance_phase(phase, snapshot, &mut self.command);
        if next != phase {
            if next.is_running() {
                let trial = self.shared.board.lock().trial;
                self.sink.record(&EventRecord::new(
                    EventTag::Control,
                    format!("Trial {} started.", trial),
                ))?;
            }
            self.shared.set_phase(next);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_writes_start_flag() {
        let mut command = OutgoingCommand::new(ArchitectureMode::HandMotion);
        let snapshot = SignalSnapshot::default();
        assert_eq!(
            advance_phase(Phase::AwaitingSimStart, &snapshot, &mut command),
            Phase::AwaitingSimStart
        );
        assert!(command.start_sim);
    }

    #[test]
    fn test_advance_is_forward_only() {
        let mut command = OutgoingCommand::new(ArchitectureMode::HandMotion);
        let mut snapshot = SignalSnapshot {
            sim_started: true,
            ..SignalSnapshot::default()
        };
        let phase = advance_phase(Phase::AwaitingSimStart, &snapshot, &mut command);
        assert_eq!(phase, Phase::AwaitingObjects);

        // Objects not spawned yet
        assert_eq!(advance_phase(phase, &snapshot, &mut command), Phase::AwaitingObjects);

        snapshot.objects[1] = true;
        command.restart = true;
        assert_eq!(advance_phase(phase, &snapshot, &mut command), Phase::Running);
        assert!(!command.restart);

        snapshot.clear();
        assert_eq!(advance_phase(Phase::Running, &snapshot, &mut command), Phase::Running);
        assert_eq!(advance_phase(Phase::Finished, &snapshot, &mut command), Phase::Finished);
    }

    #[test]
    fn test_board_status() {
        let mut board = SharedBoard::new(ArchitectureMode::Baseline);
        board.command.target_object = 2;
        board.snapshot.objects = [true, false, true];
        let status = board.status(20);
        assert_eq!(status.mode, ArchitectureMode::Baseline);
        assert_eq!(status.target_object, 2);
        assert_eq!(status.objects, [true, false, true]);
        assert_eq!(status.trials_total, 20);
        assert!(!status.loop_alive);
    }

    #[test]
    fn test_stop_handle_is_shared() {
        let handle = StopHandle::default();
        let clone = handle.clone();
        clone.stop();
        assert!(handle.is_stopped());
    }
}
