//! Integration tests for the experiment lifecycle
//!
//! Tests the full path: connect → phase waits → sync loop → restart handshake → teardown,
//! with the scripted scene playing the simulator on its own thread.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use handover::config::ExperimentConfig;
use handover::core::{Experiment, ExperimentHandle, InputPeakField, MemoryChannel, MemoryJournal, ScriptedScene, StopHandle};
use handover::error::ExperimentError;
use handover::types::{ArchitectureMode, LoopStatus, Phase};
use handover::OBJECT_ANCHORS;
use tokio::sync::watch;

fn fast_config(trials: u32) -> ExperimentConfig {
    ExperimentConfig {
        mode: ArchitectureMode::Baseline,
        trials,
        comms_period_ms: 1,
        phase_poll_ms: 1,
        linger_ms: 5,
        ..ExperimentConfig::default()
    }
}

fn start(config: ExperimentConfig, channel: &MemoryChannel, journal: &MemoryJournal) -> ExperimentHandle {
    Experiment::new(
        config.clone(),
        Box::new(channel.clone()),
        Box::new(InputPeakField::new(config.field.size)),
        Arc::new(journal.clone()),
    )
    .start()
    .unwrap()
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Two trials end to end against the scripted scene
#[test]
fn test_two_trial_session() {
    let channel = MemoryChannel::new();
    let journal = MemoryJournal::new();
    let scene_stop = StopHandle::default();
    let scene = ScriptedScene::new(channel.clone(), OBJECT_ANCHORS)
        .spawn(scene_stop.clone(), Duration::from_millis(1))
        .unwrap();

    let (status_tx, status_rx) = watch::channel(LoopStatus::new(ArchitectureMode::Baseline, 2));
    let handle = Experiment::new(
        fast_config(2),
        Box::new(channel.clone()),
        Box::new(InputPeakField::new(50.0)),
        Arc::new(journal.clone()),
    )
    .with_status(status_tx)
    .start()
    .unwrap();

    assert!(wait_until(Duration::from_secs(20), || handle.is_finished()));
    let summary = handle.join().unwrap();
    scene_stop.stop();
    let scene = scene.join().unwrap();

    assert_eq!(summary.trials_completed, 2);
    assert!(!summary.stopped);
    assert_eq!(scene.trial(), 2);

    assert_eq!(journal.count_containing("Architecture BASELINE selected for 2 trials."), 1);
    assert_eq!(journal.count_containing("Trial 1 started."), 1);
    assert_eq!(journal.count_containing("Restarting the scene for trial 2."), 1);
    assert_eq!(journal.count_containing("Trial 2 started."), 1);
    assert_eq!(journal.count_containing("Trial 1 finished."), 1);
    assert_eq!(journal.count_containing("Trial 2 finished."), 1);
    assert_eq!(journal.count_containing("All 2 trials completed."), 1);

    assert_eq!(journal.count_containing("Human is grasping"), 4);
    assert_eq!(journal.count_containing("Robot is grasping"), 2);
    assert_eq!(journal.count_containing("Robot is targeting"), 2);
    assert_eq!(journal.count_containing("is available in the workspace."), 6);
    assert_eq!(journal.count_containing("was removed from the workspace."), 6);

    // Teardown stops the simulation and publishes the final status
    assert!(!channel.simulation_running());
    let status = status_rx.borrow().clone();
    assert_eq!(status.phase, Phase::Finished);
    assert!(!status.loop_alive);
    assert_eq!(status.target_object, 0);
}

/// Every loop cycle writes one trace line, including the restart handshake and the linger
#[test]
fn test_pose_trace_covers_every_cycle() {
    let channel = MemoryChannel::new();
    let journal = MemoryJournal::new();
    let scene_stop = StopHandle::default();
    let scene = ScriptedScene::new(channel.clone(), OBJECT_ANCHORS)
        .spawn(scene_stop.clone(), Duration::from_millis(1))
        .unwrap();

    let config = ExperimentConfig {
        linger_ms: 100,
        ..fast_config(2)
    };
    let handle = start(config, &channel, &journal);
    assert!(wait_until(Duration::from_secs(20), || handle.is_finished()));
    let summary = handle.join().unwrap();
    scene_stop.stop();
    scene.join().unwrap();

    assert_eq!(summary.trials_completed, 2);
    assert_eq!(journal.poses().len() as u64, summary.cycles);
}

/// A transport failure inside the loop ends the session with that error
#[test]
fn test_loop_failure_is_observable() {
    let channel = MemoryChannel::new();
    let journal = MemoryJournal::new();
    let scene_stop = StopHandle::default();
    let scene = ScriptedScene::new(channel.clone(), OBJECT_ANCHORS)
        .spawn(scene_stop.clone(), Duration::from_millis(1))
        .unwrap();

    let handle = start(fast_config(5), &channel, &journal);
    assert!(wait_until(Duration::from_secs(10), || handle.is_loop_alive()));

    channel.inject_fault("connection reset");
    assert!(wait_until(Duration::from_secs(10), || handle.is_finished()));
    scene_stop.stop();
    scene.join().unwrap();

    assert_eq!(handle.phase(), Phase::Finished);
    assert!(!handle.is_loop_alive());
    let result = handle.join();
    assert!(matches!(result, Err(ExperimentError::Channel(_))));
}

/// A stop request while the simulator is unreachable is a clean exit
#[test]
fn test_stop_while_unreachable() {
    let channel = MemoryChannel::unreachable();
    let journal = MemoryJournal::new();
    let handle = start(fast_config(1), &channel, &journal);

    thread::sleep(Duration::from_millis(20));
    assert_eq!(handle.phase(), Phase::AwaitingConnection);
    assert!(!handle.is_loop_alive());

    handle.stop();
    let summary = handle.join().unwrap();
    assert!(summary.stopped);
    assert_eq!(summary.trials_completed, 0);
    assert_eq!(summary.cycles, 0);
    assert!(journal.is_empty());
}

/// The loop waits for the simulator to come up, then proceeds
#[test]
fn test_connects_once_reachable() {
    let channel = MemoryChannel::unreachable();
    let journal = MemoryJournal::new();
    let handle = start(fast_config(1), &channel, &journal);

    thread::sleep(Duration::from_millis(10));
    assert_eq!(handle.phase(), Phase::AwaitingConnection);

    channel.set_reachable(true);
    assert!(wait_until(Duration::from_secs(10), || handle.phase() == Phase::AwaitingSimStart));
    assert!(channel.simulation_running());

    handle.stop();
    let summary = handle.join().unwrap();
    assert!(summary.stopped);
    assert_eq!(journal.count_containing("Architecture BASELINE selected"), 1);
}

#[test]
fn test_separate_pose_channel_records_poses() {
    let channel = MemoryChannel::new();
    let journal = MemoryJournal::new();
    let scene_stop = StopHandle::default();
    let scene = ScriptedScene::new(channel.clone(), OBJECT_ANCHORS)
        .spawn(scene_stop.clone(), Duration::from_millis(1))
        .unwrap();

    let config = ExperimentConfig {
        separate_pose_channel: true,
        ..fast_config(3)
    };
    let handle = Experiment::new(
        config,
        Box::new(channel.clone()),
        Box::new(InputPeakField::new(50.0)),
        Arc::new(journal.clone()),
    )
    .with_pose_channel(Box::new(channel.clone()))
    .start()
    .unwrap();

    assert!(wait_until(Duration::from_secs(10), || journal.poses().len() >= 5));
    assert!(handle.board().hand_pose.is_some());

    handle.stop();
    handle.join().unwrap();
    scene_stop.stop();
    scene.join().unwrap();
}

#[test]
fn test_separate_pose_channel_requires_channel() {
    let config = ExperimentConfig {
        separate_pose_channel: true,
        ..fast_config(1)
    };
    let result = Experiment::new(
        config,
        Box::new(MemoryChannel::new()),
        Box::new(InputPeakField::new(50.0)),
        Arc::new(MemoryJournal::new()),
    )
    .start();
    assert!(matches!(result, Err(ExperimentError::InvalidConfig { .. })));
}
