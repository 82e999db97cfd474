//! Integration tests for the decision cycle
//!
//! Tests the full path: snapshot → filters → intention field → edges → journal → command

use std::sync::Arc;

use handover::config::ExperimentConfig;
use handover::core::{CycleInput, InputPeakField, MemoryJournal, SyncSession};
use handover::types::{ArchitectureMode, EventTag, ObjectId, OutgoingCommand, SignalSnapshot};
use pretty_assertions::assert_eq;

fn create_session(mode: ArchitectureMode) -> (SyncSession, MemoryJournal, OutgoingCommand) {
    let config = ExperimentConfig {
        mode,
        ..ExperimentConfig::default()
    };
    let journal = MemoryJournal::new();
    let session = SyncSession::new(
        &config,
        Box::new(InputPeakField::new(config.field.size)),
        Arc::new(journal.clone()),
    );
    (session, journal, OutgoingCommand::new(mode))
}

fn scene(objects: [bool; 3]) -> SignalSnapshot {
    SignalSnapshot {
        sim_started: true,
        objects,
        ..SignalSnapshot::default()
    }
}

/// simStarted=1, object1=1, object2=1, object3=0, humanGraspObj1 0→1
#[test]
fn test_full_cycle_scenario() {
    let (mut session, journal, mut command) = create_session(ArchitectureMode::HandMotion);
    let mut snapshot = scene([true, true, false]);

    let first = session.step(&CycleInput::new(snapshot), &mut command).unwrap();
    snapshot.human.grasp[0] = true;
    let second = session.step(&CycleInput::new(snapshot), &mut command).unwrap();

    assert_eq!(journal.messages(EventTag::Human), vec!["Human is grasping object 1.".to_string()]);
    assert_eq!(
        journal.messages(EventTag::Control),
        vec![
            "Object 1 is available in the workspace.".to_string(),
            "Object 2 is available in the workspace.".to_string(),
        ]
    );
    assert_eq!(first.decision, None);
    assert!(matches!(second.decision, Some(object) if object != ObjectId::ALL[2]));
    assert_eq!(command.target(), second.decision);

    // Sustained flag: nothing new
    session.step(&CycleInput::new(snapshot), &mut command).unwrap();
    assert_eq!(journal.messages(EventTag::Human).len(), 1);
}

#[test]
fn test_grasp_edge_pattern_logs_twice() {
    let (mut session, journal, mut command) = create_session(ArchitectureMode::Baseline);
    let mut snapshot = scene([true, true, true]);
    for flag in [false, true, true, true, false, true] {
        snapshot.human.grasp[1] = flag;
        session.step(&CycleInput::new(snapshot), &mut command).unwrap();
    }
    assert_eq!(journal.count_containing("Human is grasping object 2."), 2);
}

#[test]
fn test_robot_cycle_target_grasp_place() {
    let (mut session, journal, mut command) = create_session(ArchitectureMode::Baseline);
    let mut snapshot = scene([false, true, true]);
    session.step(&CycleInput::new(snapshot), &mut command).unwrap();

    snapshot.robot_approaching = true;
    session.step(&CycleInput::new(snapshot), &mut command).unwrap();
    snapshot.robot.grasp[1] = true;
    snapshot.objects[1] = false;
    session.step(&CycleInput::new(snapshot), &mut command).unwrap();
    snapshot.robot.place[1] = true;
    snapshot.robot_approaching = false;
    session.step(&CycleInput::new(snapshot), &mut command).unwrap();

    assert_eq!(
        journal.messages(EventTag::Robot),
        vec![
            "Robot is targeting object 2.".to_string(),
            "Robot is grasping object 2.".to_string(),
            "Robot has placed object 2 (1/3).".to_string(),
        ]
    );
    assert_eq!(command.target_object, 3);
}

/// Robot grasps need a logged target first; places are counted in any state
#[test]
fn test_grasp_gated_place_ungated() {
    let (mut session, journal, mut command) = create_session(ArchitectureMode::Baseline);
    let mut snapshot = scene([true, true, true]);

    // No approach, so no target log and no grasp log
    snapshot.robot.grasp[0] = true;
    session.step(&CycleInput::new(snapshot), &mut command).unwrap();
    assert_eq!(journal.count_containing("Robot is grasping"), 0);

    // The place of the same object is still logged and counted
    snapshot.robot.place[0] = true;
    session.step(&CycleInput::new(snapshot), &mut command).unwrap();
    assert_eq!(journal.count_containing("Robot has placed object 1"), 1);
    assert_eq!(session.tracker().place_count(), 1);
}

#[test]
fn test_trial_rollover() {
    let (mut session, journal, mut command) = create_session(ArchitectureMode::Baseline);
    let mut snapshot = scene([true, true, true]);
    snapshot.counters.replanning = 4;
    snapshot.counters.common_grasp = true;
    session.step(&CycleInput::new(snapshot), &mut command).unwrap();

    snapshot.human.place[0] = true;
    session.step(&CycleInput::new(snapshot), &mut command).unwrap();
    snapshot.robot.place[1] = true;
    session.step(&CycleInput::new(snapshot), &mut command).unwrap();
    assert_eq!(journal.count_containing("finished"), 0);

    snapshot.human.place[2] = true;
    let report = session.step(&CycleInput::new(snapshot), &mut command).unwrap();
    assert!(report.trial_complete);

    let summaries: Vec<String> = journal
        .messages(EventTag::Control)
        .into_iter()
        .filter(|m| m.starts_with("Trial"))
        .collect();
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].starts_with("Trial 1 finished."));
    assert!(summaries[0].contains("replanning=4"));
    assert!(summaries[0].contains("common_grasp=true"));
    assert!(session.tracker().all_events_low());
    assert_eq!(session.tracker().place_count(), 0);

    // Flags left high from the last trial are not counted again
    session.step(&CycleInput::new(snapshot), &mut command).unwrap();
    assert_eq!(session.tracker().place_count(), 0);

    // Once they drop, the next trial's grasp is logged
    snapshot.human = Default::default();
    snapshot.robot = Default::default();
    session.step(&CycleInput::new(snapshot), &mut command).unwrap();
    snapshot.human.grasp[0] = true;
    session.step(&CycleInput::new(snapshot), &mut command).unwrap();
    assert_eq!(journal.count_containing("Human is grasping object 1."), 1);
}

#[test]
fn test_new_trial_reports_objects_again() {
    let (mut session, journal, mut command) = create_session(ArchitectureMode::NoAnticipation);
    let snapshot = scene([true, false, false]);
    session.step(&CycleInput::new(snapshot), &mut command).unwrap();
    assert_eq!(journal.count_containing("Object 1 is available"), 1);

    session.reset_for_trial().unwrap();
    assert!(!session.adapter().is_live(ObjectId::ALL[0]));

    session.step(&CycleInput::new(snapshot), &mut command).unwrap();
    assert_eq!(journal.count_containing("Object 1 is available"), 2);
    assert!(session.adapter().is_live(ObjectId::ALL[0]));
}
