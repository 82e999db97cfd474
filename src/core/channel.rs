//! Signal channel: named key/value access to the simulator
//!
//! The simulator is a polled, eventually-consistent store. Two reads of
//! different names carry no ordering guarantee, and no call blocks waiting
//! for fresh data. Unknown names read as zero.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::filters::sample_majority;
use crate::error::ChannelError;
use crate::types::{names, AgentEvents, OutgoingCommand, Pose, SignalSnapshot, TrialCounters};

/// Handle of a scene object, resolved once per session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle(pub i32);

/// Operations the loop needs from a simulator client
pub trait SignalChannel: Send {
    /// Try to reach the simulator once; never blocks
    fn connect(&mut self) -> bool;

    fn is_connected(&self) -> bool;

    fn get_int(&mut self, name: &str) -> Result<i32, ChannelError>;

    fn get_float(&mut self, name: &str) -> Result<f64, ChannelError>;

    fn set_int(&mut self, name: &str, value: i32) -> Result<(), ChannelError>;

    fn set_float(&mut self, name: &str, value: f64) -> Result<(), ChannelError>;

    fn object_handle(&mut self, name: &str) -> Result<ObjectHandle, ChannelError>;

    fn object_pose(&mut self, handle: ObjectHandle) -> Result<Pose, ChannelError>;

    fn start_simulation(&mut self) -> Result<(), ChannelError>;

    fn stop_simulation(&mut self) -> Result<(), ChannelError>;

    fn get_bool(&mut self, name: &str) -> Result<bool, ChannelError> {
        Ok(self.get_int(name)? != 0)
    }

    fn set_bool(&mut self, name: &str, value: bool) -> Result<(), ChannelError> {
        self.set_int(name, i32::from(value))
    }
}

/// Read every incoming signal once
///
/// Presence flags are majority-voted over `sample_size` raw reads.
pub fn read_snapshot(
    channel: &mut dyn SignalChannel,
    sample_size: usize,
) -> Result<SignalSnapshot, ChannelError> {
    let mut objects = [false; 3];
    for (slot, name) in objects.iter_mut().zip(names::OBJECT_EXISTS) {
        *slot = sample_majority(sample_size, || channel.get_int(name).map(|value| value == 1))?;
    }

    Ok(SignalSnapshot {
        sim_started: channel.get_bool(names::SIM_STARTED)?,
        objects,
        hand_y: channel.get_float(names::HAND_Y)?,
        hand_proximity: channel.get_float(names::HAND_PROXIMITY)?,
        robot_approaching: channel.get_bool(names::ROBOT_APPROACHING)?,
        robot: read_agent_events(channel, &names::ROBOT_GRASP, &names::ROBOT_PLACE)?,
        human: read_agent_events(channel, &names::HUMAN_GRASP, &names::HUMAN_PLACE)?,
        can_be_restarted: channel.get_bool(names::CAN_BE_RESTARTED)?,
        counters: TrialCounters {
            replanning: channel.get_int(names::REPLANNING_COUNT)?,
            collisions: channel.get_int(names::COLLISION_COUNT)?,
            robot_idle_time: channel.get_float(names::ROBOT_IDLE_TIME)?,
            human_idle_time: channel.get_float(names::HUMAN_IDLE_TIME)?,
            common_grasp: channel.get_bool(names::COMMON_GRASP)?,
        },
    })
}

fn read_agent_events(
    channel: &mut dyn SignalChannel,
    grasp: &[&str; 3],
    place: &[&str; 3],
) -> Result<AgentEvents, ChannelError> {
    let mut events = AgentEvents::default();
    for i in 0..3 {
        events.grasp[i] = channel.get_bool(grasp[i])?;
        events.place[i] = channel.get_bool(place[i])?;
    }
    Ok(events)
}

/// Write the loop's command back to the simulator
pub fn write_command(
    channel: &mut dyn SignalChannel,
    command: &OutgoingCommand,
) -> Result<(), ChannelError> {
    channel.set_bool(names::START_SIM, command.start_sim)?;
    channel.set_int(names::TARGET_OBJECT, i32::from(command.target_object))?;
    channel.set_bool(names::RESTART, command.restart)?;
    channel.set_int(names::ARCHITECTURE_MODE, command.mode.tag())
}

/// Zero every signal of the namespace
pub fn reset_signals(channel: &mut dyn SignalChannel) -> Result<(), ChannelError> {
    for name in names::integer_signals() {
        channel.set_int(name, 0)?;
    }
    for name in names::float_signals() {
        channel.set_float(name, 0.0)?;
    }
    Ok(())
}

// =============================================================================
// IN-MEMORY CHANNEL
// =============================================================================

#[derive(Debug, Default)]
struct Board {
    reachable: bool,
    simulation_running: bool,
    ints: HashMap<String, i32>,
    floats: HashMap<String, f64>,
    /// Values returned by the next reads of a name, ahead of the stored one
    queued_ints: HashMap<String, VecDeque<i32>>,
    objects: Vec<(String, Pose)>,
    fault: Option<String>,
    writes: u64,
}

/// Shared in-process signal store
///
/// Clones share the same board, so a scene script or a test can play the
/// simulator side while the loop owns its own clone.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    board: Arc<Mutex<Board>>,
    connected: bool,
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChannel {
    /// Reachable store with the standard scene objects registered
    pub fn new() -> Self {
        let channel = Self::unreachable();
        channel.set_reachable(true);
        channel
    }

    /// Store that refuses connections until `set_reachable(true)`
    pub fn unreachable() -> Self {
        let mut board = Board::default();
        board.objects.push((names::HAND_HANDLE.to_string(), Pose::default()));
        for name in names::OBJECT_HANDLES {
            board.objects.push((name.to_string(), Pose::default()));
        }
        Self {
            board: Arc::new(Mutex::new(board)),
            connected: false,
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.board.lock().reachable = reachable;
    }

    /// Simulator-side write of an integer signal
    pub fn put_int(&self, name: &str, value: i32) {
        self.board.lock().ints.insert(name.to_string(), value);
    }

    pub fn put_bool(&self, name: &str, value: bool) {
        self.put_int(name, i32::from(value));
    }

    pub fn put_float(&self, name: &str, value: f64) {
        self.board.lock().floats.insert(name.to_string(), value);
    }

    /// Serve these values to the next reads of `name`, then fall back to the stored value
    pub fn queue_ints(&self, name: &str, values: impl IntoIterator<Item = i32>) {
        self.board
            .lock()
            .queued_ints
            .entry(name.to_string())
            .or_default()
            .extend(values);
    }

    pub fn peek_int(&self, name: &str) -> i32 {
        self.board.lock().ints.get(name).copied().unwrap_or(0)
    }

    pub fn peek_float(&self, name: &str) -> f64 {
        self.board.lock().floats.get(name).copied().unwrap_or(0.0)
    }

    pub fn set_pose(&self, name: &str, pose: Pose) {
        let mut board = self.board.lock();
        match board.objects.iter_mut().find(|(object, _)| object == name) {
            Some((_, slot)) => *slot = pose,
            None => board.objects.push((name.to_string(), pose)),
        }
    }

    /// Make every following call fail with a transport error
    pub fn inject_fault(&self, message: &str) {
        self.board.lock().fault = Some(message.to_string());
    }

    pub fn clear_fault(&self) {
        self.board.lock().fault = None;
    }

    pub fn simulation_running(&self) -> bool {
        self.board.lock().simulation_running
    }

    /// Number of signal writes seen so far
    pub fn write_count(&self) -> u64 {
        self.board.lock().writes
    }

    fn guard(&self) -> Result<parking_lot::MutexGuard<'_, Board>, ChannelError> {
        if !self.connected {
            return Err(ChannelError::NotConnected);
        }
        let board = self.board.lock();
        if let Some(message) = &board.fault {
            return Err(ChannelError::Transport(message.clone()));
        }
        Ok(board)
    }
}

impl SignalChannel for MemoryChannel {
    fn connect(&mut self) -> bool {
        self.connected = self.board.lock().reachable;
        self.connected
    }

    fn is_connected(&self) -> bool {
        self.connected && self.board.lock().reachable
    }

    fn get_int(&mut self, name: &str) -> Result<i32, ChannelError> {
        let mut board = self.guard()?;
        if let Some(value) = board.queued_ints.get_mut(name).and_then(VecDeque::pop_front) {
            return Ok(value);
        }
        Ok(board.ints.get(name).copied().unwrap_or(0))
    }

    fn get_float(&mut self, name: &str) -> Result<f64, ChannelError> {
        let board = self.guard()?;
        Ok(board.floats.get(name).copied().unwrap_or(0.0))
    }

    fn set_int(&mut self, name: &str, value: i32) -> Result<(), ChannelError> {
        let mut board = self.guard()?;
        board.writes += 1;
        board.ints.insert(name.to_string(), value);
        Ok(())
    }

    fn set_float(&mut self, name: &str, value: f64) -> Result<(), ChannelError> {
        let mut board = self.guard()?;
        board.writes += 1;
        board.floats.insert(name.to_string(), value);
        Ok(())
    }

    fn object_handle(&mut self, name: &str) -> Result<ObjectHandle, ChannelError> {
        let board = self.guard()?;
        board
            .objects
            .iter()
            .position(|(object, _)| object == name)
            .map(|index| ObjectHandle(index as i32))
            .ok_or_else(|| ChannelError::UnknownObject {
                name: name.to_string(),
            })
    }

    fn object_pose(&mut self, handle: ObjectHandle) -> Result<Pose, ChannelError> {
        let board = self.guard()?;
        usize::try_from(handle.0)
            .ok()
            .and_then(|index| board.objects.get(index))
            .map(|(_, pose)| *pose)
            .ok_or_else(|| ChannelError::UnknownObject {
                name: format!("handle {}", handle.0),
            })
    }

    fn start_simulation(&mut self) -> Result<(), ChannelError> {
        self.guard()?.simulation_running = true;
        Ok(())
    }

    fn stop_simulation(&mut self) -> Result<(), ChannelError> {
        self.guard()?.simulation_running = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArchitectureMode, ObjectId, Position};

    fn connected() -> MemoryChannel {
        let mut channel = MemoryChannel::new();
        assert!(channel.connect());
        channel
    }

    #[test]
    fn test_calls_fail_before_connect() {
        let mut channel = MemoryChannel::new();
        assert!(matches!(
            channel.get_int(names::SIM_STARTED),
            Err(ChannelError::NotConnected)
        ));
    }

    #[test]
    fn test_unreachable_until_enabled() {
        let mut channel = MemoryChannel::unreachable();
        assert!(!channel.connect());
        channel.set_reachable(true);
        assert!(channel.connect());
        assert!(channel.is_connected());
    }

    #[test]
    fn test_unknown_names_read_zero() {
        let mut channel = connected();
        assert_eq!(channel.get_int("noSuchSignal").unwrap(), 0);
        assert_eq!(channel.get_float("noSuchFloat").unwrap(), 0.0);
    }

    #[test]
    fn test_snapshot_reads_every_group() {
        let mut channel = connected();
        channel.put_bool(names::SIM_STARTED, true);
        channel.put_bool(names::OBJECT_EXISTS[0], true);
        channel.put_float(names::HAND_Y, 12.0);
        channel.put_bool(names::HUMAN_GRASP[2], true);
        channel.put_bool(names::ROBOT_PLACE[1], true);
        channel.put_int(names::COLLISION_COUNT, 4);

        let snapshot = read_snapshot(&mut channel, 5).unwrap();
        assert!(snapshot.sim_started);
        assert_eq!(snapshot.objects, [true, false, false]);
        assert_eq!(snapshot.hand_y, 12.0);
        assert!(snapshot.human.grasped(ObjectId::ALL[2]));
        assert!(snapshot.robot.placed(ObjectId::ALL[1]));
        assert_eq!(snapshot.counters.collisions, 4);
    }

    #[test]
    fn test_presence_flicker_is_voted_out() {
        let mut channel = connected();
        channel.put_bool(names::OBJECT_EXISTS[1], true);
        // One dropped sample out of five
        channel.queue_ints(names::OBJECT_EXISTS[1], [1, 0, 1, 1, 1]);
        let snapshot = read_snapshot(&mut channel, 5).unwrap();
        assert!(snapshot.objects[1]);

        // Spawn glitch: two high samples out of five
        channel.put_bool(names::OBJECT_EXISTS[1], false);
        channel.queue_ints(names::OBJECT_EXISTS[1], [0, 1, 0, 1, 0]);
        let snapshot = read_snapshot(&mut channel, 5).unwrap();
        assert!(!snapshot.objects[1]);
    }

    #[test]
    fn test_write_command() {
        let mut channel = connected();
        let mut command = OutgoingCommand::new(ArchitectureMode::NoAnticipation);
        command.start_sim = true;
        command.set_target(ObjectId::new(3));
        write_command(&mut channel, &command).unwrap();

        assert_eq!(channel.peek_int(names::START_SIM), 1);
        assert_eq!(channel.peek_int(names::TARGET_OBJECT), 3);
        assert_eq!(channel.peek_int(names::ARCHITECTURE_MODE), 2);
    }

    #[test]
    fn test_reset_zeroes_namespace() {
        let mut channel = connected();
        channel.put_bool(names::HUMAN_PLACE[0], true);
        channel.put_float(names::HAND_PROXIMITY, 3.5);
        reset_signals(&mut channel).unwrap();
        assert_eq!(channel.peek_int(names::HUMAN_PLACE[0]), 0);
        assert_eq!(channel.peek_float(names::HAND_PROXIMITY), 0.0);
    }

    #[test]
    fn test_aggregate_flags_reset_but_not_polled() {
        let mut channel = connected();
        channel.put_bool(names::OBJECT_PLACED, true);
        reset_signals(&mut channel).unwrap();
        assert_eq!(channel.peek_int(names::OBJECT_PLACED), 0);

        // A queued value survives a snapshot read when the name is never polled
        channel.queue_ints(names::OBJECT_GRASPED, [1]);
        read_snapshot(&mut channel, 5).unwrap();
        assert_eq!(channel.get_int(names::OBJECT_GRASPED).unwrap(), 1);
    }

    #[test]
    fn test_handles_and_poses() {
        let mut channel = connected();
        let pose = Pose {
            position: Position::new(0.6, -0.1, 0.7),
            ..Pose::default()
        };
        channel.set_pose(names::HAND_HANDLE, pose);
        let handle = channel.object_handle(names::HAND_HANDLE).unwrap();
        assert_eq!(channel.object_pose(handle).unwrap(), pose);
        assert!(channel.object_handle("Table").is_err());
    }

    #[test]
    fn test_fault_injection() {
        let mut channel = connected();
        channel.inject_fault("socket closed");
        assert!(matches!(
            channel.get_int(names::SIM_STARTED),
            Err(ChannelError::Transport(_))
        ));
        channel.clear_fault();
        assert!(channel.get_int(names::SIM_STARTED).is_ok());
    }
}
