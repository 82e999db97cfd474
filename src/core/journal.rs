//! Experiment journal
//!
//! Domain events (CONTROL / ROBOT / HUMAN lines) and the hand-pose trace.
//! Diagnostics go through `tracing`; the journal is the experiment record.
//!
//! On disk a session is a directory `session<yy-mm-dd_HHhMMmSSs>` holding
//! `logs.txt` (events) and `logs_human.txt` (hand trace). Both are
//! append-only and flushed after every line.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Local;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::types::{EventRecord, EventTag, Pose};

pub const EVENT_LOG_FILE: &str = "logs.txt";
pub const POSE_TRACE_FILE: &str = "logs_human.txt";

/// Destination of journal lines
///
/// Shared between the loop thread and the pose thread.
pub trait EventSink: Send + Sync {
    fn record(&self, record: &EventRecord) -> io::Result<()>;

    fn pose(&self, pose: &Pose) -> io::Result<()>;
}

/// File-backed journal of one session
#[derive(Debug)]
pub struct SessionJournal {
    dir: PathBuf,
    events: Mutex<File>,
    poses: Mutex<File>,
}

impl SessionJournal {
    /// Create the session directory under `root` and open both logs
    pub fn create(root: impl AsRef<Path>) -> io::Result<Self> {
        let name = Local::now().format("session%y-%m-%d_%Hh%Mm%Ss").to_string();
        let dir = root.as_ref().join(name);
        std::fs::create_dir_all(&dir)?;

        let open = |file: &str| OpenOptions::new().create(true).append(true).open(dir.join(file));
        let journal = Self {
            events: Mutex::new(open(EVENT_LOG_FILE)?),
            poses: Mutex::new(open(POSE_TRACE_FILE)?),
            dir,
        };

        let started = EventRecord::new(
            EventTag::Control,
            format!("Session started at {}.", Local::now().format("%Y-%m-%d %H:%M:%S")),
        );
        journal.record(&started)?;
        Ok(journal)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn event_log_path(&self) -> PathBuf {
        self.dir.join(EVENT_LOG_FILE)
    }

    pub fn pose_trace_path(&self) -> PathBuf {
        self.dir.join(POSE_TRACE_FILE)
    }
}

impl EventSink for SessionJournal {
    fn record(&self, record: &EventRecord) -> io::Result<()> {
        let mut file = self.events.lock();
        writeln!(file, "{}", record.to_line())?;
        file.flush()
    }

    fn pose(&self, pose: &Pose) -> io::Result<()> {
        let mut file = self.poses.lock();
        writeln!(
            file,
            "{} {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            pose.to_trace_line()
        )?;
        file.flush()
    }
}

/// In-memory journal for tests and the status monitor
///
/// Clones share the same storage. When built with a broadcast sender every
/// record is also published to live subscribers. With a capacity set, only
/// the newest records and poses are retained.
#[derive(Debug, Clone, Default)]
pub struct MemoryJournal {
    records: Arc<Mutex<VecDeque<EventRecord>>>,
    poses: Arc<Mutex<VecDeque<Pose>>>,
    /// Records seen since creation, including evicted ones
    total: Arc<AtomicUsize>,
    capacity: Option<usize>,
    live: Option<broadcast::Sender<EventRecord>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_broadcast(sender: broadcast::Sender<EventRecord>) -> Self {
        Self {
            live: Some(sender),
            ..Self::default()
        }
    }

    /// Keep at most `capacity` records and `capacity` poses
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn subscribe(&self) -> Option<broadcast::Receiver<EventRecord>> {
        self.live.as_ref().map(broadcast::Sender::subscribe)
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Last `limit` retained records, oldest first
    pub fn recent(&self, limit: usize) -> Vec<EventRecord> {
        let records = self.records.lock();
        let skip = records.len().saturating_sub(limit);
        records.iter().skip(skip).cloned().collect()
    }

    pub fn messages(&self, tag: EventTag) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter(|record| record.tag == tag)
            .map(|record| record.message.clone())
            .collect()
    }

    /// Number of retained records whose message contains `needle`
    pub fn count_containing(&self, needle: &str) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|record| record.message.contains(needle))
            .count()
    }

    pub fn poses(&self) -> Vec<Pose> {
        self.poses.lock().iter().copied().collect()
    }

    /// Retained records
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records seen since creation
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    fn push<T>(&self, queue: &Mutex<VecDeque<T>>, item: T) {
        let mut queue = queue.lock();
        if let Some(capacity) = self.capacity {
            if capacity == 0 {
                return;
            }
            while queue.len() >= capacity {
                queue.pop_front();
            }
        }
        queue.push_back(item);
    }
}

impl EventSink for MemoryJournal {
    fn record(&self, record: &EventRecord) -> io::Result<()> {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.push(&self.records, record.clone());
        if let Some(live) = &self.live {
            // No subscribers is not an error
            let _ = live.send(record.clone());
        }
        Ok(())
    }

    fn pose(&self, pose: &Pose) -> io::Result<()> {
        self.push(&self.poses, *pose);
        Ok(())
    }
}

/// Writes every line to each of its sinks, in order
#[derive(Default)]
pub struct Fanout {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for Fanout {
    fn record(&self, record: &EventRecord) -> io::Result<()> {
        self.sinks.iter().try_for_each(|sink| sink.record(record))
    }

    fn pose(&self, pose: &Pose) -> io::Result<()> {
        self.sinks.iter().try_for_each(|sink| sink.pose(pose))
    }
}
