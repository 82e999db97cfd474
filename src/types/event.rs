//! Experiment journal entries

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Source tag of a journal line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventTag {
    /// Session and trial bookkeeping
    Control,
    /// Robot decisions and actions
    Robot,
    /// Participant actions
    Human,
}

impl EventTag {
    pub fn code(&self) -> &'static str {
        match self {
            EventTag::Control => "CONTROL",
            EventTag::Robot => "ROBOT",
            EventTag::Human => "HUMAN",
        }
    }
}

impl std::fmt::Display for EventTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One line of the experiment journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Local>,
    pub tag: EventTag,
    pub message: String,
}

impl EventRecord {
    pub fn new(tag: EventTag, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            tag,
            message: message.into(),
        }
    }

    /// `YYYY-mm-dd HH:MM:SS TAG message`
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.tag,
            self.message
        )
    }
}
