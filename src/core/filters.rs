//! Denoising filters for simulator telemetry
//!
//! - Majority vote over repeated reads of a presence flag
//! - Validity gate with a "no reading" sentinel for hand telemetry
//! - Exponential moving average, seeded by the first accepted value
//! - Euclidean jump rejection for hand positions
//!
//! All state lives in the filter values themselves; the session owns them
//! and resets them at the start of every trial.

use crate::config::{FilterConfig, Range};
use crate::types::Position;
use crate::NO_READING_SENTINEL;

/// True iff strictly more than half of the samples are true
///
/// An exact tie is false. An empty sample set is false.
pub fn majority<I: IntoIterator<Item = bool>>(samples: I) -> bool {
    let (hits, total) = samples
        .into_iter()
        .fold((0usize, 0usize), |(hits, total), sample| {
            (hits + usize::from(sample), total + 1)
        });
    hits * 2 > total
}

/// Take `sample_size` consecutive reads and vote on them
///
/// The first failing read aborts the vote.
pub fn sample_majority<E>(
    sample_size: usize,
    mut read: impl FnMut() -> Result<bool, E>,
) -> Result<bool, E> {
    let mut samples = Vec::with_capacity(sample_size);
    for _ in 0..sample_size {
        samples.push(read()?);
    }
    Ok(majority(samples))
}

/// Exponential moving average
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, value: None }
    }

    /// Fold one sample in; the first sample seeds the average
    pub fn update(&mut self, raw: f64) -> f64 {
        let next = match self.value {
            Some(previous) => self.alpha * raw + (1.0 - self.alpha) * previous,
            None => raw,
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

/// Outcome of gating one raw hand reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateOutcome {
    Accepted { y: f64, proximity: f64 },
    /// Sentinel seen; stands for a hand away from the table
    NoReading,
    Rejected,
}

/// Check a raw `(hand_y, hand_proximity)` pair against the validity ranges
pub fn gate_hand_reading(y: f64, proximity: f64, y_range: Range, proximity_range: Range) -> GateOutcome {
    if y == NO_READING_SENTINEL || proximity == NO_READING_SENTINEL {
        return GateOutcome::NoReading;
    }
    if y_range.contains(y) && proximity_range.contains(proximity) {
        GateOutcome::Accepted { y, proximity }
    } else {
        GateOutcome::Rejected
    }
}

/// Smoothed hand telemetry fed to the intention field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandTelemetry {
    pub y: f64,
    pub proximity: f64,
}

/// Gate followed by per-channel smoothing
#[derive(Debug, Clone)]
pub struct TelemetryFilter {
    y_range: Range,
    proximity_range: Range,
    y: Ema,
    proximity: Ema,
}

impl TelemetryFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            y_range: config.hand_y_range,
            proximity_range: config.hand_proximity_range,
            y: Ema::new(config.ema_alpha),
            proximity: Ema::new(config.ema_alpha),
        }
    }

    /// Smoothed value after this reading
    ///
    /// Rejected readings leave the average untouched and return the held
    /// value; `None` until a first reading has been accepted.
    pub fn apply(&mut self, raw_y: f64, raw_proximity: f64) -> Option<HandTelemetry> {
        match gate_hand_reading(raw_y, raw_proximity, self.y_range, self.proximity_range) {
            GateOutcome::Accepted { y, proximity } => Some(self.fold(y, proximity)),
            GateOutcome::NoReading => Some(self.fold(0.0, 0.0)),
            GateOutcome::Rejected => self.current(),
        }
    }

    pub fn current(&self) -> Option<HandTelemetry> {
        Some(HandTelemetry {
            y: self.y.value()?,
            proximity: self.proximity.value()?,
        })
    }

    pub fn reset(&mut self) {
        self.y.reset();
        self.proximity.reset();
    }

    fn fold(&mut self, y: f64, proximity: f64) -> HandTelemetry {
        HandTelemetry {
            y: self.y.update(y),
            proximity: self.proximity.update(proximity),
        }
    }
}

/// Drops position samples that jump further than `threshold` from the last accepted one
#[derive(Debug, Clone)]
pub struct JumpReject {
    threshold: f64,
    last: Option<Position>,
}

impl JumpReject {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            last: None,
        }
    }

    /// Accepted position for this sample
    pub fn filter(&mut self, position: Position) -> Position {
        match self.last {
            Some(last) if last.distance(&position) > self.threshold => last,
            _ => {
                self.last = Some(position);
                position
            }
        }
    }

    pub fn last(&self) -> Option<Position> {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
