//! Intention model adapter
//!
//! Bridges filtered telemetry to an external neural-field solver and reads
//! the solver's decision back as a target object.
//!
//! The solver is addressed through [`StimulusSlot`], a fixed table of the
//! stimuli it exposes, so no element lookup by name happens per cycle.
//! The field axis is circular: `circular_distance(0, size) == 0`.

use std::collections::HashMap;

use crate::config::FieldConfig;
use crate::core::filters::HandTelemetry;
use crate::error::FieldError;
use crate::types::{ObjectId, Position};

/// Table midline the hand closeness is measured against (X, Z)
const TABLE_CENTER_X: f64 = 0.6;
const TABLE_CENTER_Z: f64 = 0.731;

/// Hand Y extent of the table, mapped onto the field axis
const TABLE_Y_MIN: f64 = -0.4;
const TABLE_Y_MAX: f64 = 0.1;

/// Stimuli of the solver the adapter drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StimulusSlot {
    /// Hand position/closeness stimulus
    Hand,
    /// Reach likelihood toward one object
    Likelihood(ObjectId),
    /// Presence anchor of one object
    Anchor(ObjectId),
}

/// Parameters of a Gaussian point stimulus on the field axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussStimulus {
    pub sigma: f64,
    pub amplitude: f64,
    pub position: f64,
}

impl GaussStimulus {
    pub fn new(sigma: f64, amplitude: f64, position: f64) -> Self {
        Self {
            sigma,
            amplitude,
            position,
        }
    }

    pub fn is_live(&self) -> bool {
        self.amplitude > 0.0
    }
}

/// External neural-field solver
///
/// The solver integrates stimuli on its own schedule; the adapter only sets
/// parameters and reads the output centroid.
pub trait IntentionField: Send {
    fn set_stimulus(&mut self, slot: StimulusSlot, stimulus: GaussStimulus) -> Result<(), FieldError>;

    /// Peak location of the decision layer; negative when no peak is active
    fn centroid(&self) -> Result<f64, FieldError>;

    /// Length of the circular axis
    fn size(&self) -> f64;
}

/// `min(|a-b|, size-|a-b|)`
pub fn circular_distance(a: f64, b: f64, size: f64) -> f64 {
    let direct = (a - b).abs();
    direct.min(size - direct)
}

/// Nearest anchor to the centroid, by circular distance
///
/// Anchors are evaluated in order and a later anchor only wins when it is
/// strictly closer. A negative, NaN or off-axis centroid yields `None`.
pub fn classify_centroid(centroid: f64, anchors: &[f64; 3], size: f64) -> Option<ObjectId> {
    if !(0.0..=size).contains(&centroid) {
        return None;
    }

    let mut best: Option<(usize, f64)> = None;
    for (index, anchor) in anchors.iter().enumerate() {
        let distance = circular_distance(centroid, *anchor, size);
        match best {
            Some((_, nearest)) if distance >= nearest => {}
            _ => best = Some((index, distance)),
        }
    }
    best.and_then(|(index, _)| ObjectId::from_index(index))
}

/// Inverse hand distance to the table midline in the X–Z plane
pub fn hand_closeness(hand: &Position, safe_zone: f64) -> f64 {
    let dx = hand.x - TABLE_CENTER_X;
    let dz = hand.z - TABLE_CENTER_Z;
    let distance = (dx * dx + dz * dz).sqrt();
    1.0 / distance.max(safe_zone)
}

/// Hand Y mapped from the table extent onto `[0, size]`
pub fn normalize_hand_y(y: f64, size: f64) -> f64 {
    size * (y - TABLE_Y_MIN) / (TABLE_Y_MAX - TABLE_Y_MIN)
}

/// Likelihood that the hand is reaching for `object`
///
/// The hand is extrapolated `tau` seconds along its current velocity and
/// scored with a Gaussian of width `sigma` around the object.
pub fn reach_likelihood(
    hand: &Position,
    previous: &Position,
    object: &Position,
    dt: f64,
    tau: f64,
    sigma: f64,
) -> f64 {
    if dt <= f64::EPSILON {
        return 0.0;
    }
    let predicted = Position::new(
        hand.x + (hand.x - previous.x) / dt * tau,
        hand.y + (hand.y - previous.y) / dt * tau,
        hand.z + (hand.z - previous.z) / dt * tau,
    );
    let distance = predicted.distance(object);
    (-(distance * distance) / (2.0 * sigma * sigma)).exp()
}

/// Drives the solver for one session
pub struct IntentionAdapter {
    field: Box<dyn IntentionField>,
    layout: FieldConfig,
    live: [bool; 3],
}

impl std::fmt::Debug for IntentionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentionAdapter")
            .field("layout", &self.layout)
            .field("live", &self.live)
            .finish_non_exhaustive()
    }
}

impl IntentionAdapter {
    pub fn new(field: Box<dyn IntentionField>, layout: FieldConfig) -> Self {
        Self {
            field,
            layout,
            live: [false; 3],
        }
    }

    /// Hand stimulus from signal telemetry: position = hand_y, amplitude = proximity
    pub fn set_hand_stimulus(&mut self, hand: HandTelemetry) -> Result<(), FieldError> {
        let stimulus = GaussStimulus::new(self.layout.stimulus_sigma, hand.proximity, hand.y);
        self.field.set_stimulus(StimulusSlot::Hand, stimulus)
    }

    /// Hand stimulus from a tracked pose
    pub fn set_hand_pose_stimulus(&mut self, hand: &Position) -> Result<(), FieldError> {
        let stimulus = GaussStimulus::new(
            self.layout.stimulus_sigma,
            hand_closeness(hand, self.layout.safe_zone),
            normalize_hand_y(hand.y, self.layout.size),
        );
        self.field.set_stimulus(StimulusSlot::Hand, stimulus)
    }

    /// One stimulus per object at its anchor, scaled by the reach likelihood
    pub fn set_likelihood_stimuli(&mut self, likelihoods: [f64; 3]) -> Result<(), FieldError> {
        for object in ObjectId::ALL {
            let stimulus = GaussStimulus::new(
                self.layout.stimulus_sigma,
                self.layout.anchor_amplitude * likelihoods[object.index()],
                self.layout.anchors[object.index()],
            );
            self.field.set_stimulus(StimulusSlot::Likelihood(object), stimulus)?;
        }
        Ok(())
    }

    /// Current decision of the field; `None` when no peak is active
    pub fn target_object(&self) -> Result<Option<ObjectId>, FieldError> {
        let centroid = self.field.centroid()?;
        Ok(classify_centroid(centroid, &self.layout.anchors, self.field.size()))
    }

    pub fn add_target_object(&mut self, object: ObjectId) -> Result<(), FieldError> {
        let stimulus = GaussStimulus::new(
            self.layout.stimulus_sigma,
            self.layout.anchor_amplitude,
            self.layout.anchors[object.index()],
        );
        self.field.set_stimulus(StimulusSlot::Anchor(object), stimulus)?;
        self.live[object.index()] = true;
        Ok(())
    }

    pub fn remove_target_object(&mut self, object: ObjectId) -> Result<(), FieldError> {
        let stimulus = GaussStimulus::new(1.0, 0.0, self.layout.anchors[object.index()]);
        self.field.set_stimulus(StimulusSlot::Anchor(object), stimulus)?;
        self.live[object.index()] = false;
        Ok(())
    }

    pub fn is_live(&self, object: ObjectId) -> bool {
        self.live[object.index()]
    }

    /// Silence every stimulus the adapter drives
    pub fn reset(&mut self) -> Result<(), FieldError> {
        let silent = GaussStimulus::new(self.layout.stimulus_sigma, 0.0, 0.0);
        self.field.set_stimulus(StimulusSlot::Hand, silent)?;
        for object in ObjectId::ALL {
            self.field.set_stimulus(StimulusSlot::Likelihood(object), silent)?;
            self.remove_target_object(object)?;
        }
        Ok(())
    }
}

// =============================================================================
// INPUT-PEAK FIELD
// =============================================================================

/// Solver stand-in without field dynamics
///
/// The centroid is the axis position where the summed stimulus input peaks,
/// or `-1.0` while that peak stays below `threshold`. Used for dry runs and
/// tests.
#[derive(Debug, Clone)]
pub struct InputPeakField {
    size: f64,
    resolution: f64,
    threshold: f64,
    stimuli: HashMap<StimulusSlot, GaussStimulus>,
}

impl InputPeakField {
    pub fn new(size: f64) -> Self {
        Self {
            size,
            resolution: 0.5,
            threshold: 1.0,
            stimuli: HashMap::new(),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn stimulus(&self, slot: StimulusSlot) -> Option<GaussStimulus> {
        self.stimuli.get(&slot).copied()
    }

    /// Summed input at `x`
    pub fn input_at(&self, x: f64) -> f64 {
        self.stimuli
            .values()
            .filter(|s| s.is_live() && s.sigma > 0.0)
            .map(|s| {
                let d = circular_distance(x, s.position, self.size);
                s.amplitude * (-(d * d) / (2.0 * s.sigma * s.sigma)).exp()
            })
            .sum()
    }
}

impl IntentionField for InputPeakField {
    fn set_stimulus(&mut self, slot: StimulusSlot, stimulus: GaussStimulus) -> Result<(), FieldError> {
        self.stimuli.insert(slot, stimulus);
        Ok(())
    }

    fn centroid(&self) -> Result<f64, FieldError> {
        let steps = (self.size / self.resolution) as usize;
        let (peak_x, peak) = (0..steps)
            .map(|i| i as f64 * self.resolution)
            .map(|x| (x, self.input_at(x)))
            .fold((-1.0, f64::MIN), |best, candidate| {
                if candidate.1 > best.1 {
                    candidate
                } else {
                    best
                }
            });
        if peak < self.threshold {
            Ok(-1.0)
        } else {
            Ok(peak_x)
        }
    }

    fn size(&self) -> f64 {
        self.size
    }
}
