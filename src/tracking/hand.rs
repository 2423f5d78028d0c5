//! Hand observation data structures produced by the external tracker.
//!
//! Models the 21 landmarks per hand reported by the camera tracker, in
//! normalized image coordinates (x right, y down, z toward the camera).
//! Provides landmark lookup, distance queries, and per-frame grouping.

use tracing::debug;

// ── Landmark definitions ───────────────────────────────────

/// The 21 hand landmarks, in tracker order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandLandmark {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexMcp,
    IndexPip,
    IndexDip,
    IndexTip,
    MiddleMcp,
    MiddlePip,
    MiddleDip,
    MiddleTip,
    RingMcp,
    RingPip,
    RingDip,
    RingTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Total number of landmarks per hand.
pub const LANDMARK_COUNT: usize = 21;

/// Coordinates per landmark (x, y, z).
pub const COORDS_PER_LANDMARK: usize = 3;

impl HandLandmark {
    /// Convert landmark enum to array index (0-20).
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// String representation for status output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wrist => "wrist",
            Self::ThumbCmc => "thumb-cmc",
            Self::ThumbMcp => "thumb-mcp",
            Self::ThumbIp => "thumb-ip",
            Self::ThumbTip => "thumb-tip",
            Self::IndexMcp => "index-mcp",
            Self::IndexPip => "index-pip",
            Self::IndexDip => "index-dip",
            Self::IndexTip => "index-tip",
            Self::MiddleMcp => "middle-mcp",
            Self::MiddlePip => "middle-pip",
            Self::MiddleDip => "middle-dip",
            Self::MiddleTip => "middle-tip",
            Self::RingMcp => "ring-mcp",
            Self::RingPip => "ring-pip",
            Self::RingDip => "ring-dip",
            Self::RingTip => "ring-tip",
            Self::PinkyMcp => "pinky-mcp",
            Self::PinkyPip => "pinky-pip",
            Self::PinkyDip => "pinky-dip",
            Self::PinkyTip => "pinky-tip",
        }
    }

    /// (tip, pip) pairs for the four non-thumb fingers.
    pub fn finger_tip_pip_pairs() -> [(HandLandmark, HandLandmark); 4] {
        [
            (Self::IndexTip, Self::IndexPip),
            (Self::MiddleTip, Self::MiddlePip),
            (Self::RingTip, Self::RingPip),
            (Self::PinkyTip, Self::PinkyPip),
        ]
    }
}

// ── Handedness ─────────────────────────────────────────────

/// Which hand, as labelled by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }
}

// ── Landmark ───────────────────────────────────────────────

/// One tracked point in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another landmark.
    pub fn distance(&self, other: &Landmark) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

// ── Hand observation ───────────────────────────────────────

/// One detected hand in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct HandObservation {
    /// Landmarks in `HandLandmark` order. Normally 21 entries.
    pub landmarks: Vec<Landmark>,
    /// Tracker handedness label.
    pub handedness: Handedness,
    /// Capture timestamp in milliseconds.
    pub timestamp_ms: f64,
}

impl HandObservation {
    pub fn new(landmarks: Vec<Landmark>, handedness: Handedness, timestamp_ms: f64) -> Self {
        if landmarks.len() != LANDMARK_COUNT {
            debug!(
                "Hand observation: expected {} landmarks, got {} for {:?}",
                LANDMARK_COUNT,
                landmarks.len(),
                handedness,
            );
        }
        Self {
            landmarks,
            handedness,
            timestamp_ms,
        }
    }

    /// Whether all 21 landmarks are present.
    pub fn is_complete(&self) -> bool {
        self.landmarks.len() == LANDMARK_COUNT
    }

    /// Landmark lookup. `None` when the observation is malformed.
    pub fn landmark(&self, which: HandLandmark) -> Option<&Landmark> {
        if !self.is_complete() {
            return None;
        }
        self.landmarks.get(which.index())
    }

    /// Distance between two landmarks on this hand.
    pub fn landmark_distance(&self, a: HandLandmark, b: HandLandmark) -> Option<f32> {
        let la = self.landmark(a)?;
        let lb = self.landmark(b)?;
        Some(la.distance(lb))
    }
}

// ── Frame ──────────────────────────────────────────────────

/// Maximum hands the tracker reports per frame.
pub const MAX_HANDS: usize = 2;

/// Everything the tracker produced for one camera frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HandFrame {
    /// Zero, one, or two hands in detection order.
    pub hands: Vec<HandObservation>,
    /// Frame timestamp in milliseconds.
    pub timestamp_ms: f64,
}

impl HandFrame {
    pub fn new(mut hands: Vec<HandObservation>, timestamp_ms: f64) -> Self {
        if hands.len() > MAX_HANDS {
            debug!("Hand frame: dropping {} extra hand(s)", hands.len() - MAX_HANDS);
            hands.truncate(MAX_HANDS);
        }
        Self {
            hands,
            timestamp_ms,
        }
    }

    /// A frame with no hands.
    pub fn empty(timestamp_ms: f64) -> Self {
        Self {
            hands: Vec::new(),
            timestamp_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hands.is_empty()
    }

    /// First hand with the given handedness.
    pub fn hand(&self, handedness: Handedness) -> Option<&HandObservation> {
        self.hands.iter().find(|h| h.handedness == handedness)
    }

    /// Generate s-expression for status output.
    pub fn status_sexp(&self) -> String {
        let hands: Vec<String> = self
            .hands
            .iter()
            .map(|h| {
                format!(
                    "(:hand :{} :complete {})",
                    h.handedness.as_str(),
                    if h.is_complete() { "t" } else { "nil" }
                )
            })
            .collect();
        format!(
            "(:timestamp-ms {:.0} :hands ({}))",
            self.timestamp_ms,
            hands.join(" ")
        )
    }
}

/// Build an observation with every landmark at the same point.
#[cfg(test)]
pub(crate) fn flat_hand(handedness: Handedness, x: f32, y: f32) -> HandObservation {
    HandObservation::new(
        vec![Landmark::new(x, y, 0.0); LANDMARK_COUNT],
        handedness,
        0.0,
    )
}

// ── Tests ──────────────────────────────────────────────────
