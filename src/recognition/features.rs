//! Feature encoding for sequence classification.
//!
//! Packs every tracked hand of one frame into a fixed-size vector matching
//! the recorder's sample format: `hand_slots × 21 landmarks × (x, y, z)`.
//! Hands fill slots in detection order; unused slots stay zero.

use crate::tracking::{
    HandFrame, HandObservation, Handedness, Landmark, COORDS_PER_LANDMARK, LANDMARK_COUNT,
    MAX_HANDS,
};

/// Floats contributed by one hand.
pub const FEATURES_PER_HAND: usize = LANDMARK_COUNT * COORDS_PER_LANDMARK;

/// One encoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    /// All-zero vector of the given length.
    pub fn zeros(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    pub fn from_vec(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether every component is zero (no hand encoded).
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }
}

/// Shape of the encoded vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureLayout {
    /// Number of hands packed per frame (1 or 2).
    pub hand_slots: usize,
}

impl Default for FeatureLayout {
    fn default() -> Self {
        Self {
            hand_slots: MAX_HANDS,
        }
    }
}

impl FeatureLayout {
    pub fn new(hand_slots: usize) -> Self {
        Self {
            hand_slots: hand_slots.clamp(1, MAX_HANDS),
        }
    }

    /// Encoded vector length.
    pub fn width(&self) -> usize {
        self.hand_slots * FEATURES_PER_HAND
    }

    /// Encode one frame. Malformed hands leave their slot zeroed.
    pub fn encode(&self, frame: &HandFrame) -> FeatureVector {
        let mut values = vec![0.0; self.width()];
        for (slot, hand) in frame.hands.iter().take(self.hand_slots).enumerate() {
            if !hand.is_complete() {
                continue;
            }
            let offset = slot * FEATURES_PER_HAND;
            for (i, lm) in hand.landmarks.iter().enumerate() {
                let base = offset + i * COORDS_PER_LANDMARK;
                values[base] = lm.x;
                values[base + 1] = lm.y;
                values[base + 2] = lm.z;
            }
        }
        FeatureVector(values)
    }

    /// Inverse of `encode`: rebuild observations from a recorded row.
    ///
    /// An all-zero slot means no hand. The recording does not carry
    /// handedness, so slot 0 is reported as right and slot 1 as left.
    pub fn decode(&self, values: &[f32], timestamp_ms: f64) -> HandFrame {
        let mut hands = Vec::new();
        for slot in 0..self.hand_slots {
            let offset = slot * FEATURES_PER_HAND;
            let Some(chunk) = values.get(offset..offset + FEATURES_PER_HAND) else {
                break;
            };
            if chunk.iter().all(|v| *v == 0.0) {
                continue;
            }
            let landmarks = chunk
                .chunks_exact(COORDS_PER_LANDMARK)
                .map(|c| Landmark::new(c[0], c[1], c[2]))
                .collect();
            let handedness = if slot == 0 {
                Handedness::Right
            } else {
                Handedness::Left
            };
            hands.push(HandObservation::new(landmarks, handedness, timestamp_ms));
        }
        HandFrame::new(hands, timestamp_ms)
    }
}
