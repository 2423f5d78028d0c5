//! Tracker-facing types.
//!
//! The hand tracker itself is external; this module only models what it
//! hands us every frame.

pub mod hand;

pub use hand::{
    HandFrame, HandLandmark, HandObservation, Handedness, Landmark, COORDS_PER_LANDMARK,
    LANDMARK_COUNT, MAX_HANDS,
};
