//! Static hand pose detection from landmark geometry.
//!
//! Detects closed fist and thumbs-up per hand, per frame, from
//! fingertip-vs-joint relative positions.  No classifier involved, so this
//! works while the sequence model is still loading.  Two concurrent poses
//! map to a candidate interaction mode.

use tracing::trace;

use crate::interaction::InteractionMode;
use crate::tracking::{HandFrame, HandLandmark, HandObservation};

// ── Pose types ─────────────────────────────────────────────

/// Recognized static poses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandPose {
    /// All four fingers curled, thumb not raised.
    ClosedFist,
    /// Four fingers curled, thumb extended upward.
    ThumbsUp,
}

impl HandPose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClosedFist => "closed-fist",
            Self::ThumbsUp => "thumbs-up",
        }
    }
}

// ── Config ─────────────────────────────────────────────────

/// Thresholds for pose geometry (normalized image units).
#[derive(Debug, Clone)]
pub struct PoseConfig {
    /// A finger is curled when tip-to-wrist < pip-to-wrist × this ratio.
    pub curl_ratio: f32,
    /// How far the thumb tip must rise above the index knuckle.
    pub thumb_raise_margin: f32,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            curl_ratio: 1.0,
            thumb_raise_margin: 0.02,
        }
    }
}

// ── Detector ───────────────────────────────────────────────

/// Per-frame pose classifier.
#[derive(Debug, Clone, Default)]
pub struct PoseDetector {
    pub config: PoseConfig,
}

impl PoseDetector {
    pub fn new(config: PoseConfig) -> Self {
        Self { config }
    }

    /// Classify one hand. Malformed observations yield `None`.
    pub fn classify(&self, hand: &HandObservation) -> Option<HandPose> {
        if !hand.is_complete() {
            return None;
        }
        let wrist = hand.landmark(HandLandmark::Wrist)?;

        let fingers_curled = HandLandmark::finger_tip_pip_pairs().iter().all(|(tip, pip)| {
            match (hand.landmark(*tip), hand.landmark(*pip)) {
                (Some(t), Some(p)) => t.distance(wrist) < p.distance(wrist) * self.config.curl_ratio,
                _ => false,
            }
        });
        if !fingers_curled {
            return None;
        }

        if self.thumb_raised(hand)? {
            Some(HandPose::ThumbsUp)
        } else {
            Some(HandPose::ClosedFist)
        }
    }

    /// Thumb joints ascend (image y decreasing) and the tip clears the
    /// index knuckle.
    fn thumb_raised(&self, hand: &HandObservation) -> Option<bool> {
        let tip = hand.landmark(HandLandmark::ThumbTip)?;
        let ip = hand.landmark(HandLandmark::ThumbIp)?;
        let mcp = hand.landmark(HandLandmark::ThumbMcp)?;
        let index_mcp = hand.landmark(HandLandmark::IndexMcp)?;
        Some(
            tip.y < ip.y
                && ip.y < mcp.y
                && tip.y < index_mcp.y - self.config.thumb_raise_margin,
        )
    }

    /// Map two concurrent poses to a candidate mode.
    ///
    /// fist + fist → navigate, thumbs-up + thumbs-up → spelling,
    /// fist + thumbs-up (either hand) → sign.  Anything else, including a
    /// single hand, is no candidate.
    pub fn mode_candidate(&self, frame: &HandFrame) -> Option<InteractionMode> {
        if frame.hands.len() != 2 {
            return None;
        }
        let a = self.classify(&frame.hands[0])?;
        let b = self.classify(&frame.hands[1])?;
        let candidate = match (a, b) {
            (HandPose::ClosedFist, HandPose::ClosedFist) => InteractionMode::Navigate,
            (HandPose::ThumbsUp, HandPose::ThumbsUp) => InteractionMode::Spelling,
            _ => InteractionMode::Sign,
        };
        trace!(
            "Two-hand pose {} + {} -> {}",
            a.as_str(),
            b.as_str(),
            candidate.as_str()
        );
        Some(candidate)
    }
}

// ── Test helpers ───────────────────────────────────────────

/// Build a hand whose fingers are curled, with the thumb either tucked
/// (fist) or raised (thumbs-up). `dx` shifts the hand horizontally.
#[cfg(test)]
pub(crate) fn make_posed_hand(
    handedness: crate::tracking::Handedness,
    thumb_up: bool,
    dx: f32,
) -> HandObservation {
    use crate::tracking::{Landmark, LANDMARK_COUNT};

    let mut lm = vec![Landmark::default(); LANDMARK_COUNT];
    let mut set = |j: HandLandmark, x: f32, y: f32| {
        lm[j.index()] = Landmark::new(x + dx, y, 0.0);
    };
    set(HandLandmark::Wrist, 0.5, 0.8);
    let fingers = [
        (0.45, [HandLandmark::IndexMcp, HandLandmark::IndexPip, HandLandmark::IndexDip, HandLandmark::IndexTip]),
        (0.50, [HandLandmark::MiddleMcp, HandLandmark::MiddlePip, HandLandmark::MiddleDip, HandLandmark::MiddleTip]),
        (0.55, [HandLandmark::RingMcp, HandLandmark::RingPip, HandLandmark::RingDip, HandLandmark::RingTip]),
        (0.60, [HandLandmark::PinkyMcp, HandLandmark::PinkyPip, HandLandmark::PinkyDip, HandLandmark::PinkyTip]),
    ];
    for (x, [mcp, pip, dip, tip]) in fingers {
        set(mcp, x, 0.6);
        set(pip, x, 0.5);
        set(dip, x, 0.58);
        set(tip, x, 0.65);
    }
    set(HandLandmark::ThumbCmc, 0.45, 0.75);
    if thumb_up {
        set(HandLandmark::ThumbMcp, 0.42, 0.6);
        set(HandLandmark::ThumbIp, 0.42, 0.5);
        set(HandLandmark::ThumbTip, 0.42, 0.4);
    } else {
        set(HandLandmark::ThumbMcp, 0.42, 0.7);
        set(HandLandmark::ThumbIp, 0.43, 0.66);
        set(HandLandmark::ThumbTip, 0.46, 0.63);
    }
    HandObservation::new(lm, handedness, 0.0)
}

/// Build an open hand (all fingers extended).
#[cfg(test)]
pub(crate) fn make_open_hand(handedness: crate::tracking::Handedness, dx: f32) -> HandObservation {
    let mut hand = make_posed_hand(handedness, false, dx);
    for (tip, _) in HandLandmark::finger_tip_pip_pairs() {
        hand.landmarks[tip.index()].y = 0.3;
    }
    hand
}

/// Two-hand frame for a pair of poses (`true` = thumbs-up).
#[cfg(test)]
pub(crate) fn make_pose_frame(left_up: bool, right_up: bool, timestamp_ms: f64) -> HandFrame {
    use crate::tracking::Handedness;

    HandFrame::new(
        vec![
            make_posed_hand(Handedness::Left, left_up, -0.3),
            make_posed_hand(Handedness::Right, right_up, 0.3),
        ],
        timestamp_ms,
    )
}

// ── Tests ──────────────────────────────────────────────────
