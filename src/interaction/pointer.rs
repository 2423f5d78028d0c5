//! Touchless pointer: the index fingertip drives a smoothed screen cursor,
//! thumb-index pinch clicks the target under it.
//!
//! Runs every frame while in navigate mode, directly on tracker output.

use tracing::{debug, trace};

use crate::sexp::quoted;
use crate::tracking::{HandFrame, HandLandmark, HandObservation, Handedness, Landmark};

// ── Targets ────────────────────────────────────────────────

/// An interactive on-screen element (pixel coordinates).
#[derive(Debug, Clone, PartialEq)]
pub struct UiTarget {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl UiTarget {
    pub fn new(id: &str, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            id: id.to_string(),
            x,
            y,
            width,
            height,
        }
    }

    /// Whether point (px, py) is inside this target's bounding box.
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }
}

// ── Cursor ─────────────────────────────────────────────────

/// Cursor snapshot for rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CursorState {
    pub x: f32,
    pub y: f32,
    pub is_pinching: bool,
    pub is_hovering: bool,
    pub visible: bool,
}

/// Events emitted by the pointer navigator.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerEvent {
    Shown { x: f32, y: f32 },
    Hidden,
    HoverEnter { id: String },
    HoverLeave { id: String },
    PinchDown,
    PinchUp,
    Click { id: String, x: f32, y: f32 },
}

// ── Config ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PointerConfig {
    /// Weight of the newest sample in the moving average (0.0-1.0).
    pub smoothing: f32,
    /// Thumb-index distance below which the hand is pinching.
    pub pinch_threshold: f32,
    /// Minimum time between synthesized clicks (ms).
    pub click_cooldown_ms: f64,
    /// Mirror horizontally (front camera).
    pub mirror: bool,
    pub screen_width: f32,
    pub screen_height: f32,
    /// Drive the cursor with this hand when both are visible.
    pub preferred_hand: Option<Handedness>,
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.25,
            pinch_threshold: 0.06,
            click_cooldown_ms: 600.0,
            mirror: true,
            screen_width: 1920.0,
            screen_height: 1080.0,
            preferred_hand: None,
        }
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

// ── Navigator ──────────────────────────────────────────────

pub struct PointerNavigator {
    pub config: PointerConfig,
    cursor: CursorState,
    targets: Vec<UiTarget>,
    hovered: Option<String>,
    last_click_ms: Option<f64>,
    /// Clicks synthesized this session.
    pub clicks: u64,
}

impl PointerNavigator {
    pub fn new(config: PointerConfig) -> Self {
        Self {
            config,
            cursor: CursorState::default(),
            targets: Vec::new(),
            hovered: None,
            last_click_ms: None,
            clicks: 0,
        }
    }

    pub fn cursor(&self) -> &CursorState {
        &self.cursor
    }

    pub fn hovered(&self) -> Option<&str> {
        self.hovered.as_deref()
    }

    pub fn targets(&self) -> &[UiTarget] {
        &self.targets
    }

    /// Replace the interactive targets. Hover on a removed target is
    /// dropped.
    pub fn set_targets(&mut self, targets: Vec<UiTarget>) -> Option<PointerEvent> {
        self.targets = targets;
        let id = self.hovered.take()?;
        if self.targets.iter().any(|t| t.id == id) {
            self.hovered = Some(id);
            None
        } else {
            self.cursor.is_hovering = false;
            Some(PointerEvent::HoverLeave { id })
        }
    }

    /// Find the target at a screen position.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<&UiTarget> {
        self.targets.iter().find(|t| t.contains(x, y))
    }

    fn driving_hand<'a>(&self, frame: &'a HandFrame) -> Option<&'a HandObservation> {
        let preferred = self
            .config
            .preferred_hand
            .and_then(|h| frame.hand(h))
            .filter(|h| h.is_complete());
        preferred.or_else(|| frame.hands.iter().find(|h| h.is_complete()))
    }

    fn to_screen(&self, tip: &Landmark) -> (f32, f32) {
        let nx = if self.config.mirror { 1.0 - tip.x } else { tip.x };
        (
            (nx * self.config.screen_width).clamp(0.0, self.config.screen_width),
            (tip.y * self.config.screen_height).clamp(0.0, self.config.screen_height),
        )
    }

    /// Per-frame update.
    pub fn update(&mut self, frame: &HandFrame, now_ms: f64) -> Vec<PointerEvent> {
        let Some(hand) = self.driving_hand(frame) else {
            return self.hide();
        };
        let (Some(index_tip), Some(thumb_tip)) = (
            hand.landmark(HandLandmark::IndexTip),
            hand.landmark(HandLandmark::ThumbTip),
        ) else {
            return self.hide();
        };
        let (raw_x, raw_y) = self.to_screen(index_tip);
        let pinching = thumb_tip.distance(index_tip) < self.config.pinch_threshold;

        let mut events = Vec::new();

        if self.cursor.visible {
            let a = self.config.smoothing.clamp(0.0, 1.0);
            self.cursor.x = lerp(self.cursor.x, raw_x, a);
            self.cursor.y = lerp(self.cursor.y, raw_y, a);
        } else {
            self.cursor.x = raw_x;
            self.cursor.y = raw_y;
            self.cursor.visible = true;
            debug!("Pointer acquired at ({:.0}, {:.0})", raw_x, raw_y);
            events.push(PointerEvent::Shown { x: raw_x, y: raw_y });
        }

        let hit = self
            .hit_test(self.cursor.x, self.cursor.y)
            .map(|t| t.id.clone());
        if hit != self.hovered {
            if let Some(id) = self.hovered.take() {
                events.push(PointerEvent::HoverLeave { id });
            }
            if let Some(id) = &hit {
                trace!("Hover {}", id);
                events.push(PointerEvent::HoverEnter { id: id.clone() });
            }
            self.hovered = hit;
        }
        self.cursor.is_hovering = self.hovered.is_some();

        if pinching && !self.cursor.is_pinching {
            events.push(PointerEvent::PinchDown);
            if let Some(id) = self.hovered.clone() {
                let cooled = self
                    .last_click_ms
                    .map(|t| now_ms - t >= self.config.click_cooldown_ms)
                    .unwrap_or(true);
                if cooled {
                    self.last_click_ms = Some(now_ms);
                    self.clicks += 1;
                    debug!("Click on {}", id);
                    events.push(PointerEvent::Click {
                        id,
                        x: self.cursor.x,
                        y: self.cursor.y,
                    });
                } else {
                    trace!("Click on {} suppressed by cooldown", id);
                }
            }
        } else if !pinching && self.cursor.is_pinching {
            events.push(PointerEvent::PinchUp);
        }
        self.cursor.is_pinching = pinching;

        events
    }

    /// Hide the cursor and clear hover. The next sighting snaps.
    pub fn hide(&mut self) -> Vec<PointerEvent> {
        let mut events = Vec::new();
        if let Some(id) = self.hovered.take() {
            events.push(PointerEvent::HoverLeave { id });
        }
        if self.cursor.visible {
            debug!("Pointer lost");
            events.push(PointerEvent::Hidden);
        }
        self.cursor.visible = false;
        self.cursor.is_pinching = false;
        self.cursor.is_hovering = false;
        events
    }

    /// Generate s-expression for status output.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:visible {} :x {:.0} :y {:.0} :pinching {} :hover {} :targets {} :clicks {})",
            if self.cursor.visible { "t" } else { "nil" },
            self.cursor.x,
            self.cursor.y,
            if self.cursor.is_pinching { "t" } else { "nil" },
            self.hovered
                .as_ref()
                .map(|id| quoted(id))
                .unwrap_or_else(|| "nil".to_string()),
            self.targets.len(),
            self.clicks,
        )
    }
}

impl Default for PointerNavigator {
    fn default() -> Self {
        Self::new(PointerConfig::default())
    }
}

// ── Test helpers ───────────────────────────────────────────

/// Hand with the index tip at (x, y) and the thumb tip `gap` to its right.
#[cfg(test)]
pub(crate) fn make_pointing_hand(x: f32, y: f32, gap: f32) -> HandObservation {
    use crate::tracking::LANDMARK_COUNT;

    let mut lm = vec![Landmark::new(x, y + 0.2, 0.0); LANDMARK_COUNT];
    lm[HandLandmark::IndexTip.index()] = Landmark::new(x, y, 0.0);
    lm[HandLandmark::ThumbTip.index()] = Landmark::new(x + gap, y, 0.0);
    HandObservation::new(lm, Handedness::Right, 0.0)
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn nav() -> PointerNavigator {
        let mut nav = PointerNavigator::new(PointerConfig {
            mirror: false,
            screen_width: 1000.0,
            screen_height: 1000.0,
            ..PointerConfig::default()
        });
        nav.set_targets(vec![UiTarget::new("speak", 400.0, 400.0, 200.0, 200.0)]);
        nav
    }

    fn frame(x: f32, y: f32, gap: f32, ts: f64) -> HandFrame {
        HandFrame::new(vec![make_pointing_hand(x, y, gap)], ts)
    }

    fn clicks(events: &[PointerEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, PointerEvent::Click { .. }))
            .count()
    }

    #[test]
    fn test_first_frame_snaps() {
        let mut nav = nav();
        let events = nav.update(&frame(0.1, 0.2, 0.2, 0.0), 0.0);
        assert_eq!(events[0], PointerEvent::Shown { x: 100.0, y: 200.0 });
        assert_eq!(nav.cursor().x, 100.0);
        assert!(nav.cursor().visible);
    }

    #[test]
    fn test_smoothing() {
        let mut nav = nav();
        nav.update(&frame(0.0, 0.0, 0.2, 0.0), 0.0);
        nav.update(&frame(0.4, 0.0, 0.2, 33.0), 33.0);
        // 25% of the way from 0 to 400.
        assert!((nav.cursor().x - 100.0).abs() < 1e-3, "x = {}", nav.cursor().x);
    }

    #[test]
    fn test_mirroring() {
        let mut nav = PointerNavigator::new(PointerConfig {
            screen_width: 1000.0,
            ..PointerConfig::default()
        });
        nav.update(&frame(0.2, 0.5, 0.2, 0.0), 0.0);
        assert!((nav.cursor().x - 800.0).abs() < 1e-3);
    }

    #[test]
    fn test_hover_enter_and_leave() {
        let mut nav = nav();
        let events = nav.update(&frame(0.5, 0.5, 0.2, 0.0), 0.0);
        assert!(events.contains(&PointerEvent::HoverEnter { id: "speak".into() }));
        assert!(nav.cursor().is_hovering);

        // Snap away by losing and reacquiring the hand.
        nav.update(&HandFrame::empty(33.0), 33.0);
        assert!(!nav.cursor().is_hovering);
        let events = nav.update(&frame(0.1, 0.1, 0.2, 66.0), 66.0);
        assert!(!events.iter().any(|e| matches!(e, PointerEvent::HoverEnter { .. })));
        assert_eq!(nav.hovered(), None);
    }

    #[test]
    fn test_pinch_click_once() {
        let mut nav = nav();
        nav.update(&frame(0.5, 0.5, 0.2, 0.0), 0.0);
        let events = nav.update(&frame(0.5, 0.5, 0.01, 33.0), 33.0);
        assert!(events.contains(&PointerEvent::PinchDown));
        assert_eq!(clicks(&events), 1);

        // Held pinch does not repeat.
        let events = nav.update(&frame(0.5, 0.5, 0.01, 66.0), 66.0);
        assert_eq!(clicks(&events), 0);
        assert_eq!(nav.clicks, 1);
    }

    #[test]
    fn test_click_cooldown() {
        let mut nav = nav();
        nav.update(&frame(0.5, 0.5, 0.2, 0.0), 0.0);
        nav.update(&frame(0.5, 0.5, 0.01, 100.0), 100.0);
        let up = nav.update(&frame(0.5, 0.5, 0.2, 200.0), 200.0);
        assert!(up.contains(&PointerEvent::PinchUp));
        let events = nav.update(&frame(0.5, 0.5, 0.01, 300.0), 300.0);
        assert!(events.contains(&PointerEvent::PinchDown));
        assert_eq!(clicks(&events), 0, "inside cooldown");

        nav.update(&frame(0.5, 0.5, 0.2, 500.0), 500.0);
        let events = nav.update(&frame(0.5, 0.5, 0.01, 700.0), 700.0);
        assert_eq!(clicks(&events), 1);
    }

    #[test]
    fn test_pinch_without_target_no_click() {
        let mut nav = nav();
        nav.update(&frame(0.1, 0.1, 0.2, 0.0), 0.0);
        let events = nav.update(&frame(0.1, 0.1, 0.01, 33.0), 33.0);
        assert!(events.contains(&PointerEvent::PinchDown));
        assert_eq!(clicks(&events), 0);
    }

    #[test]
    fn test_loss_hides_and_resnaps() {
        let mut nav = nav();
        nav.update(&frame(0.5, 0.5, 0.01, 0.0), 0.0);
        let events = nav.update(&HandFrame::empty(33.0), 33.0);
        assert!(events.contains(&PointerEvent::Hidden));
        assert!(events.contains(&PointerEvent::HoverLeave { id: "speak".into() }));
        assert!(!nav.cursor().visible);
        assert!(!nav.cursor().is_pinching);

        nav.update(&frame(0.9, 0.9, 0.2, 66.0), 66.0);
        assert_eq!(nav.cursor().x, 900.0, "reacquisition snaps");
    }

    #[test]
    fn test_malformed_hand_hides() {
        let mut nav = nav();
        nav.update(&frame(0.5, 0.5, 0.2, 0.0), 0.0);
        let bad = HandObservation::new(vec![Landmark::default(); 5], Handedness::Left, 33.0);
        let events = nav.update(&HandFrame::new(vec![bad], 33.0), 33.0);
        assert!(events.contains(&PointerEvent::Hidden));
    }

    #[test]
    fn test_set_targets_drops_stale_hover() {
        let mut nav = nav();
        nav.update(&frame(0.5, 0.5, 0.2, 0.0), 0.0);
        assert_eq!(nav.hovered(), Some("speak"));
        let event = nav.set_targets(vec![UiTarget::new("clear", 0.0, 0.0, 10.0, 10.0)]);
        assert_eq!(event, Some(PointerEvent::HoverLeave { id: "speak".into() }));
        assert_eq!(nav.hovered(), None);
    }

    #[test]
    fn test_status_sexp() {
        let nav = nav();
        let sexp = nav.status_sexp();
        assert!(sexp.starts_with("(:visible nil"));
        assert!(sexp.contains(":targets 1"));
    }
}
