//! Sequence classifier adapter.
//!
//! Owns the frame window, hands complete windows to an external
//! `SequenceModel`, and turns its probability vector into a gated
//! `GestureResult`.  At most one request is outstanding at any time: a
//! classification tick that arrives while a request is in flight is
//! dropped, not queued.

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::features::{FeatureLayout, FeatureVector};
use super::sequence::{SequenceWindow, DEFAULT_SEQUENCE_LENGTH};
use crate::sexp::escape_string;
use crate::tracking::HandFrame;

// ── Errors ─────────────────────────────────────────────────

/// Failures reported by a sequence model.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("model not loaded")]
    Unavailable,
    #[error("model load failed: {0}")]
    Load(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("invalid input: expected {expected} frames, got {got}")]
    InvalidInput { expected: usize, got: usize },
}

// ── Model seam ─────────────────────────────────────────────

/// An external classifier over a full window of feature vectors.
///
/// Returns one score per vocabulary entry, in vocabulary order.
pub trait SequenceModel: Send {
    /// Number of classes the model scores.
    fn output_len(&self) -> usize;

    /// Score one window of exactly `sequence_length` frames.
    fn predict(&mut self, window: &[FeatureVector]) -> Result<Vec<f32>, ModelError>;
}

// ── Results ────────────────────────────────────────────────

/// Which recognizer produced a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureSource {
    /// Learned sequence classifier.
    Sequence,
    /// Geometric two-hand pose detector.
    Pose,
}

impl GestureSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequence => "sequence",
            Self::Pose => "pose",
        }
    }
}

/// A gated classification.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureResult {
    pub label: String,
    /// Top-class probability (0.0-1.0).
    pub confidence: f32,
    pub source: GestureSource,
}

/// A window handed out for classification.
#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    /// Matches the later `complete` call to this request.
    pub ticket: u64,
    /// Frames, oldest first.
    pub window: Vec<FeatureVector>,
}

// ── Advisories ─────────────────────────────────────────────

/// Kind of persistent, non-fatal diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisoryKind {
    /// No model: sequence gestures disabled.
    ModelUnavailable,
    /// Model output count differs from the configured vocabulary.
    VocabularyMismatch,
}

impl AdvisoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelUnavailable => "model-unavailable",
            Self::VocabularyMismatch => "vocabulary-mismatch",
        }
    }
}

/// A persistent diagnostic surfaced to the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct Advisory {
    pub kind: AdvisoryKind,
    pub message: String,
}

// ── Config ─────────────────────────────────────────────────

/// Configuration for the recognition pipeline.
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    /// Frames per classification window.
    pub sequence_length: usize,
    /// Minimum top-class probability to emit a result (exclusive).
    pub confidence_threshold: f32,
    /// Interval between classification ticks (ms).
    pub classify_interval_ms: f64,
    /// Consecutive hand-less frames that clear the window.
    pub silence_reset_frames: u32,
    /// Hands packed per feature vector.
    pub hand_slots: usize,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            sequence_length: DEFAULT_SEQUENCE_LENGTH,
            confidence_threshold: 0.45,
            classify_interval_ms: 300.0,
            silence_reset_frames: 10,
            hand_slots: 2,
        }
    }
}

// ── Model status ───────────────────────────────────────────

/// Lifecycle of the external model as seen by the adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelStatus {
    Loading,
    Ready { output_len: usize },
    Unavailable { reason: String },
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Ready { .. } => "ready",
            Self::Unavailable { .. } => "unavailable",
        }
    }
}

// ── Adapter ────────────────────────────────────────────────

/// Central sequence classification state.
pub struct ClassifierAdapter {
    /// Configuration.
    pub config: RecognitionConfig,
    layout: FeatureLayout,
    window: SequenceWindow,
    /// Configured vocabulary in model output order.
    labels: Vec<String>,
    /// Number of vocabulary entries actually scored.
    active_labels: usize,
    model: ModelStatus,
    in_flight: Option<u64>,
    next_ticket: u64,
    silent_frames: u32,
    last_gesture: Option<GestureResult>,
    advisories: Vec<Advisory>,
    /// Requests handed out.
    pub requests: u64,
    /// Ticks dropped because a request was outstanding.
    pub dropped_ticks: u64,
    /// Completed requests that fell below threshold.
    pub discarded: u64,
}

impl ClassifierAdapter {
    pub fn new(config: RecognitionConfig, labels: Vec<String>) -> Self {
        let layout = FeatureLayout::new(config.hand_slots);
        let window = SequenceWindow::new(config.sequence_length);
        let active_labels = labels.len();
        Self {
            config,
            layout,
            window,
            labels,
            active_labels,
            model: ModelStatus::Loading,
            in_flight: None,
            next_ticket: 1,
            silent_frames: 0,
            last_gesture: None,
            advisories: Vec::new(),
            requests: 0,
            dropped_ticks: 0,
            discarded: 0,
        }
    }

    /// Apply a new configuration. Changing the layout clears the window.
    pub fn set_config(&mut self, config: RecognitionConfig) {
        let layout = FeatureLayout::new(config.hand_slots);
        if layout != self.layout {
            self.layout = layout;
            self.window.clear();
        }
        self.window.set_capacity(config.sequence_length);
        self.config = config;
    }

    /// Replace the vocabulary and re-validate against a loaded model.
    pub fn set_labels(&mut self, labels: Vec<String>) {
        self.labels = labels;
        self.active_labels = self.labels.len();
        if let ModelStatus::Ready { output_len } = self.model {
            self.validate_vocabulary(output_len);
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn layout(&self) -> FeatureLayout {
        self.layout
    }

    /// Encode a frame into the window.
    ///
    /// Hand-less frames still push a zero vector until the silence
    /// threshold is reached; then the window is cleared so stale context
    /// cannot leak into the next gesture.
    pub fn push_frame(&mut self, frame: &HandFrame) {
        if frame.is_empty() {
            self.silent_frames = self.silent_frames.saturating_add(1);
            if self.silent_frames >= self.config.silence_reset_frames {
                if !self.window.is_empty() {
                    debug!(
                        "Sequence window cleared after {} silent frames",
                        self.silent_frames
                    );
                    self.window.clear();
                }
                return;
            }
        } else {
            self.silent_frames = 0;
        }
        self.window.push(self.layout.encode(frame));
    }

    /// Clear the window (e.g. on reinitialization).
    pub fn reset_window(&mut self) {
        self.window.clear();
        self.silent_frames = 0;
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn window_capacity(&self) -> usize {
        self.window.capacity()
    }

    /// Start a classification if the model is ready, the window is full,
    /// and nothing is in flight.
    pub fn begin_classify(&mut self) -> Option<ClassifyRequest> {
        if !matches!(self.model, ModelStatus::Ready { .. }) {
            return None;
        }
        if let Some(ticket) = self.in_flight {
            self.dropped_ticks += 1;
            trace!("Classification tick dropped, ticket {} in flight", ticket);
            return None;
        }
        if !self.window.is_full() {
            return None;
        }
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight = Some(ticket);
        self.requests += 1;
        Some(ClassifyRequest {
            ticket,
            window: self.window.snapshot(),
        })
    }

    /// Whether a request is outstanding.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Forget the outstanding request; its late result will be ignored.
    pub fn abandon_in_flight(&mut self) {
        if let Some(ticket) = self.in_flight.take() {
            debug!("Abandoned classification ticket {}", ticket);
        }
    }

    /// Finish the request identified by `ticket`.
    ///
    /// Returns a result only when the top score exceeds the threshold.
    /// Low-confidence output is an expected steady state and is dropped
    /// silently.
    pub fn complete(
        &mut self,
        ticket: u64,
        output: Result<Vec<f32>, ModelError>,
    ) -> Option<GestureResult> {
        if self.in_flight != Some(ticket) {
            debug!("Ignoring stale classification ticket {}", ticket);
            return None;
        }
        self.in_flight = None;

        let scores = match output {
            Ok(scores) => scores,
            Err(e) => {
                warn!("Sequence model failed: {}", e);
                return None;
            }
        };

        let usable = self.active_labels.min(scores.len());
        let best = scores[..usable]
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_finite())
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));

        let (index, score) = match best {
            Some((i, s)) => (i, s.clamp(0.0, 1.0)),
            None => return None,
        };

        if score <= self.config.confidence_threshold {
            self.discarded += 1;
            trace!(
                "Discarded {} at {:.2} (threshold {:.2})",
                self.labels[index],
                score,
                self.config.confidence_threshold
            );
            return None;
        }

        let result = GestureResult {
            label: self.labels[index].clone(),
            confidence: score,
            source: GestureSource::Sequence,
        };
        debug!("Classified {} at {:.2}", result.label, result.confidence);
        self.last_gesture = Some(result.clone());
        Some(result)
    }

    /// Most recent gated result.
    pub fn last_gesture(&self) -> Option<&GestureResult> {
        self.last_gesture.as_ref()
    }

    // ── Model lifecycle ───────────────────────────────────

    pub fn model_status(&self) -> &ModelStatus {
        &self.model
    }

    /// Record a loaded model and validate its output count.
    pub fn attach_model(&mut self, output_len: usize) {
        self.advisories
            .retain(|a| a.kind != AdvisoryKind::ModelUnavailable);
        self.model = ModelStatus::Ready { output_len };
        self.validate_vocabulary(output_len);
        info!(
            "Sequence model ready: {} outputs, {} labels active",
            output_len, self.active_labels
        );
    }

    /// Record that no model is available. Pose switching and pointer
    /// navigation keep working.
    pub fn detach_model(&mut self, reason: &str) {
        self.in_flight = None;
        self.model = ModelStatus::Unavailable {
            reason: reason.to_string(),
        };
        self.advisories
            .retain(|a| a.kind != AdvisoryKind::ModelUnavailable);
        self.advisories.push(Advisory {
            kind: AdvisoryKind::ModelUnavailable,
            message: format!("sequence gestures disabled: {}", reason),
        });
        warn!("Sequence model unavailable: {}", reason);
    }

    fn validate_vocabulary(&mut self, output_len: usize) {
        self.advisories
            .retain(|a| a.kind != AdvisoryKind::VocabularyMismatch);
        self.active_labels = self.labels.len().min(output_len);
        if output_len != self.labels.len() {
            let message = format!(
                "model scores {} classes but {} labels are configured; using the first {}",
                output_len,
                self.labels.len(),
                self.active_labels
            );
            warn!("Vocabulary mismatch: {}", message);
            self.advisories.push(Advisory {
                kind: AdvisoryKind::VocabularyMismatch,
                message,
            });
        }
    }

    /// Persistent diagnostics.
    pub fn advisories(&self) -> &[Advisory] {
        &self.advisories
    }

    /// Generate s-expression for status output.
    pub fn status_sexp(&self) -> String {
        let last = self
            .last_gesture
            .as_ref()
            .map(|g| {
                format!(
                    "(:label \"{}\" :confidence {:.2})",
                    escape_string(&g.label),
                    g.confidence
                )
            })
            .unwrap_or_else(|| "nil".to_string());
        format!(
            "(:model :{} :window {} :capacity {} :in-flight {} :labels {} :threshold {:.2} :requests {} :dropped {} :discarded {} :last {})",
            self.model.as_str(),
            self.window.len(),
            self.window.capacity(),
            if self.in_flight.is_some() { "t" } else { "nil" },
            self.active_labels,
            self.config.confidence_threshold,
            self.requests,
            self.dropped_ticks,
            self.discarded,
            last,
        )
    }
}

// ── Test helpers ───────────────────────────────────────────

#[cfg(test)]
pub(crate) fn test_labels() -> Vec<String> {
    ["hello", "thank_you", "letter_a", "letter_b"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
fn ready_adapter(sequence_length: usize) -> ClassifierAdapter {
    use crate::tracking::{hand::flat_hand, Handedness};

    let config = RecognitionConfig {
        sequence_length,
        ..RecognitionConfig::default()
    };
    let mut adapter = ClassifierAdapter::new(config, test_labels());
    adapter.attach_model(4);
    for _ in 0..sequence_length {
        adapter.push_frame(&HandFrame::new(vec![flat_hand(Handedness::Right, 0.5, 0.5)], 0.0));
    }
    adapter
}

// ── Tests ──────────────────────────────────────────────────
