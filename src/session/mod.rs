//! Session orchestrator, the top-level status machine.
//!
//! Sequences detection → confirmation → speech, owns the transcript, and
//! routes classifier output to the mode state machine, the word builder,
//! or the confirmation flow.  Every input returns the events it caused;
//! nothing here blocks or sleeps.  The caller supplies time in ms.
//!
//! Within one frame the order is fixed: pointer, pose-driven mode check,
//! window push, then timers.  A mode switch seen this frame is therefore
//! in effect before any classification result that follows it.

pub mod phrasebook;
pub mod speech;
pub mod transcript;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::interaction::{
    letter_from_label, CursorState, InteractionMode, ModeEvent, ModeHold, ModeStateMachine,
    PointerEvent, PointerNavigator, TimerSlot, UiTarget, WordBuilder, WordEvent,
};
use crate::recognition::{
    Advisory, ClassifierAdapter, ClassifyRequest, GestureResult, GestureSource, ModelError,
    PoseDetector,
};
use crate::sexp::{escape_string, quoted};
use crate::tracking::HandFrame;

pub use phrasebook::{humanize_label, Phrasebook};
pub use speech::{CommandSpeech, LogSpeech, SpeechError, SpeechEvent, SpeechSynthesizer};
pub use transcript::{Transcript, TranslationEntry};

// ── Status ─────────────────────────────────────────────────

/// Overall session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemStatus {
    #[default]
    Initializing,
    Ready,
    Detecting,
    Confirming,
    Speaking,
    Error,
}

impl SystemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Detecting => "detecting",
            Self::Confirming => "confirming",
            Self::Speaking => "speaking",
            Self::Error => "error",
        }
    }

    /// Whether frames are processed at all.
    pub fn is_running(&self) -> bool {
        !matches!(self, Self::Initializing | Self::Error)
    }

    /// Whether new classifications may turn into actions.
    pub fn accepts_gestures(&self) -> bool {
        matches!(self, Self::Ready | Self::Detecting)
    }
}

// ── Config ─────────────────────────────────────────────────

/// Classifier labels that select a mode directly.
#[derive(Debug, Clone)]
pub struct ModeLabels {
    pub sign: String,
    pub spelling: String,
    pub navigate: String,
}

impl Default for ModeLabels {
    fn default() -> Self {
        Self {
            sign: "mode_sign".to_string(),
            spelling: "mode_spell".to_string(),
            navigate: "mode_navigate".to_string(),
        }
    }
}

impl ModeLabels {
    pub fn mode_for(&self, label: &str) -> Option<InteractionMode> {
        if label == self.sign {
            Some(InteractionMode::Sign)
        } else if label == self.spelling {
            Some(InteractionMode::Spelling)
        } else if label == self.navigate {
            Some(InteractionMode::Navigate)
        } else {
            None
        }
    }

    pub fn label_for(&self, mode: InteractionMode) -> &str {
        match mode {
            InteractionMode::Sign => &self.sign,
            InteractionMode::Spelling => &self.spelling,
            InteractionMode::Navigate => &self.navigate,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Hand-less frames before `detecting` falls back to `ready`.
    pub idle_frames_to_ready: u32,
    /// Auto-confirm countdown (ms).
    pub confirm_ms: f64,
    /// Initial speech/display language tag.
    pub language: String,
    pub mode_labels: ModeLabels,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_frames_to_ready: 10,
            confirm_ms: 2000.0,
            language: "en".to_string(),
            mode_labels: ModeLabels::default(),
        }
    }
}

/// Transcript label for fingerspelled words.
pub const SPELLING_LABEL: &str = "spelling";

// ── Events ─────────────────────────────────────────────────

/// Everything the session reports outward.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StatusChanged {
        from: SystemStatus,
        to: SystemStatus,
    },
    Mode(ModeEvent),
    Word(WordEvent),
    Pointer(PointerEvent),
    /// A gated classification or committed pose.
    Gesture(GestureResult),
    /// A translation is waiting for its countdown.
    Pending { label: String, text: String },
    ConfirmationCancelled,
    EntryAppended(TranslationEntry),
    /// Ask the synthesizer to speak.
    Speak { text: String, language: String },
    /// Ask the synthesizer to stop.
    CancelSpeech,
    LanguageChanged { language: String },
    Advisory(Advisory),
    Error { message: String },
}

// ── Snapshot ───────────────────────────────────────────────

/// Translation awaiting confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTranslation {
    pub label: String,
    pub text: String,
    /// Language `text` is written in; recorded and spoken with it.
    pub language: String,
    pub started_ms: f64,
}

/// Read-only view for rendering layers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub status: SystemStatus,
    pub mode: InteractionMode,
    pub hold: Option<ModeHold>,
    pub cursor: CursorState,
    pub hovered: Option<String>,
    pub word: Option<String>,
    pub word_countdown_secs: Option<u32>,
    pub pending: Option<PendingTranslation>,
    pub confirm_countdown_secs: Option<u32>,
    pub last_gesture: Option<GestureResult>,
    pub transcript_len: usize,
    pub language: String,
    pub advisories: Vec<Advisory>,
    pub error: Option<String>,
}

// ── Session ────────────────────────────────────────────────

pub struct Session {
    config: EngineConfig,
    status: SystemStatus,
    classifier: ClassifierAdapter,
    poses: PoseDetector,
    mode: ModeStateMachine,
    word: WordBuilder,
    pointer: PointerNavigator,
    transcript: Transcript,
    pending: Option<PendingTranslation>,
    confirm_timer: TimerSlot,
    language: String,
    idle_frames: u32,
    last_gesture: Option<GestureResult>,
    error: Option<String>,
    now_ms: f64,
    /// Frames processed.
    pub frames: u64,
}

impl Session {
    pub fn new(config: EngineConfig) -> Self {
        let classifier = ClassifierAdapter::new(config.recognition.clone(), config.labels.clone());
        Self {
            status: SystemStatus::Initializing,
            classifier,
            poses: PoseDetector::new(config.pose.clone()),
            mode: ModeStateMachine::new(config.mode.clone()),
            word: WordBuilder::new(config.word.clone()),
            pointer: PointerNavigator::new(config.pointer.clone()),
            transcript: Transcript::new(),
            pending: None,
            confirm_timer: TimerSlot::new("confirm"),
            language: config.session.language.clone(),
            idle_frames: 0,
            last_gesture: None,
            error: None,
            now_ms: 0.0,
            frames: 0,
            config,
        }
    }

    // ── Accessors ─────────────────────────────────────────

    pub fn status(&self) -> SystemStatus {
        self.status
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode.mode()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn classifier(&self) -> &ClassifierAdapter {
        &self.classifier
    }

    pub fn word(&self) -> &WordBuilder {
        &self.word
    }

    pub fn pointer(&self) -> &PointerNavigator {
        &self.pointer
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Push a new configuration into every component. Takes effect on the
    /// next input.
    pub fn set_config(&mut self, config: EngineConfig) {
        self.classifier.set_config(config.recognition.clone());
        if config.labels != self.config.labels {
            self.classifier.set_labels(config.labels.clone());
        }
        self.poses.config = config.pose.clone();
        self.mode.config = config.mode.clone();
        self.word.config = config.word.clone();
        self.pointer.config = config.pointer.clone();
        self.config = config;
        debug!("Session configuration updated");
    }

    fn set_status(&mut self, to: SystemStatus, events: &mut Vec<SessionEvent>) {
        if self.status == to {
            return;
        }
        let from = self.status;
        self.status = to;
        info!("Status {} -> {}", from.as_str(), to.as_str());
        events.push(SessionEvent::StatusChanged { from, to });
    }

    // ── Lifecycle ─────────────────────────────────────────

    /// The tracker is up: `initializing → ready`.
    pub fn start(&mut self, now_ms: f64) -> Vec<SessionEvent> {
        self.now_ms = now_ms;
        let mut events = Vec::new();
        if self.status == SystemStatus::Initializing {
            self.idle_frames = 0;
            self.set_status(SystemStatus::Ready, &mut events);
        }
        events
    }

    /// Camera or tracker failed. Everything stops until `reinitialize`.
    pub fn on_acquisition_failure(&mut self, reason: &str, now_ms: f64) -> Vec<SessionEvent> {
        self.now_ms = now_ms;
        let mut events = self.stop_all();
        self.error = Some(reason.to_string());
        warn!("Acquisition failure: {}", reason);
        self.set_status(SystemStatus::Error, &mut events);
        events.push(SessionEvent::Error {
            message: reason.to_string(),
        });
        events
    }

    /// Leave `error` and wait for `start` again. The transcript survives.
    pub fn reinitialize(&mut self, now_ms: f64) -> Vec<SessionEvent> {
        self.now_ms = now_ms;
        let mut events = Vec::new();
        if self.status != SystemStatus::Error {
            return events;
        }
        self.error = None;
        self.idle_frames = 0;
        self.classifier.reset_window();
        info!("Reinitializing session");
        self.set_status(SystemStatus::Initializing, &mut events);
        events
    }

    /// Cancel every timer and in-flight activity.
    pub fn shutdown(&mut self, now_ms: f64) -> Vec<SessionEvent> {
        self.now_ms = now_ms;
        let mut events = self.stop_all();
        self.set_status(SystemStatus::Initializing, &mut events);
        info!(
            "Session shut down: {} frames, {} transcript entries",
            self.frames,
            self.transcript.len()
        );
        events
    }

    fn stop_all(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.status == SystemStatus::Speaking {
            events.push(SessionEvent::CancelSpeech);
        }
        self.confirm_timer.cancel();
        if self.pending.take().is_some() {
            events.push(SessionEvent::ConfirmationCancelled);
        }
        if let Some(e) = self.word.cancel() {
            events.push(SessionEvent::Word(e));
        }
        events.extend(self.mode.reset().map(SessionEvent::Mode));
        events.extend(self.pointer.hide().into_iter().map(SessionEvent::Pointer));
        self.classifier.abandon_in_flight();
        self.classifier.reset_window();
        events
    }

    // ── Frame input ───────────────────────────────────────

    /// Process one tracker frame.
    pub fn on_frame(&mut self, frame: &HandFrame) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if !self.status.is_running() {
            return events;
        }
        let now = frame.timestamp_ms;
        self.now_ms = now;
        self.frames += 1;

        if self.mode.mode() == InteractionMode::Navigate {
            events.extend(
                self.pointer
                    .update(frame, now)
                    .into_iter()
                    .map(SessionEvent::Pointer),
            );
        }

        let candidate = self.poses.mode_candidate(frame);
        if let Some(event) = self.mode.update(candidate, now) {
            if let ModeEvent::Switched { from, to, .. } = event {
                let label = self.config.session.mode_labels.label_for(to).to_string();
                let gesture = GestureResult {
                    label,
                    confidence: 1.0,
                    source: GestureSource::Pose,
                };
                self.last_gesture = Some(gesture.clone());
                events.push(SessionEvent::Gesture(gesture));
                events.push(SessionEvent::Mode(event));
                events.extend(self.leave_mode(from, to));
            } else {
                events.push(SessionEvent::Mode(event));
            }
        }

        self.classifier.push_frame(frame);

        if frame.is_empty() {
            self.idle_frames = self.idle_frames.saturating_add(1);
        } else {
            self.idle_frames = 0;
        }
        self.update_presence(&mut events);

        events.extend(self.tick(now));
        events
    }

    fn update_presence(&mut self, events: &mut Vec<SessionEvent>) {
        let spelling_word =
            self.mode.mode() == InteractionMode::Spelling && self.word.is_active();
        match self.status {
            SystemStatus::Ready if self.idle_frames == 0 || spelling_word => {
                self.set_status(SystemStatus::Detecting, events);
            }
            SystemStatus::Detecting
                if !spelling_word
                    && self.idle_frames >= self.config.session.idle_frames_to_ready =>
            {
                self.set_status(SystemStatus::Ready, events);
            }
            _ => {}
        }
    }

    /// Side effects of leaving a mode.
    fn leave_mode(&mut self, from: InteractionMode, to: InteractionMode) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if from == to {
            return events;
        }
        if from == InteractionMode::Spelling {
            if let Some(e) = self.word.cancel() {
                events.push(SessionEvent::Word(e));
            }
        }
        if from == InteractionMode::Navigate {
            events.extend(self.pointer.hide().into_iter().map(SessionEvent::Pointer));
        }
        events
    }

    /// Manual mode selection. Bypasses hold and cooldown.
    pub fn set_mode(&mut self, mode: InteractionMode, now_ms: f64) -> Vec<SessionEvent> {
        self.now_ms = now_ms;
        let mode_events = self.mode.set_mode(mode);
        self.apply_mode_events(mode_events)
    }

    /// Forward mode events, running exit side effects after each switch.
    fn apply_mode_events(&mut self, mode_events: Vec<ModeEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        for event in mode_events {
            let switch = match event {
                ModeEvent::Switched { from, to, .. } => Some((from, to)),
                _ => None,
            };
            events.push(SessionEvent::Mode(event));
            if let Some((from, to)) = switch {
                events.extend(self.leave_mode(from, to));
            }
        }
        events
    }

    // ── Classification ────────────────────────────────────

    /// Classification tick. Returns the request to hand to the model, if
    /// one should be made now.
    pub fn on_classify_tick(&mut self, now_ms: f64) -> Option<ClassifyRequest> {
        self.now_ms = now_ms;
        if !self.status.accepts_gestures() {
            return None;
        }
        self.classifier.begin_classify()
    }

    /// Model output for a request made by `on_classify_tick`.
    pub fn on_model_output(
        &mut self,
        ticket: u64,
        output: Result<Vec<f32>, ModelError>,
        now_ms: f64,
    ) -> Vec<SessionEvent> {
        self.now_ms = now_ms;
        match self.classifier.complete(ticket, output) {
            Some(result) => self.route_gesture(result, now_ms),
            None => Vec::new(),
        }
    }

    fn route_gesture(&mut self, result: GestureResult, now_ms: f64) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if !self.status.accepts_gestures() {
            debug!(
                "Ignoring {} while {}",
                result.label,
                self.status.as_str()
            );
            return events;
        }
        self.last_gesture = Some(result.clone());
        events.push(SessionEvent::Gesture(result.clone()));

        if let Some(target) = self.config.session.mode_labels.mode_for(&result.label) {
            let mode_events = self.mode.request_from_classifier(target, now_ms);
            events.extend(self.apply_mode_events(mode_events));
            return events;
        }

        let letter = letter_from_label(&result.label);
        match (self.mode.mode(), letter) {
            (InteractionMode::Spelling, Some(letter)) => {
                let word_events = self.word.on_letter(letter, result.confidence, now_ms);
                events.extend(self.handle_word_events(word_events, now_ms));
            }
            (InteractionMode::Spelling, None) => {
                debug!("Ignoring {} in spelling mode", result.label);
            }
            (_, Some(_)) => {
                debug!("Ignoring letter {} outside spelling mode", result.label);
            }
            (_, None) => {
                let text = self
                    .config
                    .phrasebook
                    .text_for(&result.label, &self.language);
                events.extend(self.begin_confirmation(&result.label, text, now_ms));
            }
        }
        events
    }

    fn handle_word_events(&mut self, word_events: Vec<WordEvent>, now_ms: f64) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        for event in word_events {
            let finalized = match &event {
                WordEvent::Finalized { word } => Some(word.clone()),
                _ => None,
            };
            events.push(SessionEvent::Word(event));
            if let Some(word) = finalized {
                events.extend(self.begin_confirmation(SPELLING_LABEL, word, now_ms));
            }
        }
        events
    }

    // ── Model lifecycle ───────────────────────────────────

    pub fn on_model_loaded(&mut self, output_len: usize) -> Vec<SessionEvent> {
        self.classifier.attach_model(output_len);
        self.classifier
            .advisories()
            .iter()
            .cloned()
            .map(SessionEvent::Advisory)
            .collect()
    }

    pub fn on_model_failed(&mut self, reason: &str) -> Vec<SessionEvent> {
        self.classifier.detach_model(reason);
        self.classifier
            .advisories()
            .iter()
            .cloned()
            .map(SessionEvent::Advisory)
            .collect()
    }

    // ── Confirmation ──────────────────────────────────────

    fn begin_confirmation(&mut self, label: &str, text: String, now_ms: f64) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if !self.status.accepts_gestures() {
            warn!("Dropping {} while {}", text, self.status.as_str());
            return events;
        }
        if text.is_empty() {
            return events;
        }
        self.confirm_timer.arm(now_ms, self.config.session.confirm_ms);
        self.pending = Some(PendingTranslation {
            label: label.to_string(),
            text: text.clone(),
            language: self.language.clone(),
            started_ms: now_ms,
        });
        info!("Confirming \"{}\" ({})", text, label);
        self.set_status(SystemStatus::Confirming, &mut events);
        events.push(SessionEvent::Pending {
            label: label.to_string(),
            text,
        });
        events
    }

    /// Drop the pending translation without recording it.
    pub fn cancel_confirmation(&mut self, now_ms: f64) -> Vec<SessionEvent> {
        self.now_ms = now_ms;
        let mut events = Vec::new();
        if self.status != SystemStatus::Confirming {
            return events;
        }
        self.confirm_timer.cancel();
        if let Some(p) = self.pending.take() {
            debug!("Confirmation of \"{}\" cancelled", p.text);
        }
        events.push(SessionEvent::ConfirmationCancelled);
        self.set_status(SystemStatus::Ready, &mut events);
        events
    }

    /// Confirm the pending translation without waiting.
    pub fn confirm_now(&mut self, now_ms: f64) -> Vec<SessionEvent> {
        self.now_ms = now_ms;
        if self.status != SystemStatus::Confirming {
            return Vec::new();
        }
        self.confirm_timer.cancel();
        self.finish_confirmation(now_ms)
    }

    fn finish_confirmation(&mut self, now_ms: f64) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let Some(pending) = self.pending.take() else {
            self.set_status(SystemStatus::Ready, &mut events);
            return events;
        };
        let entry =
            self.transcript
                .append(&pending.label, &pending.text, &pending.language, now_ms);
        events.push(SessionEvent::EntryAppended(entry));
        self.set_status(SystemStatus::Speaking, &mut events);
        events.push(SessionEvent::Speak {
            text: pending.text,
            language: pending.language,
        });
        events
    }

    // ── Timers ────────────────────────────────────────────

    /// Drive countdown timers.
    pub fn tick(&mut self, now_ms: f64) -> Vec<SessionEvent> {
        self.now_ms = now_ms;
        let mut events = Vec::new();
        if !self.status.is_running() {
            return events;
        }
        if self.confirm_timer.poll(now_ms).is_some() {
            events.extend(self.finish_confirmation(now_ms));
        }
        if let Some(event) = self.word.tick(now_ms) {
            events.extend(self.handle_word_events(vec![event], now_ms));
        }
        events
    }

    // ── Speech ────────────────────────────────────────────

    pub fn on_speech_event(&mut self, event: SpeechEvent, now_ms: f64) -> Vec<SessionEvent> {
        self.now_ms = now_ms;
        let mut events = Vec::new();
        match event {
            SpeechEvent::Started => debug!("Speech started"),
            SpeechEvent::Finished => {
                if self.status == SystemStatus::Speaking {
                    self.set_status(SystemStatus::Ready, &mut events);
                }
            }
            SpeechEvent::Failed(reason) => {
                warn!("Speech failed: {}", reason);
                if self.status == SystemStatus::Speaking {
                    self.set_status(SystemStatus::Ready, &mut events);
                }
            }
        }
        events
    }

    /// Switch language. Speech in progress is cancelled.
    pub fn set_language(&mut self, language: &str, now_ms: f64) -> Vec<SessionEvent> {
        self.now_ms = now_ms;
        let mut events = Vec::new();
        if language == self.language {
            return events;
        }
        self.language = language.to_string();
        info!("Language set to {}", language);
        events.push(SessionEvent::LanguageChanged {
            language: language.to_string(),
        });
        if self.status == SystemStatus::Speaking {
            events.push(SessionEvent::CancelSpeech);
            self.set_status(SystemStatus::Ready, &mut events);
        }
        events.extend(self.relocalize_pending());
        events
    }

    /// Re-render a pending sign translation in the current language.
    /// Spelled words keep the language they were spelled in.
    fn relocalize_pending(&mut self) -> Option<SessionEvent> {
        let pending = self.pending.as_mut()?;
        if pending.label == SPELLING_LABEL {
            return None;
        }
        pending.text = self
            .config
            .phrasebook
            .text_for(&pending.label, &self.language);
        pending.language = self.language.clone();
        debug!("Pending {} now \"{}\"", pending.label, pending.text);
        Some(SessionEvent::Pending {
            label: pending.label.clone(),
            text: pending.text.clone(),
        })
    }

    // ── Word operations ───────────────────────────────────

    pub fn delete_letter(&mut self, now_ms: f64) -> Vec<SessionEvent> {
        self.now_ms = now_ms;
        let events = self.word.delete_last(now_ms);
        self.handle_word_events(events, now_ms)
    }

    pub fn finalize_word(&mut self, now_ms: f64) -> Vec<SessionEvent> {
        self.now_ms = now_ms;
        let events: Vec<WordEvent> = self.word.finalize().into_iter().collect();
        self.handle_word_events(events, now_ms)
    }

    pub fn cancel_word(&mut self, now_ms: f64) -> Vec<SessionEvent> {
        self.now_ms = now_ms;
        self.word.cancel().map(SessionEvent::Word).into_iter().collect()
    }

    // ── Pointer ───────────────────────────────────────────

    pub fn set_targets(&mut self, targets: Vec<UiTarget>) -> Vec<SessionEvent> {
        self.pointer
            .set_targets(targets)
            .map(SessionEvent::Pointer)
            .into_iter()
            .collect()
    }

    // ── Output ────────────────────────────────────────────

    pub fn snapshot(&self) -> SessionSnapshot {
        let now = self.now_ms;
        SessionSnapshot {
            status: self.status,
            mode: self.mode.mode(),
            hold: self.mode.hold().copied(),
            cursor: self.pointer.cursor().clone(),
            hovered: self.pointer.hovered().map(str::to_string),
            word: self.word.word().map(|w| w.text()),
            word_countdown_secs: self.word.countdown_secs(now),
            pending: self.pending.clone(),
            confirm_countdown_secs: self.confirm_timer.remaining_secs(now),
            last_gesture: self.last_gesture.clone(),
            transcript_len: self.transcript.len(),
            language: self.language.clone(),
            advisories: self.classifier.advisories().to_vec(),
            error: self.error.clone(),
        }
    }

    /// Generate s-expression for status output.
    pub fn status_sexp(&self) -> String {
        let now = self.now_ms;
        let pending = self
            .pending
            .as_ref()
            .map(|p| {
                format!(
                    "(:label \"{}\" :text \"{}\" :countdown {})",
                    escape_string(&p.label),
                    escape_string(&p.text),
                    self.confirm_timer.remaining_secs(now).unwrap_or(0)
                )
            })
            .unwrap_or_else(|| "nil".to_string());
        let advisories: Vec<String> = self
            .classifier
            .advisories()
            .iter()
            .map(|a| {
                format!("(:{} \"{}\")", a.kind.as_str(), escape_string(&a.message))
            })
            .collect();
        format!(
            "(:status :{} :language \"{}\" :frames {} :mode {} :word {} :pointer {} :pending {} :classifier {} :transcript {} :advisories ({}) :error {})",
            self.status.as_str(),
            escape_string(&self.language),
            self.frames,
            self.mode.status_sexp(now),
            self.word.status_sexp(now),
            self.pointer.status_sexp(),
            pending,
            self.classifier.status_sexp(),
            self.transcript.len(),
            advisories.join(" "),
            self.error
                .as_ref()
                .map(|e| quoted(e))
                .unwrap_or_else(|| "nil".to_string()),
        )
    }
}

// ── Test helpers ───────────────────────────────────────────

#[cfg(test)]
fn test_session() -> Session {
    let mut labels = crate::recognition::classifier::test_labels();
    labels.extend(["mode_sign", "mode_spell", "mode_navigate"].map(String::from));
    let config = EngineConfig {
        labels,
        ..EngineConfig::default()
    };
    let mut session = Session::new(config);
    session.start(0.0);
    let n = session.config.labels.len();
    session.on_model_loaded(n);
    session
}

#[cfg(test)]
fn hand_frame(ts: f64) -> HandFrame {
    use crate::tracking::{hand::flat_hand, Handedness};
    HandFrame::new(vec![flat_hand(Handedness::Right, 0.5, 0.5)], ts)
}

/// Fill the window with one-hand frames ending at `end_ms`.
#[cfg(test)]
fn fill_window(session: &mut Session, end_ms: f64) {
    let n = session.classifier.window_capacity();
    for i in (0..n).rev() {
        session.on_frame(&hand_frame(end_ms - i as f64 * 33.0));
    }
}

/// Run one classification whose top label is `label` at `confidence`.
#[cfg(test)]
fn classify_as(session: &mut Session, label: &str, confidence: f32, now_ms: f64) -> Vec<SessionEvent> {
    if session.classifier.window_len() < session.classifier.window_capacity() {
        fill_window(session, now_ms);
    }
    let Some(request) = session.on_classify_tick(now_ms) else {
        return Vec::new();
    };
    let mut scores = vec![0.0; session.config.labels.len()];
    let index = session
        .config
        .labels
        .iter()
        .position(|l| l == label)
        .unwrap();
    scores[index] = confidence;
    session.on_model_output(request.ticket, Ok(scores), now_ms)
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::{ClassifierSwitchPolicy, SwitchSource};
    use crate::recognition::pose::make_pose_frame;

    fn statuses(events: &[SessionEvent]) -> Vec<SystemStatus> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::StatusChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_start_goes_ready() {
        let mut s = Session::new(EngineConfig::default());
        assert_eq!(s.status(), SystemStatus::Initializing);
        assert!(s.on_frame(&hand_frame(0.0)).is_empty(), "frames ignored before start");
        s.start(0.0);
        assert_eq!(s.status(), SystemStatus::Ready);
    }

    #[test]
    fn test_hands_enter_detecting_and_idle_returns_ready() {
        let mut s = test_session();
        let events = s.on_frame(&hand_frame(0.0));
        assert_eq!(statuses(&events), vec![SystemStatus::Detecting]);

        for i in 1..10 {
            s.on_frame(&HandFrame::empty(i as f64 * 33.0));
            assert_eq!(s.status(), SystemStatus::Detecting, "frame {}", i);
        }
        let events = s.on_frame(&HandFrame::empty(330.0));
        assert_eq!(statuses(&events), vec![SystemStatus::Ready]);
    }

    #[test]
    fn test_sign_label_enters_confirming() {
        let mut s = test_session();
        let events = classify_as(&mut s, "hello", 0.6, 1000.0);
        assert!(events.contains(&SessionEvent::Pending {
            label: "hello".into(),
            text: "Hello".into()
        }));
        assert_eq!(s.status(), SystemStatus::Confirming);
        assert_eq!(s.snapshot().confirm_countdown_secs, Some(2));
    }

    #[test]
    fn test_below_threshold_does_nothing() {
        let mut s = test_session();
        let events = classify_as(&mut s, "hello", 0.4, 1000.0);
        assert!(events.is_empty());
        assert_eq!(s.status(), SystemStatus::Detecting);
    }

    #[test]
    fn test_confirmation_appends_and_speaks() {
        let mut s = test_session();
        classify_as(&mut s, "thank_you", 0.9, 1000.0);
        assert!(s.tick(2999.0).is_empty());
        let events = s.tick(3000.0);
        assert!(matches!(events[0], SessionEvent::EntryAppended(ref e) if e.text == "Thank you"));
        assert!(events.contains(&SessionEvent::Speak {
            text: "Thank you".into(),
            language: "en".into()
        }));
        assert_eq!(s.status(), SystemStatus::Speaking);
        assert_eq!(s.transcript().len(), 1);

        let events = s.on_speech_event(SpeechEvent::Finished, 4000.0);
        assert_eq!(statuses(&events), vec![SystemStatus::Ready]);
    }

    #[test]
    fn test_cancel_confirmation_appends_nothing() {
        let mut s = test_session();
        classify_as(&mut s, "hello", 0.9, 1000.0);
        let events = s.cancel_confirmation(1500.0);
        assert!(events.contains(&SessionEvent::ConfirmationCancelled));
        assert_eq!(s.status(), SystemStatus::Ready);
        assert!(s.tick(5000.0).is_empty(), "cancelled countdown never fires");
        assert!(s.transcript().is_empty());
    }

    #[test]
    fn test_results_ignored_while_confirming() {
        let mut s = test_session();
        classify_as(&mut s, "hello", 0.9, 1000.0);
        assert!(s.on_classify_tick(1300.0).is_none());
        // The window keeps filling.
        s.on_frame(&hand_frame(1333.0));
        assert_eq!(s.classifier().window_len(), s.classifier().window_capacity());
    }

    #[test]
    fn test_late_result_ignored_while_confirming() {
        let mut s = test_session();
        fill_window(&mut s, 1000.0);
        let request = s.on_classify_tick(1000.0).unwrap();
        classify_as(&mut s, "hello", 0.9, 1000.0);
        // Second request was dropped while the first was in flight.
        assert_eq!(s.status(), SystemStatus::Detecting);
        let mut scores = vec![0.0; s.config().labels.len()];
        scores[0] = 0.9;
        s.on_model_output(request.ticket, Ok(scores.clone()), 1100.0);
        assert_eq!(s.status(), SystemStatus::Confirming);

        let events = s.on_model_output(request.ticket, Ok(scores), 1200.0);
        assert!(events.is_empty());
    }

    #[test]
    fn test_spelling_letters_build_word() {
        let mut s = test_session();
        s.set_mode(InteractionMode::Spelling, 0.0);
        classify_as(&mut s, "letter_a", 0.8, 1000.0);
        classify_as(&mut s, "letter_a", 0.8, 1300.0);
        let events = classify_as(&mut s, "letter_a", 0.8, 1600.0);
        assert!(events.contains(&SessionEvent::Word(WordEvent::LetterAccepted {
            letter: 'A',
            word: "A".into()
        })));
        let snap = s.snapshot();
        assert_eq!(snap.word.as_deref(), Some("A"));
        assert_eq!(snap.word_countdown_secs, Some(3));
    }

    #[test]
    fn test_word_stays_detecting_without_hands() {
        let mut s = test_session();
        s.set_mode(InteractionMode::Spelling, 0.0);
        for t in [1000.0, 1300.0, 1600.0] {
            classify_as(&mut s, "letter_b", 0.9, t);
        }
        for i in 1..=20 {
            s.on_frame(&HandFrame::empty(1600.0 + i as f64 * 33.0));
        }
        assert_eq!(s.status(), SystemStatus::Detecting);
        assert!(s.word().is_active());
    }

    #[test]
    fn test_word_auto_finalizes_into_confirmation() {
        let mut s = test_session();
        s.set_mode(InteractionMode::Spelling, 0.0);
        for t in [1000.0, 1300.0, 1600.0] {
            classify_as(&mut s, "letter_b", 0.9, t);
        }
        let events = s.tick(4600.0);
        assert!(events.contains(&SessionEvent::Word(WordEvent::Finalized { word: "B".into() })));
        assert!(events.contains(&SessionEvent::Pending {
            label: SPELLING_LABEL.into(),
            text: "B".into()
        }));
        assert_eq!(s.status(), SystemStatus::Confirming);
        assert!(s.tick(10_000.0).iter().all(|e| !matches!(e, SessionEvent::Word(_))));
    }

    #[test]
    fn test_leaving_spelling_cancels_word() {
        let mut s = test_session();
        s.set_mode(InteractionMode::Spelling, 0.0);
        for t in [1000.0, 1300.0, 1600.0] {
            classify_as(&mut s, "letter_a", 0.9, t);
        }
        let events = s.set_mode(InteractionMode::Sign, 1700.0);
        assert!(events.contains(&SessionEvent::Word(WordEvent::Cleared)));
        assert!(!s.word().is_active());
        assert!(s.tick(10_000.0).is_empty());
    }

    #[test]
    fn test_pose_hold_out_of_spelling_cancels_word() {
        let mut s = test_session();
        s.set_mode(InteractionMode::Spelling, 0.0);
        for t in [1000.0, 1300.0, 1600.0] {
            classify_as(&mut s, "letter_a", 0.9, t);
        }
        assert!(s.word().is_active());

        // Fist + thumbs-up held for a second returns to sign mode.
        let mut events = Vec::new();
        let mut t = 1700.0;
        while t <= 2700.0 {
            events.extend(s.on_frame(&make_pose_frame(true, false, t)));
            t += 50.0;
        }
        assert_eq!(s.mode(), InteractionMode::Sign);
        assert!(events.contains(&SessionEvent::Word(WordEvent::Cleared)));
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::Word(WordEvent::Finalized { .. }))));
        assert!(!s.word().is_active());
        assert!(s.tick(10_000.0).is_empty());
        assert!(s.transcript().is_empty());
    }

    #[test]
    fn test_mode_label_out_of_spelling_cancels_word() {
        let mut s = test_session();
        s.set_mode(InteractionMode::Spelling, 0.0);
        for t in [1000.0, 1300.0, 1600.0] {
            classify_as(&mut s, "letter_a", 0.9, t);
        }
        let events = classify_as(&mut s, "mode_sign", 0.8, 1700.0);
        assert_eq!(s.mode(), InteractionMode::Sign);
        assert!(events.contains(&SessionEvent::Word(WordEvent::Cleared)));
        assert!(!s.word().is_active());
        assert_ne!(s.status(), SystemStatus::Confirming);
        assert!(s.tick(10_000.0).is_empty());
        assert!(s.transcript().is_empty());
    }

    #[test]
    fn test_mode_label_respects_cooldown_when_configured() {
        let mut labels = crate::recognition::classifier::test_labels();
        labels.extend(["mode_sign", "mode_spell", "mode_navigate"].map(String::from));
        let mut config = EngineConfig {
            labels,
            ..EngineConfig::default()
        };
        config.mode.classifier_policy = ClassifierSwitchPolicy::RespectCooldown;
        let mut s = Session::new(config);
        s.start(0.0);
        let n = s.config().labels.len();
        s.on_model_loaded(n);
        fill_window(&mut s, 1000.0);

        let mut t = 1000.0;
        while t <= 2000.0 {
            s.on_frame(&make_pose_frame(false, false, t));
            t += 50.0;
        }
        assert_eq!(s.mode(), InteractionMode::Navigate);

        // Inside the 1500ms cooldown the label is dropped.
        let events = classify_as(&mut s, "mode_sign", 0.9, 2200.0);
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::Mode(ModeEvent::Switched { .. }))));
        assert_eq!(s.mode(), InteractionMode::Navigate);
        assert!(s.status_sexp().contains(":policy :respect-cooldown"));

        let events = classify_as(&mut s, "mode_sign", 0.9, 3600.0);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Mode(ModeEvent::Switched {
                to: InteractionMode::Sign,
                source: SwitchSource::Classifier,
                ..
            })
        )));
        assert_eq!(s.mode(), InteractionMode::Sign);
    }

    #[test]
    fn test_manual_mode_reports_cancelled_hold() {
        let mut s = test_session();
        let mut t = 0.0;
        while t <= 500.0 {
            s.on_frame(&make_pose_frame(false, false, t));
            t += 50.0;
        }
        assert!(s.snapshot().hold.is_some());
        let events = s.set_mode(InteractionMode::Spelling, 550.0);
        assert_eq!(
            events.first(),
            Some(&SessionEvent::Mode(ModeEvent::HoldCancelled {
                target: InteractionMode::Navigate
            }))
        );
        assert!(s.snapshot().hold.is_none());
    }

    #[test]
    fn test_mode_label_switches_immediately() {
        let mut s = test_session();
        let events = classify_as(&mut s, "mode_navigate", 0.7, 1000.0);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Mode(ModeEvent::Switched {
                to: InteractionMode::Navigate,
                source: SwitchSource::Classifier,
                ..
            })
        )));
        assert_eq!(s.mode(), InteractionMode::Navigate);
        assert_eq!(s.status(), SystemStatus::Detecting);
    }

    #[test]
    fn test_letter_ignored_in_sign_mode() {
        let mut s = test_session();
        let events = classify_as(&mut s, "letter_a", 0.9, 1000.0);
        assert_eq!(events.len(), 1, "only the gesture itself: {:?}", events);
        assert_eq!(s.status(), SystemStatus::Detecting);
    }

    #[test]
    fn test_pose_hold_switches_mode() {
        let mut s = test_session();
        let mut t = 0.0;
        while t <= 1000.0 {
            s.on_frame(&make_pose_frame(false, false, t));
            t += 50.0;
        }
        assert_eq!(s.mode(), InteractionMode::Navigate);
        assert_eq!(
            s.snapshot().last_gesture.map(|g| g.source),
            Some(GestureSource::Pose)
        );
    }

    #[test]
    fn test_pointer_runs_only_in_navigate() {
        let mut s = test_session();
        s.set_targets(vec![UiTarget::new("speak", 0.0, 0.0, 1920.0, 1080.0)]);
        s.on_frame(&hand_frame(0.0));
        assert!(!s.snapshot().cursor.visible);

        s.set_mode(InteractionMode::Navigate, 10.0);
        let events = s.on_frame(&hand_frame(33.0));
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Pointer(PointerEvent::Shown { .. }))));
        assert_eq!(s.snapshot().hovered.as_deref(), Some("speak"));

        let events = s.set_mode(InteractionMode::Sign, 66.0);
        assert!(events.contains(&SessionEvent::Pointer(PointerEvent::Hidden)));
    }

    #[test]
    fn test_model_unavailable_keeps_pose_and_pointer() {
        let mut s = Session::new(EngineConfig::default());
        s.start(0.0);
        let events = s.on_model_failed("no model file");
        assert!(matches!(events[0], SessionEvent::Advisory(_)));
        fill_window(&mut s, 1000.0);
        assert!(s.on_classify_tick(1000.0).is_none());

        let mut t = 1000.0;
        while t <= 2000.0 {
            s.on_frame(&make_pose_frame(true, true, t));
            t += 50.0;
        }
        assert_eq!(s.mode(), InteractionMode::Spelling);
    }

    #[test]
    fn test_vocabulary_mismatch_advisory() {
        let mut s = Session::new(EngineConfig {
            labels: vec!["hello".into(), "thank_you".into()],
            ..EngineConfig::default()
        });
        let events = s.on_model_loaded(5);
        assert_eq!(events.len(), 1);
        assert_eq!(s.snapshot().advisories.len(), 1);
    }

    #[test]
    fn test_acquisition_failure_stops_everything() {
        let mut s = test_session();
        s.set_mode(InteractionMode::Spelling, 0.0);
        for t in [1000.0, 1300.0, 1600.0] {
            classify_as(&mut s, "letter_a", 0.9, t);
        }
        let events = s.on_acquisition_failure("camera unplugged", 1700.0);
        assert!(events.contains(&SessionEvent::Word(WordEvent::Cleared)));
        assert_eq!(s.status(), SystemStatus::Error);
        assert!(s.tick(10_000.0).is_empty());
        assert!(s.on_frame(&hand_frame(10_033.0)).is_empty());
        assert!(s.start(10_100.0).is_empty(), "start does not leave error");

        s.reinitialize(11_000.0);
        assert_eq!(s.status(), SystemStatus::Initializing);
        s.start(11_000.0);
        assert_eq!(s.status(), SystemStatus::Ready);
        assert_eq!(s.snapshot().error, None);
    }

    #[test]
    fn test_acquisition_failure_cancels_speech() {
        let mut s = test_session();
        classify_as(&mut s, "hello", 0.9, 1000.0);
        s.confirm_now(1200.0);
        assert_eq!(s.status(), SystemStatus::Speaking);
        let events = s.on_acquisition_failure("tracker crashed", 1300.0);
        assert!(events.contains(&SessionEvent::CancelSpeech));
        assert_eq!(s.transcript().len(), 1, "confirmed entries survive");
    }

    #[test]
    fn test_language_toggle_cancels_speech() {
        let mut s = test_session();
        classify_as(&mut s, "hello", 0.9, 1000.0);
        s.tick(3000.0);
        assert_eq!(s.status(), SystemStatus::Speaking);
        let events = s.set_language("es", 3100.0);
        assert!(events.contains(&SessionEvent::CancelSpeech));
        assert_eq!(s.status(), SystemStatus::Ready);
        assert_eq!(s.language(), "es");
    }

    #[test]
    fn test_phrasebook_language() {
        let mut config = EngineConfig {
            labels: crate::recognition::classifier::test_labels(),
            ..EngineConfig::default()
        };
        config.phrasebook.insert("es", "hello", "Hola");
        let mut s = Session::new(config);
        s.start(0.0);
        s.on_model_loaded(4);
        s.set_language("es", 0.0);
        let events = classify_as(&mut s, "hello", 0.9, 1000.0);
        assert!(events.contains(&SessionEvent::Pending {
            label: "hello".into(),
            text: "Hola".into()
        }));
    }

    #[test]
    fn test_language_change_relocalizes_pending() {
        let mut config = EngineConfig {
            labels: crate::recognition::classifier::test_labels(),
            ..EngineConfig::default()
        };
        config.phrasebook.insert("es", "hello", "Hola");
        let mut s = Session::new(config);
        s.start(0.0);
        s.on_model_loaded(4);
        classify_as(&mut s, "hello", 0.9, 1000.0);
        assert_eq!(s.status(), SystemStatus::Confirming);

        let events = s.set_language("es", 1500.0);
        assert!(events.contains(&SessionEvent::Pending {
            label: "hello".into(),
            text: "Hola".into()
        }));
        assert_eq!(s.status(), SystemStatus::Confirming);

        let events = s.tick(3000.0);
        assert!(events.contains(&SessionEvent::Speak {
            text: "Hola".into(),
            language: "es".into()
        }));
        let entry = s.transcript().last().unwrap();
        assert_eq!(entry.text, "Hola");
        assert_eq!(entry.language, "es");
    }

    #[test]
    fn test_spelled_word_keeps_its_language() {
        let mut s = test_session();
        s.set_mode(InteractionMode::Spelling, 0.0);
        for t in [1000.0, 1300.0, 1600.0] {
            classify_as(&mut s, "letter_a", 0.9, t);
        }
        s.finalize_word(1700.0);
        assert_eq!(s.status(), SystemStatus::Confirming);
        let events = s.set_language("es", 1800.0);
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::Pending { .. })));

        let events = s.confirm_now(1900.0);
        assert!(events.contains(&SessionEvent::Speak {
            text: "A".into(),
            language: "en".into()
        }));
        assert_eq!(s.transcript().last().map(|e| e.language.as_str()), Some("en"));
    }

    #[test]
    fn test_status_sexp_escapes_free_text() {
        let mut s = test_session();
        s.on_acquisition_failure("camera \"cam0\" gone", 100.0);
        let sexp = s.status_sexp();
        assert!(sexp.contains(r#":error "camera \"cam0\" gone""#), "{}", sexp);
        assert!(lexpr::from_str(&sexp).is_ok(), "unparseable: {}", sexp);
    }

    #[test]
    fn test_status_sexp() {
        let s = test_session();
        let sexp = s.status_sexp();
        assert!(sexp.starts_with("(:status :ready"));
        assert!(sexp.contains(":mode (:mode :sign"));
        assert!(sexp.contains(":pending nil"));
    }
}
