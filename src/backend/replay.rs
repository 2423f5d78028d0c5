//! Replay backend. Drives a session from recorded landmark samples.
//!
//! Frames come from the collector's JSON sample format and are fed at a
//! fixed rate from a calloop timer.  A second timer issues classification
//! ticks; the model runs on a worker thread and its results come back
//! through a calloop channel.  The session decides whether a tick turns
//! into a request, so at most one is ever outstanding.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use calloop::channel::{self, Event as ChannelEvent};
use calloop::timer::{TimeoutAction, Timer};
use calloop::EventLoop;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::interaction::{ModeEvent, PointerEvent, WordEvent};
use crate::recognition::{
    ClassifyRequest, FeatureLayout, ModelError, RecordedSample, SequenceModel,
};
use crate::session::{
    Session, SessionEvent, SpeechEvent, SpeechSynthesizer, SystemStatus, TranslationEntry,
};
use crate::tracking::HandFrame;

/// Global flag set by SIGTERM/SIGINT handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("cannot read recording {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed recording {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("recording {path} has no frames")]
    Empty { path: PathBuf },
}

// ── Recording ──────────────────────────────────────────────

/// Hand frames decoded from recorded samples, played back in order.
pub struct Recording {
    frames: Vec<HandFrame>,
    cursor: usize,
    /// Start over when the end is reached.
    pub looping: bool,
    /// Completed passes.
    pub passes: u32,
}

impl Recording {
    /// Load a JSON sample array. `gap_frames` hand-less frames follow
    /// each sample so consecutive gestures do not share a window.
    pub fn load(path: &Path, layout: FeatureLayout, gap_frames: usize) -> Result<Self, ReplayError> {
        let raw = fs::read_to_string(path).map_err(|source| ReplayError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let samples: Vec<RecordedSample> =
            serde_json::from_str(&raw).map_err(|e| ReplayError::Decode {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let recording = Self::from_samples(&samples, layout, gap_frames);
        if recording.frames.is_empty() {
            return Err(ReplayError::Empty {
                path: path.to_path_buf(),
            });
        }
        info!(
            "Loaded recording {}: {} samples, {} frames",
            path.display(),
            samples.len(),
            recording.frames.len()
        );
        Ok(recording)
    }

    pub fn from_samples(samples: &[RecordedSample], layout: FeatureLayout, gap_frames: usize) -> Self {
        let mut frames = Vec::new();
        for sample in samples {
            if sample.landmarks.is_empty() {
                continue;
            }
            debug!("Sample {}: {} frames", sample.label, sample.landmarks.len());
            frames.extend(sample.landmarks.iter().map(|row| layout.decode(row, 0.0)));
            frames.extend((0..gap_frames).map(|_| HandFrame::empty(0.0)));
        }
        Self {
            frames,
            cursor: 0,
            looping: false,
            passes: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_exhausted(&self) -> bool {
        !self.looping && self.cursor >= self.frames.len()
    }

    /// Next frame, restamped to `now_ms`. `None` once a non-looping
    /// recording has played through.
    pub fn next_frame(&mut self, now_ms: f64) -> Option<HandFrame> {
        if self.cursor >= self.frames.len() {
            if !self.looping || self.frames.is_empty() {
                return None;
            }
            self.cursor = 0;
        }
        let mut frame = self.frames[self.cursor].clone();
        self.cursor += 1;
        if self.cursor == self.frames.len() {
            self.passes += 1;
            debug!("Recording pass {} complete", self.passes);
        }
        frame.timestamp_ms = now_ms;
        for hand in &mut frame.hands {
            hand.timestamp_ms = now_ms;
        }
        Some(frame)
    }
}

// ── Model worker ───────────────────────────────────────────

/// Builds the sequence model on the worker thread.
pub type ModelLoader = Box<dyn FnOnce() -> Result<Box<dyn SequenceModel>, ModelError> + Send>;

/// Messages from the model worker to the event loop.
#[derive(Debug)]
pub enum WorkerMsg {
    Loaded { output_len: usize },
    Failed { reason: String },
    Output {
        ticket: u64,
        result: Result<Vec<f32>, ModelError>,
    },
}

fn spawn_worker(
    loader: Option<ModelLoader>,
    requests: mpsc::Receiver<ClassifyRequest>,
    results: channel::Sender<WorkerMsg>,
) -> anyhow::Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("signassist-model".to_string())
        .spawn(move || {
            let Some(loader) = loader else {
                let _ = results.send(WorkerMsg::Failed {
                    reason: "no model configured".to_string(),
                });
                return;
            };
            let mut model = match loader() {
                Ok(model) => model,
                Err(e) => {
                    let _ = results.send(WorkerMsg::Failed {
                        reason: e.to_string(),
                    });
                    return;
                }
            };
            if results
                .send(WorkerMsg::Loaded {
                    output_len: model.output_len(),
                })
                .is_err()
            {
                return;
            }
            for request in requests {
                let result = model.predict(&request.window);
                let msg = WorkerMsg::Output {
                    ticket: request.ticket,
                    result,
                };
                if results.send(msg).is_err() {
                    break;
                }
            }
            debug!("Model worker exiting");
        })
        .context("failed to spawn model worker")?;
    Ok(handle)
}

// ── Loop state ─────────────────────────────────────────────

/// Replay driver settings.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Frame rate of the simulated camera.
    pub fps: f64,
    /// Exit after N seconds.
    pub exit_after: Option<u64>,
    /// Hand-less frames inserted after each recorded sample.
    pub gap_frames: usize,
    /// Interval between status log lines.
    pub status_interval_secs: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            exit_after: None,
            gap_frames: 15,
            status_interval_secs: 10,
        }
    }
}

struct ReplayState {
    session: Session,
    speech: Box<dyn SpeechSynthesizer>,
    recording: Option<Recording>,
    requests: Option<mpsc::Sender<ClassifyRequest>>,
    clock: Instant,
    running: bool,
    clicks: u64,
}

impl ReplayState {
    fn now_ms(&self) -> f64 {
        self.clock.elapsed().as_secs_f64() * 1000.0
    }

    fn on_frame_tick(&mut self) {
        let now = self.now_ms();
        let frame = match self.recording.as_mut() {
            Some(rec) => rec.next_frame(now).unwrap_or_else(|| HandFrame::empty(now)),
            None => HandFrame::empty(now),
        };
        let events = self.session.on_frame(&frame);
        self.handle(events);
        self.poll_speech();
    }

    fn on_classify_tick(&mut self) {
        let now = self.now_ms();
        let Some(request) = self.session.on_classify_tick(now) else {
            return;
        };
        let sent = match &self.requests {
            Some(tx) => tx.send(request).is_ok(),
            None => false,
        };
        if !sent {
            self.requests = None;
            let events = self.session.on_model_failed("model worker exited");
            self.handle(events);
        }
    }

    fn on_worker_msg(&mut self, msg: WorkerMsg) {
        let now = self.now_ms();
        let events = match msg {
            WorkerMsg::Loaded { output_len } => self.session.on_model_loaded(output_len),
            WorkerMsg::Failed { reason } => self.session.on_model_failed(&reason),
            WorkerMsg::Output { ticket, result } => {
                self.session.on_model_output(ticket, result, now)
            }
        };
        self.handle(events);
    }

    fn poll_speech(&mut self) {
        let now = self.now_ms();
        while let Some(event) = self.speech.poll(now) {
            let events = self.session.on_speech_event(event, now);
            self.handle(events);
        }
    }

    /// Carry out the side effects the session asked for.
    fn handle(&mut self, events: Vec<SessionEvent>) {
        for event in events {
            match event {
                SessionEvent::Speak { text, language } => {
                    let now = self.now_ms();
                    if let Err(e) = self.speech.speak(&text, &language, now) {
                        let events = self
                            .session
                            .on_speech_event(SpeechEvent::Failed(e.to_string()), now);
                        self.handle(events);
                    }
                }
                SessionEvent::CancelSpeech => self.speech.cancel(),
                SessionEvent::Pointer(PointerEvent::Click { id, x, y }) => {
                    self.clicks += 1;
                    info!("Click on {} at ({:.0}, {:.0})", id, x, y);
                }
                SessionEvent::Mode(ModeEvent::Switched { from, to, source }) => {
                    debug!(
                        "Mode {} -> {} via {}",
                        from.as_str(),
                        to.as_str(),
                        source.as_str()
                    );
                }
                SessionEvent::Word(WordEvent::Notice(notice)) => {
                    info!("Spelling: {}", notice.message());
                }
                SessionEvent::Advisory(advisory) => {
                    warn!("{}: {}", advisory.kind.as_str(), advisory.message);
                }
                SessionEvent::Error { message } => {
                    error!("Session error: {}", message);
                }
                other => debug!("{:?}", other),
            }
        }
    }

    /// Recording done and nothing left in flight.
    fn is_drained(&self) -> bool {
        let exhausted = self
            .recording
            .as_ref()
            .map(Recording::is_exhausted)
            .unwrap_or(false);
        exhausted
            && self.session.status() == SystemStatus::Ready
            && !self.session.word().is_active()
    }
}

// ── Signals ────────────────────────────────────────────────

/// Install signal handlers for graceful shutdown (SIGTERM, SIGINT).
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

// ── Entry point ────────────────────────────────────────────

/// Run a session until the recording drains, a signal arrives, or the
/// exit timer fires. Returns the transcript.
pub fn run(
    session: Session,
    recording: Option<Recording>,
    loader: Option<ModelLoader>,
    speech: Box<dyn SpeechSynthesizer>,
    config: ReplayConfig,
) -> anyhow::Result<Vec<TranslationEntry>> {
    let mut event_loop = EventLoop::<ReplayState>::try_new()?;

    let (request_tx, request_rx) = mpsc::channel::<ClassifyRequest>();
    let (result_tx, result_rx) = channel::channel::<WorkerMsg>();
    let worker = spawn_worker(loader, request_rx, result_tx)?;

    let mut state = ReplayState {
        session,
        speech,
        recording,
        requests: Some(request_tx),
        clock: Instant::now(),
        running: true,
        clicks: 0,
    };

    event_loop
        .handle()
        .insert_source(result_rx, |event, _, state| match event {
            ChannelEvent::Msg(msg) => state.on_worker_msg(msg),
            ChannelEvent::Closed => debug!("Model worker channel closed"),
        })
        .map_err(|e| anyhow::anyhow!("failed to insert worker channel: {:?}", e))?;

    let frame_interval = Duration::from_secs_f64(1.0 / config.fps.max(1.0));
    event_loop
        .handle()
        .insert_source(Timer::from_duration(frame_interval), move |_, _, state| {
            state.on_frame_tick();
            TimeoutAction::ToDuration(frame_interval)
        })
        .map_err(|e| anyhow::anyhow!("failed to insert frame timer: {:?}", e))?;

    // Interval is read every tick so a config change applies immediately.
    let initial_interval =
        Duration::from_secs_f64(state.session.config().recognition.classify_interval_ms / 1000.0);
    event_loop
        .handle()
        .insert_source(Timer::from_duration(initial_interval), |_, _, state| {
            state.on_classify_tick();
            let ms = state.session.config().recognition.classify_interval_ms.max(1.0);
            TimeoutAction::ToDuration(Duration::from_secs_f64(ms / 1000.0))
        })
        .map_err(|e| anyhow::anyhow!("failed to insert classify timer: {:?}", e))?;

    install_signal_handlers();

    let now = state.now_ms();
    let events = state.session.start(now);
    state.handle(events);

    let start_time = Instant::now();
    let exit_duration = config.exit_after.map(Duration::from_secs);
    let mut last_status_log = Instant::now();
    let status_interval = Duration::from_secs(config.status_interval_secs.max(1));

    info!(
        "Replay backend initialized ({:.0} fps, {} frames), entering event loop",
        config.fps,
        state.recording.as_ref().map(Recording::len).unwrap_or(0)
    );

    while state.running {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("Shutdown signal received, exiting");
            state.running = false;
            break;
        }

        if let Some(dur) = exit_duration {
            if start_time.elapsed() >= dur {
                info!("Replay exit timer fired after {}s", dur.as_secs());
                state.running = false;
                break;
            }
        }

        if state.is_drained() {
            info!("Recording finished");
            state.running = false;
            break;
        }

        if last_status_log.elapsed() >= status_interval {
            info!("Status: {}", state.session.status_sexp());
            last_status_log = Instant::now();
        }

        event_loop.dispatch(Some(frame_interval), &mut state)?;
    }

    let now = state.now_ms();
    let events = state.session.shutdown(now);
    state.handle(events);
    state.speech.cancel();

    // Closing the request channel ends the worker loop.
    state.requests = None;
    drop(event_loop);
    if worker.join().is_err() {
        warn!("Model worker panicked");
    }

    info!(
        "Replay backend shutting down ({} frames, {} transcript entries, {} clicks)",
        state.session.frames,
        state.session.transcript().len(),
        state.clicks
    );
    Ok(state.session.transcript().entries().to_vec())
}
