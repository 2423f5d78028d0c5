//! signassist - touchless sign-language interaction engine
//!
//! Replays recorded hand landmarks through the full session: sequence
//! classification, mode switching, spelling, pointer, confirmation and
//! speech.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use signassist::backend::{replay, ModelLoader, Recording, ReplayConfig};
use signassist::config::{load_labels_json, EngineConfig};
use signassist::recognition::{load_samples, FeatureLayout, SequenceModel, TemplateModel};
use signassist::session::{CommandSpeech, LogSpeech, Session, SpeechSynthesizer};

#[derive(Parser, Debug)]
#[command(name = "signassist", about = "Touchless sign-language interaction engine")]
struct Cli {
    /// Configuration file (s-expression plist)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Recorded landmark samples to replay (JSON)
    #[arg(long)]
    recording: Option<PathBuf>,

    /// Recorded samples to build the template model from (JSON)
    #[arg(long)]
    templates: Option<PathBuf>,

    /// Label vocabulary (labels.json array)
    #[arg(long)]
    labels: Option<PathBuf>,

    /// External synthesizer, e.g. "espeak-ng -v {lang} {text}"
    #[arg(long)]
    speech_command: Option<String>,

    /// Speech/display language tag
    #[arg(long)]
    language: Option<String>,

    /// Replay frame rate
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Exit after N seconds
    #[arg(long)]
    exit_after: Option<u64>,

    /// Restart the recording when it ends
    #[arg(long)]
    loop_recording: bool,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("signassist {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signassist=info".into()),
        )
        .init();

    info!("signassist v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(language) = &cli.language {
        config.session.language = language.clone();
    }
    if let Some(path) = &cli.labels {
        config.labels = load_labels_json(path)
            .with_context(|| format!("loading labels {}", path.display()))?;
    }

    let samples = match &cli.templates {
        Some(path) => Some(
            load_samples(path).with_context(|| format!("loading templates {}", path.display()))?,
        ),
        None => None,
    };
    if config.labels.is_empty() {
        if let Some(samples) = &samples {
            // Same ordering the training pipeline writes to labels.json.
            let labels: BTreeSet<&str> = samples.iter().map(|s| s.label.as_str()).collect();
            config.labels = labels.into_iter().map(str::to_string).collect();
            info!("Vocabulary from templates: {} labels", config.labels.len());
        }
    }
    if config.labels.is_empty() {
        warn!("No label vocabulary configured; sequence gestures disabled");
    }

    let layout = FeatureLayout::new(config.recognition.hand_slots);
    let loader: Option<ModelLoader> = samples.map(|samples| {
        let labels = config.labels.clone();
        let sequence_length = config.recognition.sequence_length;
        let width = layout.width();
        let loader: ModelLoader = Box::new(move || {
            TemplateModel::from_samples(&samples, &labels, sequence_length, width)
                .map(|m| Box::new(m) as Box<dyn SequenceModel>)
        });
        loader
    });

    let replay_config = ReplayConfig {
        fps: cli.fps,
        exit_after: cli.exit_after,
        ..ReplayConfig::default()
    };

    let recording = match &cli.recording {
        Some(path) => {
            let mut rec = Recording::load(path, layout, replay_config.gap_frames)
                .with_context(|| format!("loading recording {}", path.display()))?;
            rec.looping = cli.loop_recording;
            Some(rec)
        }
        None => {
            warn!("No recording given; running with an empty camera");
            None
        }
    };

    let speech: Box<dyn SpeechSynthesizer> = match &cli.speech_command {
        Some(cmd) => Box::new(CommandSpeech::new(cmd).context("invalid speech command")?),
        None => Box::new(LogSpeech::new()),
    };

    let session = Session::new(config);
    let transcript = replay::run(session, recording, loader, speech, replay_config)?;

    for entry in &transcript {
        println!("{}", entry.to_sexp());
    }
    Ok(())
}
