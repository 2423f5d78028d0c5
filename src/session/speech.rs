//! Speech synthesizer seam and two local implementations.
//!
//! The session never talks to a synthesizer directly: it emits speak and
//! cancel requests, and the backend feeds `SpeechEvent`s back in.

use std::process::{Child, Command, Stdio};

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech command is empty")]
    EmptyCommand,
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Progress reported by a synthesizer.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechEvent {
    Started,
    Finished,
    Failed(String),
}

impl SpeechEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Finished => "finished",
            Self::Failed(_) => "failed",
        }
    }
}

/// Text-to-speech output.
pub trait SpeechSynthesizer {
    /// Begin speaking. Any utterance in progress is cancelled first.
    fn speak(&mut self, text: &str, language: &str, now_ms: f64) -> Result<(), SpeechError>;

    /// Stop the current utterance. No further events are reported for it.
    fn cancel(&mut self);

    /// Next pending event, if any.
    fn poll(&mut self, now_ms: f64) -> Option<SpeechEvent>;

    fn is_speaking(&self) -> bool;
}

// ── Log-only synthesizer ───────────────────────────────────

/// Logs utterances and reports completion after an estimated duration.
pub struct LogSpeech {
    /// Estimated speaking time per character (ms).
    pub ms_per_char: f64,
    /// Fixed lead-in/out (ms).
    pub base_ms: f64,
    pending_start: bool,
    deadline_ms: Option<f64>,
}

impl LogSpeech {
    pub fn new() -> Self {
        Self {
            ms_per_char: 60.0,
            base_ms: 400.0,
            pending_start: false,
            deadline_ms: None,
        }
    }
}

impl Default for LogSpeech {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechSynthesizer for LogSpeech {
    fn speak(&mut self, text: &str, language: &str, now_ms: f64) -> Result<(), SpeechError> {
        info!("Speaking [{}]: {}", language, text);
        let duration = self.base_ms + self.ms_per_char * text.chars().count() as f64;
        self.pending_start = true;
        self.deadline_ms = Some(now_ms + duration);
        Ok(())
    }

    fn cancel(&mut self) {
        if self.deadline_ms.take().is_some() {
            debug!("Speech cancelled");
        }
        self.pending_start = false;
    }

    fn poll(&mut self, now_ms: f64) -> Option<SpeechEvent> {
        if self.pending_start {
            self.pending_start = false;
            return Some(SpeechEvent::Started);
        }
        match self.deadline_ms {
            Some(deadline) if now_ms >= deadline => {
                self.deadline_ms = None;
                Some(SpeechEvent::Finished)
            }
            _ => None,
        }
    }

    fn is_speaking(&self) -> bool {
        self.deadline_ms.is_some()
    }
}

// ── External command synthesizer ───────────────────────────

/// Runs an external synthesizer per utterance, e.g.
/// `espeak-ng -v {lang} {text}`. `{lang}` and `{text}` are substituted
/// per argument; the text is never passed through a shell.
pub struct CommandSpeech {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
    pending_start: bool,
}

impl CommandSpeech {
    pub fn new(command: &str) -> Result<Self, SpeechError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(SpeechError::EmptyCommand)?;
        let mut args: Vec<String> = parts.collect();
        if !args.iter().any(|a| a.contains("{text}")) {
            args.push("{text}".to_string());
        }
        Ok(Self {
            program,
            args,
            child: None,
            pending_start: false,
        })
    }

    fn expand_args(&self, text: &str, language: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace("{lang}", language).replace("{text}", text))
            .collect()
    }
}

impl SpeechSynthesizer for CommandSpeech {
    fn speak(&mut self, text: &str, language: &str, _now_ms: f64) -> Result<(), SpeechError> {
        self.cancel();
        let child = Command::new(&self.program)
            .args(self.expand_args(text, language))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|source| SpeechError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        debug!("Spawned {} (pid {})", self.program, child.id());
        self.child = Some(child);
        self.pending_start = true;
        Ok(())
    }

    fn cancel(&mut self) {
        self.pending_start = false;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!("Speech process already gone: {}", e);
            }
            // Reap.
            let _ = child.wait();
            debug!("Speech cancelled");
        }
    }

    fn poll(&mut self, _now_ms: f64) -> Option<SpeechEvent> {
        if self.pending_start {
            self.pending_start = false;
            return Some(SpeechEvent::Started);
        }
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(None) => None,
            Ok(Some(status)) => {
                self.child = None;
                if status.success() {
                    Some(SpeechEvent::Finished)
                } else {
                    warn!("{} exited with {}", self.program, status);
                    Some(SpeechEvent::Failed(format!("{} exited with {}", self.program, status)))
                }
            }
            Err(e) => {
                self.child = None;
                Some(SpeechEvent::Failed(e.to_string()))
            }
        }
    }

    fn is_speaking(&self) -> bool {
        self.child.is_some()
    }
}

impl Drop for CommandSpeech {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_speech_lifecycle() {
        let mut s = LogSpeech::new();
        s.speak("Hello", "en", 0.0).unwrap();
        assert!(s.is_speaking());
        assert_eq!(s.poll(0.0), Some(SpeechEvent::Started));
        assert_eq!(s.poll(100.0), None);
        assert_eq!(s.poll(10_000.0), Some(SpeechEvent::Finished));
        assert!(!s.is_speaking());
        assert_eq!(s.poll(20_000.0), None);
    }

    #[test]
    fn test_log_speech_cancel_reports_nothing() {
        let mut s = LogSpeech::new();
        s.speak("Hello", "en", 0.0).unwrap();
        s.cancel();
        assert_eq!(s.poll(0.0), None);
        assert_eq!(s.poll(10_000.0), None);
    }

    #[test]
    fn test_command_parse() {
        let s = CommandSpeech::new("espeak-ng -v {lang} {text}").unwrap();
        assert_eq!(s.program, "espeak-ng");
        assert_eq!(s.expand_args("Thank you", "es"), vec!["-v", "es", "Thank you"]);
    }

    #[test]
    fn test_command_appends_text_placeholder() {
        let s = CommandSpeech::new("say").unwrap();
        assert_eq!(s.expand_args("Hi", "en"), vec!["Hi"]);
    }

    #[test]
    fn test_empty_command() {
        assert!(matches!(CommandSpeech::new("  "), Err(SpeechError::EmptyCommand)));
    }
}
