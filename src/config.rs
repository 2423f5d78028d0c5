//! Engine configuration.
//!
//! One `EngineConfig` aggregates every component's settings.  It loads
//! from an s-expression plist; absent keys keep their defaults:
//!
//! ```text
//! (:labels ("hello" "thank_you" "letter_a")
//!  :recognition (:sequence-length 30 :confidence-threshold 0.45)
//!  :mode (:hold-ms 1000 :cooldown-ms 1500 :classifier-policy :immediate)
//!  :word (:streak-count 3 :min-confidence 0.75)
//!  :pointer (:smoothing 0.25 :mirror t :preferred-hand :right)
//!  :session (:confirm-ms 2000 :language "en")
//!  :phrases (:es (:hello "Hola" :thank_you "Gracias")))
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use lexpr::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::interaction::{ClassifierSwitchPolicy, ModeConfig, PointerConfig, WordConfig};
use crate::recognition::{PoseConfig, RecognitionConfig};
use crate::session::{Phrasebook, SessionConfig};
use crate::tracking::{Handedness, MAX_HANDS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed s-expression: {0}")]
    Parse(String),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("malformed labels file {path}: {reason}")]
    Labels { path: PathBuf, reason: String },
}

/// Every component's configuration plus the label vocabulary.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub recognition: RecognitionConfig,
    pub pose: PoseConfig,
    pub mode: ModeConfig,
    pub word: WordConfig,
    pub pointer: PointerConfig,
    pub session: SessionConfig,
    pub phrasebook: Phrasebook,
    /// Classifier vocabulary in model output order.
    pub labels: Vec<String>,
}

impl EngineConfig {
    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_sexp(&raw)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse a plist, starting from defaults.
    pub fn from_sexp(raw: &str) -> Result<Self, ConfigError> {
        let value = lexpr::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = Self::default();
        config.apply(&value)?;
        Ok(config)
    }

    /// Overlay the keys present in `value`.
    pub fn apply(&mut self, value: &Value) -> Result<(), ConfigError> {
        if let Some(labels) = get_value(value, "labels") {
            self.labels = string_list(labels, "labels")?;
        }
        if let Some(v) = get_value(value, "recognition") {
            apply_recognition(&mut self.recognition, v)?;
        }
        if let Some(v) = get_value(value, "pose") {
            apply_pose(&mut self.pose, v)?;
        }
        if let Some(v) = get_value(value, "mode") {
            apply_mode(&mut self.mode, v)?;
        }
        if let Some(v) = get_value(value, "word") {
            apply_word(&mut self.word, v)?;
        }
        if let Some(v) = get_value(value, "pointer") {
            apply_pointer(&mut self.pointer, v)?;
        }
        if let Some(v) = get_value(value, "session") {
            apply_session(&mut self.session, v)?;
        }
        if let Some(v) = get_value(value, "phrases") {
            for (language, entries) in plist_pairs(v) {
                for (label, text) in plist_pairs(entries) {
                    let text = scalar(text).ok_or_else(|| invalid(&label, text))?;
                    self.phrasebook.insert(&language, &label, &text);
                }
            }
        }
        Ok(())
    }
}

/// Read a `labels.json` array as written by the training pipeline.
pub fn load_labels_json(path: &Path) -> Result<Vec<String>, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let labels: Vec<String> = serde_json::from_str(&raw).map_err(|e| ConfigError::Labels {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if labels.is_empty() {
        return Err(ConfigError::Labels {
            path: path.to_path_buf(),
            reason: "no labels".to_string(),
        });
    }
    debug!("Loaded {} labels from {}", labels.len(), path.display());
    Ok(labels)
}

// ── Sections ───────────────────────────────────────────────

fn apply_recognition(c: &mut RecognitionConfig, v: &Value) -> Result<(), ConfigError> {
    if let Some(n) = get_usize(v, "sequence-length")? {
        if n == 0 {
            return Err(invalid_str("sequence-length", "0"));
        }
        c.sequence_length = n;
    }
    if let Some(t) = get_unit(v, "confidence-threshold")? {
        c.confidence_threshold = t;
    }
    if let Some(ms) = get_ms(v, "classify-interval-ms")? {
        c.classify_interval_ms = ms;
    }
    if let Some(n) = get_usize(v, "silence-reset-frames")? {
        c.silence_reset_frames = n as u32;
    }
    if let Some(n) = get_usize(v, "hand-slots")? {
        if n == 0 || n > MAX_HANDS {
            return Err(invalid_str("hand-slots", &n.to_string()));
        }
        c.hand_slots = n;
    }
    Ok(())
}

fn apply_pose(c: &mut PoseConfig, v: &Value) -> Result<(), ConfigError> {
    if let Some(r) = get_f64(v, "curl-ratio")? {
        c.curl_ratio = r as f32;
    }
    if let Some(m) = get_f64(v, "thumb-raise-margin")? {
        c.thumb_raise_margin = m as f32;
    }
    Ok(())
}

fn apply_mode(c: &mut ModeConfig, v: &Value) -> Result<(), ConfigError> {
    if let Some(ms) = get_ms(v, "hold-ms")? {
        c.hold_ms = ms;
    }
    if let Some(ms) = get_ms(v, "cooldown-ms")? {
        c.cooldown_ms = ms;
    }
    if let Some(p) = get_keyword(v, "classifier-policy") {
        c.classifier_policy = ClassifierSwitchPolicy::from_str(&p)
            .ok_or_else(|| invalid_str("classifier-policy", &p))?;
    }
    Ok(())
}

fn apply_word(c: &mut WordConfig, v: &Value) -> Result<(), ConfigError> {
    if let Some(n) = get_usize(v, "streak-count")? {
        c.streak_count = n.max(1) as u32;
    }
    if let Some(ms) = get_ms(v, "streak-window-ms")? {
        c.streak_window_ms = ms;
    }
    if let Some(t) = get_unit(v, "min-confidence")? {
        c.min_confidence = t;
    }
    if let Some(ms) = get_ms(v, "repeat-gap-ms")? {
        c.repeat_gap_ms = ms;
    }
    if let Some(ms) = get_ms(v, "auto-finalize-ms")? {
        c.auto_finalize_ms = ms;
    }
    Ok(())
}

fn apply_pointer(c: &mut PointerConfig, v: &Value) -> Result<(), ConfigError> {
    if let Some(s) = get_unit(v, "smoothing")? {
        c.smoothing = s;
    }
    if let Some(t) = get_f64(v, "pinch-threshold")? {
        c.pinch_threshold = t as f32;
    }
    if let Some(ms) = get_ms(v, "click-cooldown-ms")? {
        c.click_cooldown_ms = ms;
    }
    if let Some(m) = get_bool(v, "mirror") {
        c.mirror = m;
    }
    if let Some(w) = get_f64(v, "screen-width")? {
        c.screen_width = w as f32;
    }
    if let Some(h) = get_f64(v, "screen-height")? {
        c.screen_height = h as f32;
    }
    if let Some(h) = get_keyword(v, "preferred-hand") {
        c.preferred_hand = match h.as_str() {
            "nil" | "any" => None,
            other => Some(
                Handedness::from_str(other).ok_or_else(|| invalid_str("preferred-hand", other))?,
            ),
        };
    }
    Ok(())
}

fn apply_session(c: &mut SessionConfig, v: &Value) -> Result<(), ConfigError> {
    if let Some(n) = get_usize(v, "idle-frames")? {
        c.idle_frames_to_ready = n as u32;
    }
    if let Some(ms) = get_ms(v, "confirm-ms")? {
        c.confirm_ms = ms;
    }
    if let Some(lang) = get_keyword(v, "language") {
        c.language = lang;
    }
    if let Some(l) = get_keyword(v, "mode-sign") {
        c.mode_labels.sign = l;
    }
    if let Some(l) = get_keyword(v, "mode-spell") {
        c.mode_labels.spelling = l;
    }
    if let Some(l) = get_keyword(v, "mode-navigate") {
        c.mode_labels.navigate = l;
    }
    Ok(())
}

// ── Plist helpers ──────────────────────────────────────────

fn key_name(v: &Value) -> Option<String> {
    match v {
        Value::Keyword(k) => Some(k.to_string()),
        Value::Symbol(s) => s.strip_prefix(':').map(str::to_string),
        _ => None,
    }
}

/// Raw value following `:key` in a plist.
fn get_value<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let mut current = value;
    while let Value::Cons(pair) = current {
        if key_name(pair.car()).as_deref() == Some(key) {
            return match pair.cdr() {
                Value::Cons(next) => Some(next.car()),
                _ => None,
            };
        }
        current = pair.cdr();
    }
    None
}

/// Scalar rendered as a string; keywords lose their colon.
fn scalar(v: &Value) -> Option<String> {
    match v {
        Value::Keyword(k) => Some(k.to_string()),
        Value::Symbol(s) => Some(s.strip_prefix(':').unwrap_or(&**s).to_string()),
        Value::String(s) => Some(s.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "t" } else { "nil" }.to_string()),
        Value::Null | Value::Nil => Some("nil".to_string()),
        _ => None,
    }
}

/// `(:a 1 :b 2)` → `[("a", 1), ("b", 2)]`.
fn plist_pairs(value: &Value) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    let mut current = value;
    while let Value::Cons(pair) = current {
        let Value::Cons(next) = pair.cdr() else {
            break;
        };
        if let Some(key) = key_name(pair.car()) {
            out.push((key, next.car()));
        }
        current = next.cdr();
    }
    out
}

fn string_list(value: &Value, key: &str) -> Result<Vec<String>, ConfigError> {
    let mut out = Vec::new();
    let mut current = value;
    loop {
        match current {
            Value::Cons(pair) => {
                out.push(scalar(pair.car()).ok_or_else(|| invalid(key, pair.car()))?);
                current = pair.cdr();
            }
            Value::Null | Value::Nil => break,
            other => return Err(invalid(key, other)),
        }
    }
    Ok(out)
}

fn get_keyword(value: &Value, key: &str) -> Option<String> {
    get_value(value, key).and_then(scalar)
}

fn get_bool(value: &Value, key: &str) -> Option<bool> {
    get_keyword(value, key).map(|s| s != "nil")
}

fn get_f64(value: &Value, key: &str) -> Result<Option<f64>, ConfigError> {
    match get_keyword(value, key) {
        None => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| invalid_str(key, &s)),
    }
}

/// Non-negative duration in ms.
fn get_ms(value: &Value, key: &str) -> Result<Option<f64>, ConfigError> {
    match get_f64(value, key)? {
        Some(ms) if ms < 0.0 => Err(invalid_str(key, &ms.to_string())),
        other => Ok(other),
    }
}

/// Value in 0.0-1.0.
fn get_unit(value: &Value, key: &str) -> Result<Option<f32>, ConfigError> {
    match get_f64(value, key)? {
        Some(v) if !(0.0..=1.0).contains(&v) => Err(invalid_str(key, &v.to_string())),
        other => Ok(other.map(|v| v as f32)),
    }
}

fn get_usize(value: &Value, key: &str) -> Result<Option<usize>, ConfigError> {
    match get_keyword(value, key) {
        None => Ok(None),
        Some(s) => s.parse().map(Some).map_err(|_| invalid_str(key, &s)),
    }
}

fn invalid(key: &str, value: &Value) -> ConfigError {
    invalid_str(key, &value.to_string())
}

fn invalid_str(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::InteractionMode;

    #[test]
    fn test_empty_plist_keeps_defaults() {
        let c = EngineConfig::from_sexp("()").unwrap();
        assert_eq!(c.recognition.sequence_length, 30);
        assert_eq!(c.recognition.confidence_threshold, 0.45);
        assert_eq!(c.mode.hold_ms, 1000.0);
        assert_eq!(c.word.streak_count, 3);
        assert_eq!(c.pointer.smoothing, 0.25);
        assert_eq!(c.session.confirm_ms, 2000.0);
        assert!(c.labels.is_empty());
    }

    #[test]
    fn test_nested_sections() {
        let c = EngineConfig::from_sexp(
            "(:recognition (:sequence-length 20 :confidence-threshold 0.6 :hand-slots 1)
              :mode (:hold-ms 800 :classifier-policy :respect-cooldown)
              :word (:streak-count 4 :auto-finalize-ms 2500)
              :pointer (:mirror nil :preferred-hand :left :screen-width 1280)
              :session (:confirm-ms 1500 :language \"es\" :mode-spell \"spell\"))",
        )
        .unwrap();
        assert_eq!(c.recognition.sequence_length, 20);
        assert!((c.recognition.confidence_threshold - 0.6).abs() < 1e-6);
        assert_eq!(c.recognition.hand_slots, 1);
        assert_eq!(c.mode.hold_ms, 800.0);
        assert_eq!(c.mode.cooldown_ms, 1500.0, "untouched key keeps default");
        assert_eq!(c.mode.classifier_policy, ClassifierSwitchPolicy::RespectCooldown);
        assert_eq!(c.word.streak_count, 4);
        assert_eq!(c.word.auto_finalize_ms, 2500.0);
        assert!(!c.pointer.mirror);
        assert_eq!(c.pointer.preferred_hand, Some(Handedness::Left));
        assert_eq!(c.pointer.screen_width, 1280.0);
        assert_eq!(c.session.language, "es");
        assert_eq!(
            c.session.mode_labels.mode_for("spell"),
            Some(InteractionMode::Spelling)
        );
    }

    #[test]
    fn test_labels_and_phrases() {
        let c = EngineConfig::from_sexp(
            "(:labels (\"hello\" \"thank_you\") :phrases (:es (:hello \"Hola\")))",
        )
        .unwrap();
        assert_eq!(c.labels, vec!["hello", "thank_you"]);
        assert_eq!(c.phrasebook.text_for("hello", "es"), "Hola");
        assert_eq!(c.phrasebook.text_for("thank_you", "es"), "Thank you");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            EngineConfig::from_sexp("(:recognition (:confidence-threshold 1.5))"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            EngineConfig::from_sexp("(:recognition (:hand-slots 3))"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            EngineConfig::from_sexp("(:mode (:hold-ms -5))"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            EngineConfig::from_sexp("(:mode (:classifier-policy :sometimes))"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            EngineConfig::from_sexp("(:mode (:hold-ms"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_get_value_symbol_keys() {
        let v = lexpr::from_str("(:a 1 :b (:c 2))").unwrap();
        assert_eq!(get_keyword(&v, "a").as_deref(), Some("1"));
        let b = get_value(&v, "b").unwrap();
        assert_eq!(get_keyword(b, "c").as_deref(), Some("2"));
        assert!(get_value(&v, "missing").is_none());
    }

    #[test]
    fn test_load_labels_json() {
        let dir = std::env::temp_dir().join(format!("signassist-labels-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("labels.json");
        fs::write(&path, r#"["hello", "letter_a", "thank_you"]"#).unwrap();
        assert_eq!(
            load_labels_json(&path).unwrap(),
            vec!["hello", "letter_a", "thank_you"]
        );
        fs::write(&path, "{}").unwrap();
        assert!(matches!(load_labels_json(&path), Err(ConfigError::Labels { .. })));
        fs::remove_dir_all(&dir).ok();
    }
}
