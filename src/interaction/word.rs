//! Word builder. Accumulates fingerspelled letters into a word.
//!
//! Letters pass two debounces before they are appended: a streak of
//! identical detections close together in time, then a repeat guard
//! against the same letter being appended twice in quick succession.
//! Every append or deletion restarts an auto-finalize countdown.

use tracing::{debug, info};

use super::timer::TimerSlot;
use crate::sexp::escape_string;

/// Label prefix the classifier uses for fingerspelled letters.
pub const LETTER_LABEL_PREFIX: &str = "letter_";

/// Parse a letter label (`letter_a` → `'A'`). Anything else is `None`.
pub fn letter_from_label(label: &str) -> Option<char> {
    let rest = label.strip_prefix(LETTER_LABEL_PREFIX)?;
    let mut chars = rest.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Some(c.to_ascii_uppercase()),
        _ => None,
    }
}

// ── Config ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WordConfig {
    /// Identical detections needed before a letter is considered.
    pub streak_count: u32,
    /// Max gap between detections in one streak (ms).
    pub streak_window_ms: f64,
    /// Spelling-specific confidence floor.
    pub min_confidence: f32,
    /// Minimum gap before the same letter may be appended again (ms).
    pub repeat_gap_ms: f64,
    /// Idle time after the last edit before the word finalizes (ms).
    pub auto_finalize_ms: f64,
}

impl Default for WordConfig {
    fn default() -> Self {
        Self {
            streak_count: 3,
            streak_window_ms: 900.0,
            min_confidence: 0.75,
            repeat_gap_ms: 1200.0,
            auto_finalize_ms: 3000.0,
        }
    }
}

// ── State ──────────────────────────────────────────────────

/// Vote counter for one candidate letter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterStreak {
    pub letter: char,
    pub count: u32,
    pub last_ms: f64,
}

/// An in-progress word. Exists only while it has letters.
#[derive(Debug, Clone, PartialEq)]
pub struct WordState {
    pub letters: Vec<char>,
    pub last_accepted: Option<char>,
    pub last_accepted_ms: f64,
}

impl WordState {
    pub fn text(&self) -> String {
        self.letters.iter().collect()
    }
}

/// Why a completed streak did not append a letter.
#[derive(Debug, Clone, PartialEq)]
pub enum WordNotice {
    LowConfidence { letter: char, confidence: f32 },
    Repeated { letter: char },
}

impl WordNotice {
    pub fn message(&self) -> String {
        match self {
            Self::LowConfidence { letter, confidence } => format!(
                "Not sure about '{}' ({:.0}%), try again",
                letter,
                confidence * 100.0
            ),
            Self::Repeated { letter } => format!("'{}' already added", letter),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WordEvent {
    /// First letter of a new word.
    Started,
    LetterAccepted { letter: char, word: String },
    LetterDeleted { letter: char, word: String },
    Notice(WordNotice),
    /// The word is complete, by countdown or by request.
    Finalized { word: String },
    /// The word was discarded.
    Cleared,
}

// ── Builder ────────────────────────────────────────────────

pub struct WordBuilder {
    pub config: WordConfig,
    word: Option<WordState>,
    streak: Option<LetterStreak>,
    countdown: TimerSlot,
}

impl WordBuilder {
    pub fn new(config: WordConfig) -> Self {
        Self {
            config,
            word: None,
            streak: None,
            countdown: TimerSlot::new("word-finalize"),
        }
    }

    pub fn word(&self) -> Option<&WordState> {
        self.word.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.word.is_some()
    }

    pub fn streak(&self) -> Option<&LetterStreak> {
        self.streak.as_ref()
    }

    /// Seconds left on the auto-finalize countdown.
    pub fn countdown_secs(&self, now_ms: f64) -> Option<u32> {
        self.countdown.remaining_secs(now_ms)
    }

    /// Feed one letter classification.
    pub fn on_letter(&mut self, letter: char, confidence: f32, now_ms: f64) -> Vec<WordEvent> {
        let letter = letter.to_ascii_uppercase();
        let count = match self.streak {
            Some(s) if s.letter == letter && now_ms - s.last_ms <= self.config.streak_window_ms => {
                s.count + 1
            }
            _ => 1,
        };
        if count < self.config.streak_count {
            self.streak = Some(LetterStreak {
                letter,
                count,
                last_ms: now_ms,
            });
            return Vec::new();
        }
        self.streak = None;

        if confidence < self.config.min_confidence {
            debug!("Letter {} rejected at {:.2}", letter, confidence);
            return vec![WordEvent::Notice(WordNotice::LowConfidence { letter, confidence })];
        }

        if let Some(w) = &self.word {
            if w.last_accepted == Some(letter)
                && now_ms - w.last_accepted_ms < self.config.repeat_gap_ms
            {
                debug!("Letter {} suppressed as repeat", letter);
                return vec![WordEvent::Notice(WordNotice::Repeated { letter })];
            }
        }

        let mut events = Vec::new();
        let word = self.word.get_or_insert_with(|| {
            events.push(WordEvent::Started);
            WordState {
                letters: Vec::new(),
                last_accepted: None,
                last_accepted_ms: now_ms,
            }
        });
        word.letters.push(letter);
        word.last_accepted = Some(letter);
        word.last_accepted_ms = now_ms;
        let text = word.text();
        self.countdown.arm(now_ms, self.config.auto_finalize_ms);
        debug!("Letter {} accepted: {}", letter, text);
        events.push(WordEvent::LetterAccepted { letter, word: text });
        events
    }

    /// Pop the last letter. Removing the only letter ends the word.
    pub fn delete_last(&mut self, now_ms: f64) -> Vec<WordEvent> {
        let Some(word) = self.word.as_mut() else {
            return Vec::new();
        };
        let Some(letter) = word.letters.pop() else {
            return Vec::new();
        };
        // A corrected letter may be signed again straight away.
        word.last_accepted = word.letters.last().copied();
        let text = word.text();
        let mut events = vec![WordEvent::LetterDeleted { letter, word: text }];
        if word.letters.is_empty() {
            events.extend(self.clear());
        } else {
            self.countdown.arm(now_ms, self.config.auto_finalize_ms);
        }
        events
    }

    /// End the word now and emit it.
    pub fn finalize(&mut self) -> Option<WordEvent> {
        self.countdown.cancel();
        self.streak = None;
        let word = self.word.take()?.text();
        info!("Word finalized: {}", word);
        Some(WordEvent::Finalized { word })
    }

    /// Discard the word without emitting it.
    pub fn cancel(&mut self) -> Option<WordEvent> {
        self.clear()
    }

    fn clear(&mut self) -> Option<WordEvent> {
        self.countdown.cancel();
        self.streak = None;
        self.word.take().map(|w| {
            debug!("Word cleared: {}", w.text());
            WordEvent::Cleared
        })
    }

    /// Drive the auto-finalize countdown.
    pub fn tick(&mut self, now_ms: f64) -> Option<WordEvent> {
        self.countdown.poll(now_ms)?;
        self.finalize()
    }

    /// Generate s-expression for status output.
    pub fn status_sexp(&self, now_ms: f64) -> String {
        match &self.word {
            Some(w) => format!(
                "(:active t :word \"{}\" :countdown {})",
                escape_string(&w.text()),
                self.countdown_secs(now_ms).unwrap_or(0)
            ),
            None => "(:active nil)".to_string(),
        }
    }
}

impl Default for WordBuilder {
    fn default() -> Self {
        Self::new(WordConfig::default())
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed a full streak (three detections 100ms apart) ending at `end_ms`.
    fn spell(wb: &mut WordBuilder, letter: char, confidence: f32, end_ms: f64) -> Vec<WordEvent> {
        let mut events = Vec::new();
        for i in (0..wb.config.streak_count).rev() {
            events.extend(wb.on_letter(letter, confidence, end_ms - i as f64 * 100.0));
        }
        events
    }

    fn word_text(wb: &WordBuilder) -> Option<String> {
        wb.word().map(|w| w.text())
    }

    #[test]
    fn test_letter_from_label() {
        assert_eq!(letter_from_label("letter_a"), Some('A'));
        assert_eq!(letter_from_label("letter_Z"), Some('Z'));
        assert_eq!(letter_from_label("letter_ab"), None);
        assert_eq!(letter_from_label("hello"), None);
        assert_eq!(letter_from_label("letter_1"), None);
    }

    #[test]
    fn test_streak_accepts_letter() {
        let mut wb = WordBuilder::default();
        assert!(wb.on_letter('A', 0.8, 0.0).is_empty());
        assert!(wb.on_letter('A', 0.8, 300.0).is_empty());
        let events = wb.on_letter('A', 0.8, 600.0);
        assert_eq!(
            events,
            vec![
                WordEvent::Started,
                WordEvent::LetterAccepted {
                    letter: 'A',
                    word: "A".into()
                }
            ]
        );
        assert_eq!(wb.countdown_secs(600.0), Some(3));
    }

    #[test]
    fn test_streak_resets_on_label_change() {
        let mut wb = WordBuilder::default();
        wb.on_letter('A', 0.9, 0.0);
        wb.on_letter('A', 0.9, 100.0);
        wb.on_letter('B', 0.9, 200.0);
        assert!(wb.on_letter('A', 0.9, 300.0).is_empty());
        assert!(!wb.is_active());
    }

    #[test]
    fn test_streak_resets_when_window_lapses() {
        let mut wb = WordBuilder::default();
        wb.on_letter('A', 0.9, 0.0);
        wb.on_letter('A', 0.9, 500.0);
        // 901ms gap breaks the streak.
        assert!(wb.on_letter('A', 0.9, 1401.0).is_empty());
        assert_eq!(wb.streak().unwrap().count, 1);
    }

    #[test]
    fn test_low_confidence_rejected() {
        let mut wb = WordBuilder::default();
        spell(&mut wb, 'H', 0.9, 0.0);
        let events = spell(&mut wb, 'I', 0.6, 1000.0);
        assert_eq!(
            events,
            vec![WordEvent::Notice(WordNotice::LowConfidence {
                letter: 'I',
                confidence: 0.6
            })]
        );
        // Word and countdown untouched.
        assert_eq!(word_text(&wb).as_deref(), Some("H"));
        assert_eq!(wb.countdown_secs(1000.0), Some(2));
    }

    #[test]
    fn test_repeat_guard() {
        let mut wb = WordBuilder::default();
        spell(&mut wb, 'L', 0.9, 0.0);
        let events = spell(&mut wb, 'L', 0.9, 600.0);
        assert_eq!(events, vec![WordEvent::Notice(WordNotice::Repeated { letter: 'L' })]);
        assert_eq!(word_text(&wb).as_deref(), Some("L"));

        // Past the gap the double letter is allowed.
        spell(&mut wb, 'L', 0.9, 1300.0);
        assert_eq!(word_text(&wb).as_deref(), Some("LL"));
    }

    #[test]
    fn test_different_letter_not_repeat_guarded() {
        let mut wb = WordBuilder::default();
        spell(&mut wb, 'H', 0.9, 0.0);
        spell(&mut wb, 'I', 0.9, 300.0);
        assert_eq!(word_text(&wb).as_deref(), Some("HI"));
    }

    #[test]
    fn test_auto_finalize_fires_once() {
        let mut wb = WordBuilder::default();
        spell(&mut wb, 'O', 0.9, 0.0);
        spell(&mut wb, 'K', 0.9, 1000.0);
        assert!(wb.tick(3999.0).is_none());
        assert_eq!(
            wb.tick(4000.0),
            Some(WordEvent::Finalized { word: "OK".into() })
        );
        assert!(wb.tick(8000.0).is_none());
        assert!(!wb.is_active());
    }

    #[test]
    fn test_delete_restarts_countdown() {
        let mut wb = WordBuilder::default();
        spell(&mut wb, 'A', 0.9, 0.0);
        spell(&mut wb, 'B', 0.9, 500.0);
        let events = wb.delete_last(2500.0);
        assert_eq!(
            events,
            vec![WordEvent::LetterDeleted {
                letter: 'B',
                word: "A".into()
            }]
        );
        assert!(wb.tick(3600.0).is_none(), "countdown restarted at delete");
        assert!(wb.tick(5500.0).is_some());
    }

    #[test]
    fn test_delete_only_letter_ends_word() {
        let mut wb = WordBuilder::default();
        spell(&mut wb, 'A', 0.9, 0.0);
        let events = wb.delete_last(100.0);
        assert_eq!(events.last(), Some(&WordEvent::Cleared));
        assert!(!wb.is_active());
        assert!(wb.countdown_secs(100.0).is_none());
        assert!(wb.tick(10_000.0).is_none());
    }

    #[test]
    fn test_delete_clears_repeat_guard() {
        let mut wb = WordBuilder::default();
        spell(&mut wb, 'A', 0.9, 0.0);
        spell(&mut wb, 'B', 0.9, 300.0);
        wb.delete_last(400.0);
        spell(&mut wb, 'B', 0.9, 700.0);
        assert_eq!(word_text(&wb).as_deref(), Some("AB"));
    }

    #[test]
    fn test_finalize_and_cancel() {
        let mut wb = WordBuilder::default();
        assert!(wb.finalize().is_none());
        spell(&mut wb, 'Y', 0.9, 0.0);
        assert_eq!(wb.finalize(), Some(WordEvent::Finalized { word: "Y".into() }));
        assert!(wb.tick(5000.0).is_none());

        spell(&mut wb, 'N', 0.9, 6000.0);
        assert_eq!(wb.cancel(), Some(WordEvent::Cleared));
        assert!(wb.cancel().is_none());
        assert!(wb.tick(10_000.0).is_none());
    }

    #[test]
    fn test_status_sexp() {
        let mut wb = WordBuilder::default();
        assert_eq!(wb.status_sexp(0.0), "(:active nil)");
        spell(&mut wb, 'A', 0.9, 0.0);
        assert_eq!(wb.status_sexp(0.0), "(:active t :word \"A\" :countdown 3)");
    }
}
