//! Append-only record of confirmed translations.

use tracing::info;

use crate::sexp::escape_string;

/// One confirmed translation. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationEntry {
    pub id: u64,
    /// Classifier label, or `"spelling"` for a fingerspelled word.
    pub sign_label: String,
    pub text: String,
    pub language: String,
    pub timestamp_ms: f64,
    pub confirmed: bool,
}

impl TranslationEntry {
    pub fn to_sexp(&self) -> String {
        format!(
            "(:id {} :label \"{}\" :text \"{}\" :language \"{}\" :timestamp {:.0} :confirmed {})",
            self.id,
            escape_string(&self.sign_label),
            escape_string(&self.text),
            escape_string(&self.language),
            self.timestamp_ms,
            if self.confirmed { "t" } else { "nil" },
        )
    }
}

/// In-memory session transcript.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<TranslationEntry>,
    next_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// Append a confirmed entry and return a copy of it.
    pub fn append(
        &mut self,
        sign_label: &str,
        text: &str,
        language: &str,
        timestamp_ms: f64,
    ) -> TranslationEntry {
        // Default::default leaves next_id at 0.
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        let entry = TranslationEntry {
            id,
            sign_label: sign_label.to_string(),
            text: text.to_string(),
            language: language.to_string(),
            timestamp_ms,
            confirmed: true,
        };
        info!("Transcript #{}: {} ({})", id, entry.text, entry.language);
        self.entries.push(entry.clone());
        entry
    }

    pub fn entries(&self) -> &[TranslationEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&TranslationEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
