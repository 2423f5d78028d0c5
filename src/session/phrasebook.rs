//! Display text for classifier labels, per language.

use std::collections::HashMap;

/// `thank_you` → `Thank you`.
pub fn humanize_label(label: &str) -> String {
    let spaced = label.replace(['_', '-'], " ");
    let mut chars = spaced.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Label → text lookup with per-language overrides.
#[derive(Debug, Clone, Default)]
pub struct Phrasebook {
    /// language → (label → text)
    overrides: HashMap<String, HashMap<String, String>>,
}

impl Phrasebook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, language: &str, label: &str, text: &str) {
        self.overrides
            .entry(language.to_string())
            .or_default()
            .insert(label.to_string(), text.to_string());
    }

    /// Localized text, falling back to the humanized label.
    pub fn text_for(&self, label: &str, language: &str) -> String {
        self.overrides
            .get(language)
            .and_then(|m| m.get(label))
            .cloned()
            .unwrap_or_else(|| humanize_label(label))
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.overrides.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_humanize() {
        assert_eq!(humanize_label("hello"), "Hello");
        assert_eq!(humanize_label("thank_you"), "Thank you");
        assert_eq!(humanize_label("good-morning"), "Good morning");
        assert_eq!(humanize_label(""), "");
    }

    #[test]
    fn test_override_per_language() {
        let mut book = Phrasebook::new();
        book.insert("es", "hello", "Hola");
        assert_eq!(book.text_for("hello", "es"), "Hola");
        assert_eq!(book.text_for("hello", "en"), "Hello");
        assert_eq!(book.text_for("thank_you", "es"), "Thank you");
        assert_eq!(book.languages().collect::<Vec<_>>(), vec!["es"]);
    }
}
