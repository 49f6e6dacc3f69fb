// SPDX-License-Identifier: MIT

//! Hybrid-mode retrieval trigger
//!
//! The trigger fires when the normalized user message contains one of a fixed
//! set of back-reference phrases as whole words. The phrase set is frozen when
//! the trigger is built from configuration.

/// Back-reference phrases used when configuration does not override them
pub const DEFAULT_TRIGGER_PHRASES: &[&str] = &[
    "remember",
    "recall",
    "earlier",
    "before",
    "you said",
    "last time",
    "we discussed",
    "did i tell you",
    "previously",
    "what did i",
];

/// Lowercase, turn punctuation into spaces, collapse whitespace
pub fn normalize_text(text: &str) -> String {
    text.chars()
        .flat_map(|c| {
            let c = if c.is_alphanumeric() { c } else { ' ' };
            c.to_lowercase()
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalTrigger {
    phrases: Vec<String>,
}

impl Default for RetrievalTrigger {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER_PHRASES.iter().copied())
    }
}

impl RetrievalTrigger {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut phrases: Vec<String> = phrases
            .into_iter()
            .map(|p| normalize_text(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        phrases.sort();
        phrases.dedup();
        Self { phrases }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// First phrase (in sorted order) present in the message
    pub fn matched(&self, message: &str) -> Option<&str> {
        let padded = format!(" {} ", normalize_text(message));
        self.phrases
            .iter()
            .find(|phrase| padded.contains(&format!(" {phrase} ")))
            .map(String::as_str)
    }

    pub fn fires(&self, message: &str) -> bool {
        self.matched(message).is_some()
    }
}
