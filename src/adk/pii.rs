// SPDX-License-Identifier: MIT

//! PII masking capability
//!
//! The engine only depends on the [`Masker`] trait. [`PatternMasker`] is a
//! regex-based default good enough for emails, phone numbers, card-like digit
//! runs and IPv4 addresses.

use crate::adk::error::RoutingError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::error::Error;
use std::fmt;
use std::str::FromStr;

/// How detected PII is rewritten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PiiMode {
    /// Replace with a generic label such as `[EMAIL]`
    #[default]
    Placeholder,
    /// Replace with a stable pseudonym such as `<EMAIL_3f2a9c1b>`
    Pseudonymize,
}

impl FromStr for PiiMode {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "placeholder" => Ok(Self::Placeholder),
            "pseudonymize" | "pseudonymise" => Ok(Self::Pseudonymize),
            other => Err(RoutingError::UnknownPiiMode(other.to_string())),
        }
    }
}

impl fmt::Display for PiiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Placeholder => f.write_str("placeholder"),
            Self::Pseudonymize => f.write_str("pseudonymize"),
        }
    }
}

/// Core trait for the PII masking capability
#[async_trait]
pub trait Masker: Send + Sync {
    async fn mask(&self, text: &str, mode: PiiMode)
        -> Result<String, Box<dyn Error + Send + Sync>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PiiKind {
    Email,
    Ip,
    Card,
    Phone,
}

impl PiiKind {
    fn label(self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Ip => "IP",
            Self::Card => "CARD",
            Self::Phone => "PHONE",
        }
    }
}

// Checked in order; earlier kinds win on overlapping matches.
static PATTERNS: Lazy<Vec<(PiiKind, Regex)>> = Lazy::new(|| {
    vec![
        (
            PiiKind::Email,
            Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("Invalid regex"),
        ),
        (
            PiiKind::Ip,
            Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("Invalid regex"),
        ),
        (
            PiiKind::Card,
            Regex::new(r"\b(?:\d[ -]?){12,15}\d\b").expect("Invalid regex"),
        ),
        (
            PiiKind::Phone,
            Regex::new(r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{3}\)|\b\d{3})[\s.-]?\d{3}[\s.-]?\d{4}\b")
                .expect("Invalid regex"),
        ),
    ]
});

/// Regex-based masker
#[derive(Debug, Default, Clone)]
pub struct PatternMasker;

impl PatternMasker {
    pub fn new() -> Self {
        Self
    }

    /// Mask synchronously; matching runs on the original text so replacements
    /// are never re-scanned.
    pub fn mask_text(&self, text: &str, mode: PiiMode) -> String {
        let mut spans: Vec<(usize, usize, PiiKind)> = Vec::new();
        for (kind, re) in PATTERNS.iter() {
            for m in re.find_iter(text) {
                let overlaps = spans
                    .iter()
                    .any(|(start, end, _)| m.start() < *end && m.end() > *start);
                if !overlaps {
                    spans.push((m.start(), m.end(), *kind));
                }
            }
        }
        spans.sort_by_key(|(start, _, _)| *start);

        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for (start, end, kind) in spans {
            out.push_str(&text[cursor..start]);
            out.push_str(&replacement(kind, &text[start..end], mode));
            cursor = end;
        }
        out.push_str(&text[cursor..]);
        out
    }
}

fn replacement(kind: PiiKind, value: &str, mode: PiiMode) -> String {
    match mode {
        PiiMode::Placeholder => format!("[{}]", kind.label()),
        PiiMode::Pseudonymize => {
            let digest = format!("{:x}", Sha256::digest(value.as_bytes()));
            format!("<{}_{}>", kind.label(), &digest[..8])
        }
    }
}

#[async_trait]
impl Masker for PatternMasker {
    async fn mask(
        &self,
        text: &str,
        mode: PiiMode,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        Ok(self.mask_text(text, mode))
    }
}
