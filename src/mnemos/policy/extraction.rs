// SPDX-License-Identifier: MIT

//! Parsing of fact-extraction output
//!
//! The extractor is asked for a JSON array of `{key, value, category}`
//! objects. Models wrap JSON in fences or prose often enough that the block
//! is located before parsing.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::mnemos::state::normalize_key;

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").expect("Invalid regex"));

pub const DEFAULT_CATEGORY: &str = "general";

/// One extracted `(key, value, category)` triple, key normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFact {
    pub key: String,
    pub value: String,
    pub category: String,
}

#[derive(Debug, Deserialize)]
struct RawFact {
    key: Option<String>,
    value: Option<Value>,
    category: Option<String>,
}

/// Locate the JSON payload in model output
pub fn extract_json_block(response: &str) -> &str {
    if let Some(block) = FENCED_BLOCK.captures(response).and_then(|c| c.get(1)) {
        return block.as_str();
    }
    let bounds = [('[', ']'), ('{', '}')]
        .iter()
        .filter_map(|(open, close)| {
            let start = response.find(*open)?;
            let end = response.rfind(*close)?;
            (start < end).then_some((start, end))
        })
        .min_by_key(|(start, _)| *start);
    match bounds {
        Some((start, end)) => &response[start..=end],
        None => response.trim(),
    }
}

/// Parse extractor output into facts.
///
/// Empty output, `NONE` and `[]` mean no facts. Entries with a blank key or
/// value are skipped. Anything that is not a JSON array (or an object with a
/// `facts` array) is an error the caller decides how to surface.
pub fn parse_facts(response: &str) -> Result<Vec<ExtractedFact>, String> {
    let trimmed = response.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(Vec::new());
    }

    let payload = extract_json_block(trimmed);
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| format!("Failed to parse extraction output as JSON: {e}"))?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("facts") {
            Some(Value::Array(items)) => items,
            _ => return Err("Extraction output object has no 'facts' array".to_string()),
        },
        other => return Err(format!("Unexpected extraction output: {other}")),
    };

    let mut facts = Vec::new();
    for item in items {
        let raw: RawFact = match serde_json::from_value(item) {
            Ok(raw) => raw,
            Err(e) => {
                log::debug!("Skipping malformed fact entry: {}", e);
                continue;
            }
        };
        let key = normalize_key(raw.key.as_deref().unwrap_or_default());
        let value = match raw.value {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        if key.is_empty() || value.is_empty() {
            continue;
        }
        let category = raw
            .category
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
        facts.push(ExtractedFact {
            key,
            value,
            category,
        });
    }
    Ok(facts)
}
