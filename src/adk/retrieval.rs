// SPDX-License-Identifier: MIT

//! Retrieval capability
//!
//! Retrieval is consumed as an opaque capability returning a context blob.
//! [`StateRetriever`] is the built-in implementation: naive keyword overlap
//! over the session's own facts, summary and messages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;

use crate::mnemos::state::State;

/// Context blob returned by a retriever
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub content: String,
    pub hits: usize,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self {
            content: String::new(),
            hits: 0,
        }
    }
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        session_id: &str,
        query: &str,
        snapshot: &State,
    ) -> Result<RetrievalResult, Box<dyn Error + Send + Sync>>;
}

const STOPWORDS: &[&str] = &[
    "the", "and", "you", "your", "what", "was", "did", "does", "that", "this", "for", "are",
    "about", "remember", "recall", "earlier", "before", "said", "tell", "told", "can", "how",
];

/// Lowercased keywords of a query, deduplicated and sorted
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.chars().count() > 2)
        .map(|s| s.to_lowercase())
        .filter(|s| !STOPWORDS.contains(&s.as_str()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Number of keywords present in the text
pub fn relevance(text: &str, keywords: &[String]) -> usize {
    let text = text.to_lowercase();
    keywords.iter().filter(|kw| text.contains(kw.as_str())).count()
}

/// Keyword search over the session state
#[derive(Debug, Clone)]
pub struct StateRetriever {
    limit: usize,
}

impl Default for StateRetriever {
    fn default() -> Self {
        Self::new(5)
    }
}

impl StateRetriever {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    fn candidates(snapshot: &State) -> Vec<String> {
        let mut out: Vec<String> = snapshot
            .facts
            .iter()
            .map(|(key, fact)| format!("fact {}: {} ({})", key, fact.value, fact.category))
            .collect();
        if let Some(summary) = &snapshot.summary {
            out.push(format!("summary: {}", summary.text));
        }
        out.extend(
            snapshot
                .messages
                .iter()
                // messages of the in-flight turn would only match the query itself
                .filter(|m| !m.is_system() && m.turn <= snapshot.turn)
                .map(|m| format!("{} (turn {}): {}", m.role, m.turn, m.content)),
        );
        out
    }

    /// Deterministic ranking: more keyword hits first, then text order
    pub fn search(&self, query: &str, snapshot: &State) -> RetrievalResult {
        let keywords = tokenize(query);
        if keywords.is_empty() {
            return RetrievalResult::empty();
        }
        let mut scored: Vec<(usize, String)> = Self::candidates(snapshot)
            .into_iter()
            .map(|text| (relevance(&text, &keywords), text))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        scored.dedup_by(|a, b| a.1 == b.1);
        scored.truncate(self.limit);

        RetrievalResult {
            hits: scored.len(),
            content: scored
                .into_iter()
                .map(|(_, text)| text)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[async_trait]
impl Retriever for StateRetriever {
    async fn retrieve(
        &self,
        session_id: &str,
        query: &str,
        snapshot: &State,
    ) -> Result<RetrievalResult, Box<dyn Error + Send + Sync>> {
        let result = self.search(query, snapshot);
        log::debug!(
            "[{}] Retrieved {} hits for query {:?}",
            session_id,
            result.hits,
            query
        );
        Ok(result)
    }
}
