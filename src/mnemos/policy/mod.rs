// SPDX-License-Identifier: MIT

//! Memory strategy policies: trimming, summary compaction, fact extraction
//! and the hybrid retrieval trigger. Everything here is pure.

pub mod compaction;
pub mod extraction;
pub mod trigger;
pub mod trim;

pub use compaction::{fold_summary, render_transcript};
pub use extraction::{parse_facts, ExtractedFact};
pub use trigger::{normalize_text, RetrievalTrigger, DEFAULT_TRIGGER_PHRASES};
pub use trim::{
    estimate_tokens, total_tokens, trim_to_token_budget, trim_to_turn_limit, RetentionPolicy,
    TokenEstimator, TrimOutcome,
};
