// SPDX-License-Identifier: MIT

//! State management for conversational sessions
//!
//! This module provides:
//! - `Channel` - the registry of the six state channels and their merge rules
//! - `State` - the strongly-typed session state built from those channels
//! - `PartialUpdate` - a node's proposal, merged by the reducer

mod channels;
mod schema;
mod update;

pub use channels::{
    message_id, normalize_key, FactRecord, MemorySnapshot, Message, ProfileRecord,
    RetrievedContext, Role, State, SummaryRecord, TraceEntry,
};
pub use schema::{Channel, MergeRule};
pub use update::{FactProposal, PartialUpdate};
