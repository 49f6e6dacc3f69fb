// SPDX-License-Identifier: MIT

//! mnemos-rs: a deterministic multi-channel state reducer and memory engine
//! for turn-based conversational agents.
//!
//! - [`adk`] - capabilities consumed by the engine (generation, masking,
//!   retrieval) and the error taxonomy
//! - [`mnemos`] - state channels, reducer, memory policies, nodes, router,
//!   turn executor, checkpoints, configuration and the HTTP surface

pub mod adk;
pub mod mnemos;
