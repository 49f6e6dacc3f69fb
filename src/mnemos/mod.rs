// SPDX-License-Identifier: MIT

pub mod checkpoint;
pub mod config;
pub mod executor;
pub mod metrics;
pub mod nodes;
pub mod policy;
pub mod reducer;
pub mod router;
pub mod server;
pub mod session;
pub mod state;
