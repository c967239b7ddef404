//! Test schedule execution engine
//!
//! Dispatches schedule entries, each bound to its own guest, serially or
//! in parallel; runs each entry's tasks through an external harness under
//! an isolation policy; and rolls the entries' outcomes into one overall
//! result, optionally overridden by user rules.

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod guest;
pub mod harness;
pub mod models;
pub mod output;
pub mod results;
pub mod utils;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
