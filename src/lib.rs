//! Library surface shared between the `--daemon` scheduler loop and the
//! short-lived reader processes (banner/TUI/prompt segment) that consume
//! the cache this daemon writes. See `SPEC_FULL.md` for the full contract.

pub mod adapters;
pub mod cache;
pub mod cli;
pub mod collector;
pub mod config;
pub mod daemon;
pub mod error;
pub mod model;
pub mod reader;
pub mod registry;
pub mod scheduler;
pub mod utils;
