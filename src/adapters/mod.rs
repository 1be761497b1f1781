//! Per-source adapters (SPEC_FULL §4.2): translate configuration into wire
//! requests, parse responses against an explicit schema, classify
//! failures, and emit the canonical record. Each submodule corresponds to
//! one `CollectedData` variant.

pub mod billing;
pub mod claude_usage;
pub mod infra;
pub mod kubernetes;
pub mod sysmetrics;
pub mod tailscale;
