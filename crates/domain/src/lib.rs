//! Shared types for CodeRelay: configuration, the crate-wide error type and
//! structured trace events.

pub mod config;
pub mod error;
pub mod trace;
