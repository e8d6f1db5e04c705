//! # vw-core
//!
//! Core crate for the VWAP feed system, providing:
//!
//! - **Types** (`types`) — instrument identifiers and trade records
//! - **Window** (`window`) — fixed-capacity, overwrite-oldest ring buffer
//! - **VWAP** (`vwap`) — incremental volume-weighted average over a window
//! - **Configuration** (`config`) — JSON config deserialization
//! - **Error types** (`error`) — domain-specific errors via thiserror
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod types;
pub mod vwap;
pub mod window;

// Re-export types at crate root for convenience.
pub use types::*;
