//! `toolpipe` crate (library surface).
//!
//! The primary entrypoint for end users is the `toolpipe` binary (CLI + MCP stdio).
//! This library target re-exports the core types so embedders don't depend on the internal
//! crate layout.

pub use toolpipe_core as core;
