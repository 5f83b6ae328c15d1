//! CLI command implementations.

pub mod common;
pub mod config;
pub mod prewarm;
pub mod resolve;
pub mod serve;
