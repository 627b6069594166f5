//! Configuration management for linkwatch.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables
//! - JSON settings file (lowest priority)

mod settings;

pub use settings::Config;
