//! Linkwatch Library
//!
//! Media pipeline service: watches a directory tree, including every
//! directory reachable through symbolic links, queues new files and submits
//! them to a remote job service.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod config;
pub mod error;
pub mod jobs;
pub mod observability;
mod paths;
pub mod queue;
pub mod storage;
pub mod watcher;

pub use app::App;
pub use config::Config;
pub use error::{Error, Result};
