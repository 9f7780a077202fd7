//! Shared primitives for the postrider delivery agent.
//!
//! This crate holds the pieces every other member depends on: the shutdown
//! [`Signal`], the injectable [`Clock`], the environment-derived [`Config`],
//! and the process-wide logging facade with its reloadable level filter.

pub mod clock;
pub mod config;
pub mod logging;

pub use clock::{Clock, SystemClock};
pub use config::{Config, LogLevel, parse_cutoff};

/// Control message broadcast to every long-running task.
///
/// A single `Shutdown` is sent when the process receives SIGINT or SIGTERM;
/// each task exits at its next cooperative suspension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
