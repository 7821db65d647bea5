#![deny(missing_docs)]
//! Telegram video relay.
//!
//! Watches a Telegram channel for video posts, stages them locally under
//! sequential file names and relays them one at a time to object storage or
//! a Graph page, pacing uploads to the destination's rate limits.

/// Telegram front end: commands, status messages, dispatcher endpoints
pub mod bot;
/// Configuration and settings management
pub mod config;
/// Upload destinations
pub mod destination;
/// Log output setup with secret redaction
pub mod logging;
/// Sequential relay pipeline: renamer, queue, live and batch runs
pub mod relay;
/// Process entrypoint wiring settings, destination and dispatcher
pub mod runner;
/// Video sources and the batch history fetcher
pub mod source;
/// Fakes and fixtures for tests
pub mod testing;
/// Utility functions
pub mod utils;
