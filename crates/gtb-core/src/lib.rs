//! Core domain + application logic for the goal-tracker Telegram bot.
//!
//! This crate is intentionally I/O-free. The Telegram HTTP client and the
//! SQLite store live behind ports (traits) implemented in adapter crates,
//! so the dialogue state machine and the polling loop are testable without
//! a network or a database.

pub mod config;
pub mod dialogue;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod poller;
pub mod ports;

pub use errors::{Error, Result};
