//! Core domain + dialogue logic for the datachat assistant.
//!
//! This crate is intentionally front-end agnostic. Rendering lives behind the
//! `SessionObserver` port and timing behind the `Scheduler` port, both
//! implemented by the caller (or by the helpers shipped here).

pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod events;
pub mod intent;
pub mod logging;
pub mod scheduler;
pub mod transcript;

pub use errors::{Error, Result};
