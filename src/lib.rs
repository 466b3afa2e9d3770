//! presswright: recurring content production.
//!
//! Pulls due work items, grounds them in web research, drafts and
//! self-critiques until a quality bar or iteration budget is reached, and
//! hands the result to a pluggable publisher.

pub mod anthropic;
pub mod cancel;
pub mod config;
pub mod content;
pub mod error;
pub mod logging;
pub mod media;
pub mod orchestrator;
pub mod plugins;
pub mod refine;
pub mod registry;
pub mod research;
pub mod retry;
pub mod services;
pub mod state_machine;
pub mod store;
pub mod ui;
pub mod validation;

pub use error::{ErrorKind, PressError, Result};
