// src/config/mod.rs

//! Optional TOML configuration for hosts embedding the engine.
//!
//! - [`model`] holds the serde data model.
//! - [`loader`] reads and validates a file or string.

pub mod loader;
pub mod model;

pub use loader::{load_from_path, parse_str};
pub use model::{EngineConfig, LogLevel, LoggingSection, QueueSection};
