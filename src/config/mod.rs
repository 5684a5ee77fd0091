// src/config/mod.rs

//! Configuration loading and validation for rulereload.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load an optional settings file and merge CLI/env overrides (`loader.rs`).
//! - Validate and resolve it into typed [`Settings`] (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_from_path, load_settings};
pub use model::{
    AgentSection, Overrides, RawSettings, Settings, ValidatorSection, ValidatorSettings,
    WatchSection,
};
pub use validate::parse_duration;
