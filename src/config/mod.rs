//! Configuration management
//!
//! Storage locations and mining difficulty, taken from the environment.

pub mod settings;

pub use settings::{Config, GLOBAL_CONFIG};
