//! Configuration management for micmon.
//!
//! Handles loading and saving the TOML configuration file that controls the
//! input device, analysis resolution, monitoring effects and display.

pub mod file;

pub use file::{
    get_config_path, AudioConfig, DisplayConfig, EffectsConfig, MicmonConfig, VisualizationType,
};
