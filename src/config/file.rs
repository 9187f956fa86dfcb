//! Configuration file management for micmon.
//!
//! This module handles loading and saving application configuration from TOML files.
//! Configuration is stored in the user's config directory.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::audio::analyser::is_valid_fft_size;

/// Visualization type for the recording display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationType {
    /// Time-domain amplitude trace
    #[default]
    Waveform,
    /// Frequency spectrum of the analysed window
    Spectrum,
}

impl std::fmt::Display for VisualizationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waveform => write!(f, "waveform"),
            Self::Spectrum => write!(f, "spectrum"),
        }
    }
}

/// Audio capture and analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioConfig {
    /// Audio device to use. Options:
    /// - "default" for system default device
    /// - numeric index (0, 1, 2, etc.) from `micmon list-devices`
    /// - device name from `micmon list-devices`
    #[serde(default = "default_device")]
    pub device: String,
    /// Analysis resolution: number of samples in each waveform snapshot
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            fft_size: default_fft_size(),
        }
    }
}

fn default_device() -> String {
    "default".to_string()
}

fn default_fft_size() -> usize {
    2048
}

/// Monitoring effects configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectsConfig {
    /// Route the processed input to the output device while recording
    #[serde(default = "default_true")]
    pub monitor: bool,
    /// Output level of the monitoring mix (0.0-1.0)
    #[serde(default = "default_monitor_gain")]
    pub monitor_gain: f32,
    #[serde(default = "default_lowpass_cutoff_hz")]
    pub lowpass_cutoff_hz: f32,
    #[serde(default = "default_lowpass_q")]
    pub lowpass_q: f32,
    /// Time for the reverb tail to fall by 60 dB
    #[serde(default = "default_reverb_decay_secs")]
    pub reverb_decay_secs: f32,
    #[serde(default = "default_reverb_pre_delay_secs")]
    pub reverb_pre_delay_secs: f32,
    /// Reverb level in the mix (0.0-1.0)
    #[serde(default = "default_reverb_wet")]
    pub reverb_wet: f32,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            monitor: true,
            monitor_gain: default_monitor_gain(),
            lowpass_cutoff_hz: default_lowpass_cutoff_hz(),
            lowpass_q: default_lowpass_q(),
            reverb_decay_secs: default_reverb_decay_secs(),
            reverb_pre_delay_secs: default_reverb_pre_delay_secs(),
            reverb_wet: default_reverb_wet(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_monitor_gain() -> f32 {
    0.35
}

fn default_lowpass_cutoff_hz() -> f32 {
    1500.0
}

fn default_lowpass_q() -> f32 {
    0.707
}

fn default_reverb_decay_secs() -> f32 {
    1.5
}

fn default_reverb_pre_delay_secs() -> f32 {
    0.01
}

fn default_reverb_wet() -> f32 {
    0.5
}

/// Display configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplayConfig {
    #[serde(default)]
    pub visualization: VisualizationType,
    /// Waveform redraws per second
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            visualization: VisualizationType::default(),
            frame_rate: default_frame_rate(),
        }
    }
}

fn default_frame_rate() -> u32 {
    60
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MicmonConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub effects: EffectsConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

impl MicmonConfig {
    /// Loads configuration from the user's config directory.
    ///
    /// # Errors
    /// - If the config directory cannot be determined
    /// - If the config file cannot be read
    /// - If the TOML is malformed or values are out of range
    pub fn load() -> anyhow::Result<Self> {
        let config_path = get_config_path()?;
        let config_content = fs::read_to_string(&config_path)
            .map_err(|e| anyhow!("Failed to read {}: {e}", config_path.display()))?;
        Self::from_toml(&config_content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: MicmonConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to the user's config directory.
    ///
    /// # Errors
    /// - If the config directory cannot be determined or created
    /// - If the file cannot be written
    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = get_config_path()?;
        let config_content = toml::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        tracing::info!("Configuration saved");
        Ok(())
    }

    /// Checks that every value is within the range the audio graph accepts.
    ///
    /// # Errors
    /// - Names the first offending key
    pub fn validate(&self) -> anyhow::Result<()> {
        if !is_valid_fft_size(self.audio.fft_size) {
            return Err(anyhow!(
                "audio.fft_size must be a power of two between 32 and 32768, got {}",
                self.audio.fft_size
            ));
        }
        if !(0.0..=1.0).contains(&self.effects.monitor_gain) {
            return Err(anyhow!(
                "effects.monitor_gain must be between 0.0 and 1.0, got {}",
                self.effects.monitor_gain
            ));
        }
        if self.effects.lowpass_cutoff_hz <= 0.0 {
            return Err(anyhow!("effects.lowpass_cutoff_hz must be positive"));
        }
        if self.effects.lowpass_q <= 0.0 {
            return Err(anyhow!("effects.lowpass_q must be positive"));
        }
        if self.effects.reverb_decay_secs <= 0.0 {
            return Err(anyhow!("effects.reverb_decay_secs must be positive"));
        }
        if self.effects.reverb_pre_delay_secs < 0.0 {
            return Err(anyhow!("effects.reverb_pre_delay_secs cannot be negative"));
        }
        if !(0.0..=1.0).contains(&self.effects.reverb_wet) {
            return Err(anyhow!(
                "effects.reverb_wet must be between 0.0 and 1.0, got {}",
                self.effects.reverb_wet
            ));
        }
        if self.display.frame_rate == 0 || self.display.frame_rate > 240 {
            return Err(anyhow!(
                "display.frame_rate must be between 1 and 240, got {}",
                self.display.frame_rate
            ));
        }
        Ok(())
    }
}

/// Retrieves the path to the config file, creating its directory if needed.
///
/// # Errors
/// - If the home directory cannot be determined
/// - If the config directory cannot be created
pub fn get_config_path() -> anyhow::Result<PathBuf> {
    let config_dir = dirs::home_dir()
        .ok_or_else(|| anyhow!("Could not determine home directory"))?
        .join(".config")
        .join("micmon");

    fs::create_dir_all(&config_dir)
        .map_err(|e| anyhow!("Failed to create config directory: {e}"))?;

    Ok(config_dir.join("micmon.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = MicmonConfig::from_toml("").unwrap();
        assert_eq!(config, MicmonConfig::default());
        assert_eq!(config.audio.fft_size, 2048);
        assert_eq!(config.effects.lowpass_cutoff_hz, 1500.0);
        assert_eq!(config.effects.reverb_decay_secs, 1.5);
        assert_eq!(config.display.visualization, VisualizationType::Waveform);
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let config = MicmonConfig::from_toml(
            r#"
            [audio]
            device = "1"

            [display]
            visualization = "spectrum"
            "#,
        )
        .unwrap();
        assert_eq!(config.audio.device, "1");
        assert_eq!(config.audio.fft_size, 2048);
        assert_eq!(config.display.visualization, VisualizationType::Spectrum);
        assert_eq!(config.display.frame_rate, 60);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(MicmonConfig::from_toml("[audio]\nfft_size = 1000").is_err());
        assert!(MicmonConfig::from_toml("[effects]\nmonitor_gain = 1.5").is_err());
        assert!(MicmonConfig::from_toml("[effects]\nreverb_decay_secs = 0.0").is_err());
        assert!(MicmonConfig::from_toml("[display]\nframe_rate = 0").is_err());
        assert!(MicmonConfig::from_toml("[display]\nvisualization = \"bars\"").is_err());
    }

    #[test]
    fn test_defaults_survive_toml_round_trip() {
        let text = toml::to_string_pretty(&MicmonConfig::default()).unwrap();
        assert_eq!(MicmonConfig::from_toml(&text).unwrap(), MicmonConfig::default());
    }
}
