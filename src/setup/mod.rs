//! First-run setup.
//!
//! Writes a commented default configuration file when none exists yet.

use std::path::Path;

use crate::config::{get_config_path, MicmonConfig};

const CONFIG_HEADER: &str = "\
# micmon configuration
#
# [audio] device: \"default\", an index or a name from `micmon list-devices`
# [audio] fft_size: power of two between 32 and 32768
# [display] visualization: \"waveform\" or \"spectrum\"
";

/// Creates the default config file if it is missing.
///
/// Returns `true` if a file was written.
///
/// # Errors
/// - If the config directory cannot be determined or created
/// - If the file cannot be written
pub fn run_setup() -> anyhow::Result<bool> {
    let config_path = get_config_path()?;
    if config_path.exists() {
        tracing::debug!("Config file present at {}", config_path.display());
        return Ok(false);
    }

    write_default_config(&config_path)?;
    tracing::info!("Default configuration written to {}", config_path.display());
    Ok(true)
}

fn write_default_config(path: &Path) -> anyhow::Result<()> {
    std::fs::write(path, default_config_text()?)?;
    Ok(())
}

fn default_config_text() -> anyhow::Result<String> {
    let body = toml::to_string_pretty(&MicmonConfig::default())?;
    Ok(format!("{CONFIG_HEADER}\n{body}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_text_parses_back_to_defaults() {
        let text = default_config_text().unwrap();
        assert!(text.starts_with("# micmon configuration"));
        assert_eq!(MicmonConfig::from_toml(&text).unwrap(), MicmonConfig::default());
    }
}
