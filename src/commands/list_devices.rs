//! List available audio devices.

use crate::platform::{snapshot_input_devices, AudioPlatform, CpalPlatform, DeviceKind};

/// Lists the input devices a recording can use, plus the output devices.
///
/// # Errors
/// - If the audio host cannot enumerate devices
pub fn handle_list_devices() -> Result<(), anyhow::Error> {
    let platform = CpalPlatform::new();
    let inputs = snapshot_input_devices(&platform)?;

    if inputs.is_empty() {
        println!("No audio input devices found on this system.");
        return Ok(());
    }

    println!();
    println!("Available audio input devices:");
    println!();

    for (index, device) in inputs.iter().enumerate() {
        let default_indicator = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  ID: {index}");
        println!("    Name: {}{}", device.label, default_indicator);
        println!();
    }

    let outputs: Vec<_> = platform
        .enumerate_devices()?
        .into_iter()
        .filter(|d| d.kind == DeviceKind::AudioOutput)
        .collect();
    if !outputs.is_empty() {
        println!("Monitoring plays on the default output device:");
        println!();
        for device in outputs {
            let default_indicator = if device.is_default { " [DEFAULT]" } else { "" };
            println!("    {}{}", device.label, default_indicator);
        }
        println!();
    }

    println!("Set [audio] device in micmon.toml to an ID or a name, or pass --device.");
    Ok(())
}
