//! Platform audio capabilities consumed by the session controller.
//!
//! The controller never talks to an audio backend directly: device
//! enumeration, capture acquisition and the monitoring output are reached
//! through [`AudioPlatform`], which the application wires to cpal and tests
//! replace with a scripted fake.

pub mod cpal_backend;

use async_trait::async_trait;
use std::sync::Arc;

use crate::audio::{EffectChain, SampleBus, SampleSink};
use crate::session::{AcquisitionError, TeardownError};

pub use cpal_backend::CpalPlatform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    AudioInput,
    AudioOutput,
}

/// One entry of the platform's device list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
    pub kind: DeviceKind,
    pub is_default: bool,
}

/// Format of the mono signal a capture stream publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    /// Channel count of the device before folding to mono
    pub device_channels: u16,
}

/// A live capture feed from one input device.
pub trait CaptureStream {
    fn label(&self) -> &str;
    fn format(&self) -> StreamFormat;
    /// The fan-out point other nodes connect to.
    fn bus(&self) -> SampleBus;
    /// Stops every track of the stream and closes its bus.
    fn stop_tracks(&mut self) -> Result<(), TeardownError>;
}

/// The monitoring source: plays processed input on the output device.
pub trait MonitorOutput {
    /// Sink to connect to the capture bus.
    fn input(&self) -> Arc<dyn SampleSink>;
    fn close(&mut self) -> Result<(), TeardownError>;
}

#[async_trait(?Send)]
pub trait AudioPlatform {
    fn enumerate_devices(&self) -> anyhow::Result<Vec<DeviceInfo>>;

    /// Requests a capture stream constrained to exactly `device_id`.
    ///
    /// This is the only suspend point of session start-up; it may wait for
    /// the platform to grant access to the device.
    async fn open_capture(&self, device_id: &str)
        -> Result<Box<dyn CaptureStream>, AcquisitionError>;

    /// Opens the output device and plays `chain`'s output for whatever is
    /// fed into the returned monitor's input.
    fn open_monitor(
        &self,
        format: StreamFormat,
        chain: EffectChain,
    ) -> Result<Box<dyn MonitorOutput>, AcquisitionError>;
}

/// Takes the input-device snapshot shown to the user.
///
/// Devices without a label are named `Microphone N` by their position.
///
/// # Errors
/// - If the platform cannot enumerate devices
pub fn snapshot_input_devices(platform: &dyn AudioPlatform) -> anyhow::Result<Vec<DeviceInfo>> {
    let inputs = platform
        .enumerate_devices()?
        .into_iter()
        .filter(|d| d.kind == DeviceKind::AudioInput)
        .enumerate()
        .map(|(index, mut device)| {
            if device.label.trim().is_empty() {
                device.label = format!("Microphone {}", index + 1);
            }
            device
        })
        .collect();
    Ok(inputs)
}

/// Picks the list position matching a configured device spec.
///
/// The spec is "default", a numeric index or a device id. Falls back to the
/// platform default, then to the first entry.
pub fn resolve_selection(devices: &[DeviceInfo], spec: &str) -> usize {
    let default_pos = devices.iter().position(|d| d.is_default).unwrap_or(0);
    if spec == "default" {
        return default_pos;
    }
    if let Ok(index) = spec.parse::<usize>() {
        if index < devices.len() {
            return index;
        }
    }
    devices
        .iter()
        .position(|d| d.id == spec)
        .unwrap_or_else(|| {
            tracing::warn!("Configured device '{}' not found, using default", spec);
            default_pos
        })
}
