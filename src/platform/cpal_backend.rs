//! cpal implementation of the platform audio capabilities.
//!
//! Capture streams are opened on the requested input device at its native
//! configuration, folded to mono and published to a [`SampleBus`]. The
//! monitoring output runs the effect chain on the capture thread and hands the
//! result to the output callback through a lock-free ring buffer.

use anyhow::anyhow;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::{Arc, Mutex};

use super::{AudioPlatform, CaptureStream, DeviceInfo, DeviceKind, MonitorOutput, StreamFormat};
use crate::audio::{fold_to_mono, EffectChain, LinearResampler, SampleBus, SampleSink};
use crate::session::{AcquisitionError, TeardownError};

#[cfg(target_os = "linux")]
use std::fs::OpenOptions;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

/// Seconds of processed audio buffered between capture and output.
const MONITOR_BUFFER_SECS: f32 = 0.5;

/// Audio platform backed by the default cpal host.
#[derive(Default)]
pub struct CpalPlatform;

impl CpalPlatform {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl AudioPlatform for CpalPlatform {
    fn enumerate_devices(&self) -> anyhow::Result<Vec<DeviceInfo>> {
        suppress_alsa_warnings(|| {
            let host = cpal::default_host();
            let mut devices = Vec::new();

            let default_input = host.default_input_device().and_then(|d| d.name().ok());
            let inputs = host
                .input_devices()
                .map_err(|e| anyhow!("Failed to enumerate input devices: {e}"))?;
            for device in inputs {
                // Skip devices that cannot even report a name
                let Ok(name) = device.name() else { continue };
                devices.push(DeviceInfo {
                    is_default: default_input.as_deref() == Some(name.as_str()),
                    id: name.clone(),
                    label: name,
                    kind: DeviceKind::AudioInput,
                });
            }

            let default_output = host.default_output_device().and_then(|d| d.name().ok());
            let outputs = host
                .output_devices()
                .map_err(|e| anyhow!("Failed to enumerate output devices: {e}"))?;
            for device in outputs {
                let Ok(name) = device.name() else { continue };
                devices.push(DeviceInfo {
                    is_default: default_output.as_deref() == Some(name.as_str()),
                    id: name.clone(),
                    label: name,
                    kind: DeviceKind::AudioOutput,
                });
            }

            Ok(devices)
        })
    }

    async fn open_capture(
        &self,
        device_id: &str,
    ) -> Result<Box<dyn CaptureStream>, AcquisitionError> {
        let device = suppress_alsa_warnings(|| {
            let host = cpal::default_host();
            if device_id == "default" {
                host.default_input_device().ok_or_else(|| {
                    AcquisitionError::DeviceUnavailable("default input".to_string())
                })
            } else {
                find_input_device(&host, device_id)
            }
        })?;

        let label = device
            .name()
            .unwrap_or_else(|_| "Unknown device".to_string());
        tracing::info!("Recording device: {}", label);

        let device_config = device.default_input_config().map_err(|e| match e {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => {
                AcquisitionError::DeviceUnavailable(label.clone())
            }
            other => classify_backend_error(&label, &other.to_string()),
        })?;

        let format = StreamFormat {
            sample_rate: device_config.sample_rate().0,
            device_channels: device_config.channels(),
        };
        tracing::debug!(
            "Device configuration: {}Hz, {} channels, {:?}",
            format.sample_rate,
            format.device_channels,
            device_config.sample_format()
        );

        let bus = SampleBus::new();
        let config: cpal::StreamConfig = device_config.config();
        let stream = match device_config.sample_format() {
            cpal::SampleFormat::F32 => build_capture::<f32>(&device, &config, bus.clone()),
            cpal::SampleFormat::I16 => build_capture::<i16>(&device, &config, bus.clone()),
            cpal::SampleFormat::U16 => build_capture::<u16>(&device, &config, bus.clone()),
            other => {
                return Err(AcquisitionError::ConstraintUnsatisfiable(format!(
                    "unsupported sample format {other:?} on '{label}'"
                )))
            }
        }
        .map_err(|e| map_build_error(&label, e))?;

        stream.play().map_err(|e| match e {
            cpal::PlayStreamError::DeviceNotAvailable => {
                AcquisitionError::DeviceUnavailable(label.clone())
            }
            other => AcquisitionError::DeviceBusy(format!("{label}: {other}")),
        })?;
        tracing::debug!("Capture stream started");

        Ok(Box::new(CpalCapture {
            stream: Some(stream),
            bus,
            format,
            label,
        }))
    }

    fn open_monitor(
        &self,
        format: StreamFormat,
        chain: EffectChain,
    ) -> Result<Box<dyn MonitorOutput>, AcquisitionError> {
        let device = suppress_alsa_warnings(|| {
            cpal::default_host()
                .default_output_device()
                .ok_or_else(|| AcquisitionError::Graph("no output device for monitoring".to_string()))
        })?;
        let label = device
            .name()
            .unwrap_or_else(|_| "Unknown device".to_string());

        let output_config = device
            .default_output_config()
            .map_err(|e| AcquisitionError::Graph(format!("output '{label}': {e}")))?;
        let channels = output_config.channels();
        let sample_format = output_config.sample_format();

        // Prefer the capture rate; otherwise resample to the device default
        let output_rate = if supports_output_rate(&device, channels, sample_format, format.sample_rate) {
            format.sample_rate
        } else {
            output_config.sample_rate().0
        };
        let config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(output_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let capacity = ((output_rate as f32 * MONITOR_BUFFER_SECS) as usize).max(1024);
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_monitor::<f32>(&device, &config, consumer),
            cpal::SampleFormat::I16 => build_monitor::<i16>(&device, &config, consumer),
            cpal::SampleFormat::U16 => build_monitor::<u16>(&device, &config, consumer),
            other => {
                return Err(AcquisitionError::Graph(format!(
                    "unsupported output sample format {other:?}"
                )))
            }
        }
        .map_err(|e| AcquisitionError::Graph(format!("monitor on '{label}': {e}")))?;

        stream
            .play()
            .map_err(|e| AcquisitionError::Graph(format!("monitor on '{label}': {e}")))?;
        if output_rate == format.sample_rate {
            tracing::info!(
                "Monitoring on '{}' at {}Hz, {} channels",
                label,
                output_rate,
                channels
            );
        } else {
            tracing::info!(
                "Monitoring on '{}' at {}Hz, {} channels (resampled from {}Hz)",
                label,
                output_rate,
                channels,
                format.sample_rate
            );
        }

        Ok(Box::new(CpalMonitor {
            stream: Some(stream),
            feed: Arc::new(MonitorFeed {
                state: Mutex::new(FeedState {
                    chain,
                    resampler: LinearResampler::new(format.sample_rate, output_rate),
                    producer,
                    processed: Vec::new(),
                    resampled: Vec::new(),
                }),
            }),
        }))
    }
}

struct CpalCapture {
    stream: Option<cpal::Stream>,
    bus: SampleBus,
    format: StreamFormat,
    label: String,
}

impl CaptureStream for CpalCapture {
    fn label(&self) -> &str {
        &self.label
    }

    fn format(&self) -> StreamFormat {
        self.format
    }

    fn bus(&self) -> SampleBus {
        self.bus.clone()
    }

    fn stop_tracks(&mut self) -> Result<(), TeardownError> {
        let stream = self
            .stream
            .take()
            .ok_or(TeardownError::AlreadyClosed("capture stream"))?;
        self.bus.close();
        let paused = stream.pause();
        drop(stream);
        tracing::debug!("Capture stream stopped");
        paused.map_err(|e| TeardownError::Platform(e.to_string()))
    }
}

struct FeedState {
    chain: EffectChain,
    resampler: LinearResampler,
    producer: HeapProd<f32>,
    processed: Vec<f32>,
    resampled: Vec<f32>,
}

/// Capture-side end of the monitoring path.
struct MonitorFeed {
    state: Mutex<FeedState>,
}

impl SampleSink for MonitorFeed {
    fn accept(&self, samples: &[f32]) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let FeedState {
            chain,
            resampler,
            producer,
            processed,
            resampled,
        } = &mut *state;
        chain.process_block(samples, processed);
        resampler.process(processed, resampled);
        // Overflow is dropped: the output device is not keeping up
        producer.push_slice(resampled);
    }
}

struct CpalMonitor {
    stream: Option<cpal::Stream>,
    feed: Arc<MonitorFeed>,
}

impl MonitorOutput for CpalMonitor {
    fn input(&self) -> Arc<dyn SampleSink> {
        self.feed.clone()
    }

    fn close(&mut self) -> Result<(), TeardownError> {
        let stream = self
            .stream
            .take()
            .ok_or(TeardownError::AlreadyClosed("monitor"))?;
        let paused = stream.pause();
        drop(stream);
        tracing::debug!("Monitor output closed");
        paused.map_err(|e| TeardownError::Platform(e.to_string()))
    }
}

fn build_capture<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    bus: SampleBus,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let samples: Vec<f32> = data.iter().map(|&s| s.to_sample::<f32>()).collect();
            bus.publish(&fold_to_mono(&samples, channels));
        },
        |err| {
            tracing::error!("Audio stream error: {}", err);
        },
        None,
    )
}

fn build_monitor<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: HeapCons<f32>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            for frame in data.chunks_mut(channels.max(1)) {
                let value = T::from_sample(consumer.try_pop().unwrap_or(0.0));
                for out in frame.iter_mut() {
                    *out = value;
                }
            }
        },
        |err| {
            tracing::error!("Monitor stream error: {}", err);
        },
        None,
    )
}

/// Whether the output device accepts `rate` with the given channel count and
/// sample format.
fn supports_output_rate(
    device: &cpal::Device,
    channels: u16,
    sample_format: cpal::SampleFormat,
    rate: u32,
) -> bool {
    let Ok(mut configs) = device.supported_output_configs() else {
        return false;
    };
    configs.any(|range| {
        range.channels() == channels
            && range.sample_format() == sample_format
            && (range.min_sample_rate().0..=range.max_sample_rate().0).contains(&rate)
    })
}

fn map_build_error(label: &str, error: cpal::BuildStreamError) -> AcquisitionError {
    match error {
        cpal::BuildStreamError::DeviceNotAvailable => {
            AcquisitionError::DeviceUnavailable(label.to_string())
        }
        cpal::BuildStreamError::StreamConfigNotSupported
        | cpal::BuildStreamError::InvalidArgument => {
            AcquisitionError::ConstraintUnsatisfiable(format!("'{label}' rejected its own default configuration"))
        }
        other => classify_backend_error(label, &other.to_string()),
    }
}

/// Sorts free-form backend errors into the acquisition taxonomy.
fn classify_backend_error(label: &str, message: &str) -> AcquisitionError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not permitted") {
        AcquisitionError::PermissionDenied(format!("{label}: {message}"))
    } else if lower.contains("busy") || lower.contains("in use") {
        AcquisitionError::DeviceBusy(format!("{label}: {message}"))
    } else {
        AcquisitionError::DeviceUnavailable(format!("{label}: {message}"))
    }
}

/// Finds an input device by name or numeric index.
///
/// # Errors
/// - If no device with the specified name/index is found
fn find_input_device(
    host: &cpal::Host,
    device_spec: &str,
) -> Result<cpal::Device, AcquisitionError> {
    let mut devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| AcquisitionError::DeviceUnavailable(format!("enumeration failed: {e}")))?
        .collect();

    if let Some(pos) = devices
        .iter()
        .position(|d| d.name().is_ok_and(|name| name == device_spec))
    {
        return Ok(devices.swap_remove(pos));
    }

    if let Ok(index) = device_spec.parse::<usize>() {
        let count = devices.len();
        return devices.into_iter().nth(index).ok_or_else(|| {
            AcquisitionError::ConstraintUnsatisfiable(format!(
                "device index {} is out of range (0-{})",
                index,
                count.saturating_sub(1)
            ))
        });
    }

    Err(AcquisitionError::ConstraintUnsatisfiable(format!(
        "audio input device '{device_spec}' not found. Use 'micmon list-devices' to see available devices."
    )))
}

/// Temporarily redirects stderr to /dev/null to suppress ALSA library warnings on Linux.
/// On non-Linux platforms, this is a no-op since ALSA doesn't exist.
#[cfg(target_os = "linux")]
pub(crate) fn suppress_alsa_warnings<F, T, E>(f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
{
    let Ok(dev_null) = OpenOptions::new().write(true).open("/dev/null") else {
        return f();
    };
    let dev_null_fd = dev_null.as_raw_fd();

    // Save the current stderr file descriptor
    let old_stderr = unsafe { libc::dup(libc::STDERR_FILENO) };
    if old_stderr == -1 {
        return f();
    }

    if unsafe { libc::dup2(dev_null_fd, libc::STDERR_FILENO) } == -1 {
        unsafe { libc::close(old_stderr) };
        return f();
    }

    let result = f();

    // Restore the original stderr
    unsafe {
        libc::dup2(old_stderr, libc::STDERR_FILENO);
        libc::close(old_stderr);
    }

    result
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn suppress_alsa_warnings<F, T, E>(f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
{
    f()
}
