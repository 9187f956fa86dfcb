//! Microphone recording with live visualization and monitoring.
//!
//! Runs the recorder screen: the user picks an input device, starts and stops
//! sessions, and watches the live trace. SIGUSR1 toggles recording so the
//! recorder can be driven from a hotkey daemon.

use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::MicmonConfig;
use crate::platform::{resolve_selection, snapshot_input_devices, CpalPlatform};
use crate::render::{TraceCanvas, WaveformRenderer};
use crate::session::{format_time, SessionController, SessionSettings, StartOutcome, Teardown};
use crate::ui::{ErrorScreen, MicmonTui, PanelView, RecorderCommand};

/// Handles the recorder screen.
///
/// `device_override` takes precedence over the configured device.
///
/// # Errors
/// - If the configuration is invalid
/// - If no input device is available
/// - If the terminal cannot be driven
pub async fn handle_record(device_override: Option<String>) -> Result<(), anyhow::Error> {
    tracing::info!("=== micmon recorder started ===");

    let config = match MicmonConfig::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Failed to load configuration: {err}");
            show_error(&format!(
                "Configuration Error:\n\n{err}\n\nPlease check your ~/.config/micmon/micmon.toml file and try again."
            ))?;
            return Err(anyhow::anyhow!("Configuration error: {err}"));
        }
    };

    tracing::info!(
        "Configuration loaded: device={}, fft_size={}, monitor={}, visualization={}",
        config.audio.device,
        config.audio.fft_size,
        config.effects.monitor,
        config.display.visualization
    );

    let platform = CpalPlatform::new();
    let devices = snapshot_input_devices(&platform)?;
    if devices.is_empty() {
        tracing::error!("No audio input devices found");
        show_error("Recording Error:\n\nNo audio input devices found on this system.")?;
        return Err(anyhow::anyhow!("No audio input devices found"));
    }
    let device_spec = device_override.unwrap_or_else(|| config.audio.device.clone());
    let selected = resolve_selection(&devices, &device_spec);
    tracing::info!(
        "{} input devices, '{}' preselected",
        devices.len(),
        devices[selected].label
    );

    let panel = PanelView::default();
    let mut controller = SessionController::new(
        Box::new(platform),
        Arc::new(panel.clone()),
        SessionSettings::from(&config),
    );

    let canvas = TraceCanvas::default();
    let render_loop = WaveformRenderer::new(controller.analyser_handle(), config.display.visualization)
        .start(canvas.clone(), config.display.frame_rate);

    let mut tui = MicmonTui::new(devices, selected, canvas, panel)
        .map_err(|e| anyhow::anyhow!("Failed to initialize UI: {e}"))?;

    let toggle = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGUSR1, toggle.clone())
        .map_err(|e| anyhow::anyhow!("Failed to register signal handler: {e}"))?;

    let frame_period = Duration::from_secs_f64(1.0 / config.display.frame_rate as f64);
    let result = run_event_loop(&mut tui, &mut controller, &toggle, frame_period).await;

    controller.dispose();
    render_loop.stop();
    tui.cleanup()
        .map_err(|e| anyhow::anyhow!("Cleanup failed: {e}"))?;

    tracing::info!("=== micmon recorder exited ===");
    result
}

async fn run_event_loop(
    tui: &mut MicmonTui,
    controller: &mut SessionController,
    toggle: &AtomicBool,
    frame_period: Duration,
) -> anyhow::Result<()> {
    loop {
        if toggle.swap(false, Ordering::Relaxed) {
            tracing::info!("Received SIGUSR1: toggling recording");
            if controller.is_active() {
                stop_session(tui, controller);
            } else {
                start_session(tui, controller).await;
            }
        }

        let command = tui
            .handle_input(frame_period)
            .map_err(|e| anyhow::anyhow!("Input handling error: {e}"))?;

        match command {
            RecorderCommand::Continue => {}
            // The device choice is fixed while a session runs
            RecorderCommand::SelectPrevious if !controller.is_active() => tui.select_previous(),
            RecorderCommand::SelectNext if !controller.is_active() => tui.select_next(),
            RecorderCommand::SelectPrevious | RecorderCommand::SelectNext => {}
            RecorderCommand::Start => start_session(tui, controller).await,
            RecorderCommand::Stop => stop_session(tui, controller),
            RecorderCommand::Quit => return Ok(()),
        }

        tui.render()
            .map_err(|e| anyhow::anyhow!("Render failed: {e}"))?;
    }
}

async fn start_session(tui: &mut MicmonTui, controller: &mut SessionController) {
    if controller.is_active() {
        tracing::debug!("Start requested while recording; ignored");
        return;
    }
    let Some(device) = tui.selected_device() else {
        tui.set_status(Some("No input device selected".to_string()));
        return;
    };
    let (device_id, label) = (device.id.clone(), device.label.clone());

    tui.set_status(Some(format!("Opening {label}...")));
    if let Err(e) = tui.render() {
        tracing::warn!("Render failed: {e}");
    }

    let outcome = controller.start(&device_id).await;
    if let StartOutcome::Failed { teardown, .. } = &outcome {
        tracing::debug!("Start rolled back: {:?}", teardown);
    }
    tui.set_status(status_after_start(&outcome));
}

/// Status line after a start request; only failures leave a message.
fn status_after_start(outcome: &StartOutcome) -> Option<String> {
    match outcome {
        StartOutcome::Started | StartOutcome::AlreadyActive => None,
        StartOutcome::Failed { error, .. } => Some(format!("Could not start recording: {error}")),
    }
}

fn stop_session(tui: &mut MicmonTui, controller: &mut SessionController) {
    let started_at = controller.started_at();
    match controller.stop() {
        Teardown::NothingToRelease => {}
        Teardown::Released { failures: 0 } => {
            tui.set_status(Some(stopped_status(controller.elapsed_seconds(), started_at)))
        }
        Teardown::Released { failures } => tui.set_status(Some(format!(
            "Recording stopped; {failures} resources failed to close (see `micmon logs`)"
        ))),
    }
}

fn stopped_status(elapsed_seconds: u64, started_at: Option<DateTime<Local>>) -> String {
    match started_at {
        Some(at) => format!(
            "Recorded {} (started {})",
            format_time(elapsed_seconds),
            at.format("%H:%M:%S")
        ),
        None => format!("Recorded {}", format_time(elapsed_seconds)),
    }
}

fn show_error(message: &str) -> anyhow::Result<()> {
    let mut error_screen = ErrorScreen::new()?;
    error_screen.show_error(message)?;
    error_screen.cleanup()?;
    Ok(())
}
