//! Recording session lifecycle.
//!
//! The [`SessionController`] acquires the microphone, wires the visualization
//! and monitoring paths, starts the recorder and the elapsed-time counter, and
//! releases every one of those resources exactly once when the session ends,
//! whether it ended normally or because acquisition failed half-way.

use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::error::{AcquisitionError, TeardownError};
use super::slot::{AnalyserHandle, AnalyserSlot};
use super::timer::{format_time, ElapsedTimer};
use super::view::SessionView;
use crate::audio::{EffectChain, ProcessingContext, Recorder, RecorderState, SampleBus, SinkId};
use crate::config::{EffectsConfig, MicmonConfig};
use crate::platform::{AudioPlatform, CaptureStream, MonitorOutput};

/// Parameters of the processing graph built for every session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub fft_size: usize,
    pub effects: EffectsConfig,
}

impl From<&MicmonConfig> for SessionSettings {
    fn from(config: &MicmonConfig) -> Self {
        Self {
            fft_size: config.audio.fft_size,
            effects: config.effects.clone(),
        }
    }
}

/// Result of a start request. Failures are reported here, never raised.
#[derive(Debug)]
pub enum StartOutcome {
    Started,
    /// A session is already running; the request was ignored.
    AlreadyActive,
    Failed {
        error: AcquisitionError,
        teardown: Teardown,
    },
}

/// What a teardown pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Nothing was held; the call had no effect.
    NothingToRelease,
    /// Resources were released; `failures` steps reported an error.
    Released { failures: usize },
}

/// The aggregate of one recording attempt.
#[derive(Default)]
struct Session {
    device_id: Option<String>,
    stream: Option<Box<dyn CaptureStream>>,
    recorder: Option<Recorder>,
    monitor: Option<Box<dyn MonitorOutput>>,
    monitor_link: Option<(SampleBus, SinkId)>,
    context: Option<ProcessingContext>,
    timer: Option<ElapsedTimer>,
    started_at: Option<DateTime<Local>>,
    active: bool,
}

impl Session {
    fn holds_resources(&self) -> bool {
        self.stream.is_some()
            || self.recorder.is_some()
            || self.monitor.is_some()
            || self.monitor_link.is_some()
            || self.context.is_some()
            || self.timer.is_some()
    }
}

pub struct SessionController {
    platform: Box<dyn AudioPlatform>,
    view: Arc<dyn SessionView>,
    settings: SessionSettings,
    analyser: AnalyserSlot,
    elapsed: Arc<AtomicU64>,
    session: Session,
}

impl SessionController {
    pub fn new(
        platform: Box<dyn AudioPlatform>,
        view: Arc<dyn SessionView>,
        settings: SessionSettings,
    ) -> Self {
        view.set_recording_controls(false);
        view.show_elapsed(&format_time(0));
        Self {
            platform,
            view,
            settings,
            analyser: AnalyserSlot::new(),
            elapsed: Arc::new(AtomicU64::new(0)),
            session: Session::default(),
        }
    }

    /// Starts a session on `device_id`.
    ///
    /// Rejected while a session is active. On any acquisition failure the
    /// partial session is torn down with [`stop`](Self::stop) and the error is
    /// returned inside the outcome.
    pub async fn start(&mut self, device_id: &str) -> StartOutcome {
        if self.session.active {
            tracing::warn!(
                "Start ignored: a session on '{}' is already active",
                self.session.device_id.as_deref().unwrap_or("?")
            );
            return StartOutcome::AlreadyActive;
        }

        tracing::info!("Starting session on device '{}'", device_id);
        match self.acquire(device_id).await {
            Ok(()) => {
                self.session.active = true;
                self.view.set_recording_controls(true);
                tracing::info!("Session active on '{}'", device_id);
                StartOutcome::Started
            }
            Err(error) => {
                tracing::error!("Failed to start recording on '{}': {}", device_id, error);
                let teardown = self.stop();
                StartOutcome::Failed { error, teardown }
            }
        }
    }

    async fn acquire(&mut self, device_id: &str) -> Result<(), AcquisitionError> {
        self.session.device_id = Some(device_id.to_string());

        let stream = self.platform.open_capture(device_id).await?;
        let format = stream.format();
        tracing::info!(
            "Capturing from '{}' at {}Hz ({} device channels)",
            stream.label(),
            format.sample_rate,
            format.device_channels
        );
        let bus = stream.bus();
        self.session.stream = Some(stream);

        // Visualization path
        let context = self
            .session
            .context
            .insert(ProcessingContext::new(bus.clone(), format.sample_rate));
        let analyser = context.create_analyser(self.settings.fft_size)?;
        self.analyser.publish(analyser);

        // Monitoring path
        if self.settings.effects.monitor {
            let chain = EffectChain::new(&self.settings.effects, format.sample_rate)?;
            let monitor = self.session.monitor.insert(self.platform.open_monitor(format, chain)?);
            let link = bus.connect(monitor.input());
            self.session.monitor_link = Some((bus.clone(), link));
        } else {
            tracing::debug!("Monitoring disabled");
        }

        self.session
            .recorder
            .insert(Recorder::new(bus, format.sample_rate))
            .start()?;

        self.elapsed.store(0, Ordering::SeqCst);
        self.view.show_elapsed(&format_time(0));
        self.session.timer = Some(ElapsedTimer::start(
            self.elapsed.clone(),
            self.view.clone(),
        ));
        self.session.started_at = Some(Local::now());
        Ok(())
    }

    /// Ends the session and releases everything it holds.
    ///
    /// Safe to call at any time: with nothing held it does nothing. Each
    /// release step runs even if an earlier one failed.
    pub fn stop(&mut self) -> Teardown {
        if !self.session.active && !self.session.holds_resources() {
            self.session.device_id = None;
            tracing::debug!("Stop requested with no session; nothing to release");
            return Teardown::NothingToRelease;
        }

        let mut failures = 0;

        if let Some(mut recorder) = self.session.recorder.take() {
            if recorder.state() == RecorderState::Recording {
                match recorder.stop() {
                    Ok(summary) => tracing::info!(
                        "Recording stopped: {:.2}s ({} samples in {} chunks)",
                        summary.duration_secs,
                        summary.samples,
                        summary.chunks
                    ),
                    Err(e) => note_failure(&mut failures, "recorder", e),
                }
            }
        }

        if let Some(mut stream) = self.session.stream.take() {
            if let Err(e) = stream.stop_tracks() {
                note_failure(&mut failures, "capture stream", e);
            }
        }

        if let Some((bus, link)) = self.session.monitor_link.take() {
            bus.disconnect(link);
        }
        if let Some(mut monitor) = self.session.monitor.take() {
            if let Err(e) = monitor.close() {
                note_failure(&mut failures, "monitor", e);
            }
        }

        self.analyser.clear();
        if let Some(mut context) = self.session.context.take() {
            if let Err(e) = context.close() {
                note_failure(&mut failures, "processing context", e);
            }
        }

        if let Some(timer) = self.session.timer.take() {
            timer.stop();
        }

        if let Some(started_at) = self.session.started_at.take() {
            tracing::info!(
                "Session on '{}' ended after {} (started {})",
                self.session.device_id.as_deref().unwrap_or("?"),
                format_time(self.elapsed_seconds()),
                started_at.format("%H:%M:%S")
            );
        }

        self.session.active = false;
        self.session.device_id = None;
        self.view.set_recording_controls(false);

        Teardown::Released { failures }
    }

    /// Final teardown for when the hosting UI goes away.
    pub fn dispose(&mut self) {
        self.stop();
    }

    pub fn is_active(&self) -> bool {
        self.session.active
    }

    /// Whether any session resource is still held.
    pub fn holds_resources(&self) -> bool {
        self.session.holds_resources() || !self.analyser.is_empty()
    }

    /// Seconds counted by the current or most recent session.
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed.load(Ordering::SeqCst)
    }

    pub fn device_id(&self) -> Option<&str> {
        self.session.device_id.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Local>> {
        self.session.started_at
    }

    /// Read-only access to the analysis node for renderers.
    pub fn analyser_handle(&self) -> AnalyserHandle {
        self.analyser.handle()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn note_failure(failures: &mut usize, what: &str, error: TeardownError) {
    tracing::warn!("Failed to release {}: {}", what, error);
    *failures += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SampleSink;
    use crate::platform::{DeviceInfo, DeviceKind, StreamFormat};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Calls {
        captures_opened: usize,
        tracks_stopped: usize,
        monitors_opened: usize,
        monitors_closed: usize,
        last_capture_bus: Option<SampleBus>,
    }

    struct FakePlatform {
        calls: Arc<Mutex<Calls>>,
        capture_error: Option<AcquisitionError>,
        stop_tracks_fails: bool,
        monitor_error: Option<AcquisitionError>,
    }

    impl FakePlatform {
        fn new(calls: Arc<Mutex<Calls>>) -> Self {
            Self {
                calls,
                capture_error: None,
                stop_tracks_fails: false,
                monitor_error: None,
            }
        }
    }

    struct FakeCapture {
        calls: Arc<Mutex<Calls>>,
        bus: SampleBus,
        stopped: bool,
        fail_stop: bool,
    }

    impl CaptureStream for FakeCapture {
        fn label(&self) -> &str {
            "Fake Microphone"
        }

        fn format(&self) -> StreamFormat {
            StreamFormat {
                sample_rate: 48_000,
                device_channels: 1,
            }
        }

        fn bus(&self) -> SampleBus {
            self.bus.clone()
        }

        fn stop_tracks(&mut self) -> Result<(), TeardownError> {
            if self.stopped {
                return Err(TeardownError::AlreadyClosed("capture stream"));
            }
            self.stopped = true;
            if self.fail_stop {
                return Err(TeardownError::Platform("device vanished".to_string()));
            }
            self.bus.close();
            self.calls.lock().unwrap().tracks_stopped += 1;
            Ok(())
        }
    }

    struct Silence;

    impl SampleSink for Silence {
        fn accept(&self, _samples: &[f32]) {}
    }

    struct FakeMonitor {
        calls: Arc<Mutex<Calls>>,
    }

    impl MonitorOutput for FakeMonitor {
        fn input(&self) -> Arc<dyn SampleSink> {
            Arc::new(Silence)
        }

        fn close(&mut self) -> Result<(), TeardownError> {
            self.calls.lock().unwrap().monitors_closed += 1;
            Ok(())
        }
    }

    #[async_trait(?Send)]
    impl AudioPlatform for FakePlatform {
        fn enumerate_devices(&self) -> anyhow::Result<Vec<DeviceInfo>> {
            Ok(vec![DeviceInfo {
                id: "fake".to_string(),
                label: "Fake Microphone".to_string(),
                kind: DeviceKind::AudioInput,
                is_default: true,
            }])
        }

        async fn open_capture(
            &self,
            _device_id: &str,
        ) -> Result<Box<dyn CaptureStream>, AcquisitionError> {
            tokio::task::yield_now().await;
            if let Some(error) = &self.capture_error {
                return Err(error.clone());
            }
            let bus = SampleBus::new();
            let mut calls = self.calls.lock().unwrap();
            calls.captures_opened += 1;
            calls.last_capture_bus = Some(bus.clone());
            Ok(Box::new(FakeCapture {
                calls: self.calls.clone(),
                bus,
                stopped: false,
                fail_stop: self.stop_tracks_fails,
            }))
        }

        fn open_monitor(
            &self,
            _format: StreamFormat,
            _chain: EffectChain,
        ) -> Result<Box<dyn MonitorOutput>, AcquisitionError> {
            if let Some(error) = &self.monitor_error {
                return Err(error.clone());
            }
            self.calls.lock().unwrap().monitors_opened += 1;
            Ok(Box::new(FakeMonitor {
                calls: self.calls.clone(),
            }))
        }
    }

    #[derive(Default)]
    struct RecordingView {
        controls: Mutex<Vec<bool>>,
        elapsed: Mutex<Vec<String>>,
    }

    impl RecordingView {
        fn last_controls(&self) -> Option<bool> {
            self.controls.lock().unwrap().last().copied()
        }
    }

    impl SessionView for RecordingView {
        fn set_recording_controls(&self, recording: bool) {
            self.controls.lock().unwrap().push(recording);
        }

        fn show_elapsed(&self, text: &str) {
            self.elapsed.lock().unwrap().push(text.to_string());
        }
    }

    fn settings(monitor: bool) -> SessionSettings {
        SessionSettings {
            fft_size: 2048,
            effects: EffectsConfig {
                monitor,
                ..EffectsConfig::default()
            },
        }
    }

    fn controller(
        platform: FakePlatform,
        monitor: bool,
    ) -> (SessionController, Arc<RecordingView>) {
        let view = Arc::new(RecordingView::default());
        let controller = SessionController::new(Box::new(platform), view.clone(), settings(monitor));
        (controller, view)
    }

    #[tokio::test]
    async fn test_start_then_stop_releases_everything() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let (mut controller, view) = controller(FakePlatform::new(calls.clone()), true);
        assert_eq!(view.last_controls(), Some(false));

        let outcome = controller.start("fake").await;
        assert!(matches!(outcome, StartOutcome::Started));
        assert!(controller.is_active());
        assert_eq!(controller.device_id(), Some("fake"));
        assert!(controller.analyser_handle().current().is_some());
        assert!(controller.started_at().is_some());
        assert_eq!(view.last_controls(), Some(true));

        // Analyser, monitor and recorder all hang off the capture bus
        let bus = calls.lock().unwrap().last_capture_bus.clone().unwrap();
        assert_eq!(bus.sink_count(), 3);

        assert_eq!(controller.stop(), Teardown::Released { failures: 0 });
        assert!(!controller.is_active());
        assert!(!controller.holds_resources());
        assert!(controller.device_id().is_none());
        assert!(controller.analyser_handle().current().is_none());
        assert_eq!(view.last_controls(), Some(false));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.tracks_stopped, 1);
        assert_eq!(calls.monitors_closed, 1);
        assert!(bus.is_closed());
        assert_eq!(bus.sink_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_without_session_is_a_no_op() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let (mut controller, view) = controller(FakePlatform::new(calls.clone()), true);

        assert_eq!(controller.stop(), Teardown::NothingToRelease);

        controller.start("fake").await;
        assert_eq!(controller.stop(), Teardown::Released { failures: 0 });
        assert_eq!(controller.stop(), Teardown::NothingToRelease);
        controller.dispose();

        assert_eq!(calls.lock().unwrap().tracks_stopped, 1);
        assert_eq!(calls.lock().unwrap().monitors_closed, 1);
        assert_eq!(*view.controls.lock().unwrap(), vec![false, true, false]);
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let (mut controller, _view) = controller(FakePlatform::new(calls.clone()), false);

        assert!(matches!(controller.start("fake").await, StartOutcome::Started));
        assert!(matches!(
            controller.start("other").await,
            StartOutcome::AlreadyActive
        ));
        assert_eq!(calls.lock().unwrap().captures_opened, 1);
        assert_eq!(controller.device_id(), Some("fake"));
    }

    #[tokio::test]
    async fn test_capture_failure_leaves_controls_idle() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut platform = FakePlatform::new(calls.clone());
        platform.capture_error = Some(AcquisitionError::DeviceBusy("fake".to_string()));
        let (mut controller, view) = controller(platform, true);

        match controller.start("fake").await {
            StartOutcome::Failed { error, teardown } => {
                assert_eq!(error, AcquisitionError::DeviceBusy("fake".to_string()));
                assert_eq!(teardown, Teardown::NothingToRelease);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!controller.is_active());
        assert!(!controller.holds_resources());
        assert!(!view.controls.lock().unwrap().contains(&true));
        assert_eq!(controller.elapsed_seconds(), 0);
    }

    #[tokio::test]
    async fn test_monitor_failure_releases_the_capture() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut platform = FakePlatform::new(calls.clone());
        platform.monitor_error = Some(AcquisitionError::DeviceBusy("speakers".to_string()));
        let (mut controller, view) = controller(platform, true);

        match controller.start("fake").await {
            StartOutcome::Failed { error, teardown } => {
                assert!(matches!(error, AcquisitionError::DeviceBusy(_)));
                assert_eq!(teardown, Teardown::Released { failures: 0 });
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!controller.holds_resources());
        assert!(controller.analyser_handle().current().is_none());
        assert_eq!(view.last_controls(), Some(false));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.tracks_stopped, 1);
        assert_eq!(calls.monitors_closed, 0);
        assert!(calls.last_capture_bus.as_ref().unwrap().is_closed());
    }

    #[tokio::test]
    async fn test_invalid_fft_size_fails_after_capture() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let view = Arc::new(RecordingView::default());
        let mut controller = SessionController::new(
            Box::new(FakePlatform::new(calls.clone())),
            view,
            SessionSettings {
                fft_size: 1000,
                effects: EffectsConfig::default(),
            },
        );

        let outcome = controller.start("fake").await;
        assert!(matches!(
            outcome,
            StartOutcome::Failed {
                error: AcquisitionError::Graph(_),
                teardown: Teardown::Released { .. },
            }
        ));
        assert_eq!(calls.lock().unwrap().tracks_stopped, 1);
        assert_eq!(calls.lock().unwrap().monitors_opened, 0);
    }

    #[tokio::test]
    async fn test_failed_release_step_does_not_block_the_others() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut platform = FakePlatform::new(calls.clone());
        platform.stop_tracks_fails = true;
        let (mut controller, view) = controller(platform, true);

        assert!(matches!(controller.start("fake").await, StartOutcome::Started));
        assert_eq!(controller.stop(), Teardown::Released { failures: 1 });

        assert!(!controller.is_active());
        assert!(!controller.holds_resources());
        assert!(controller.analyser_handle().current().is_none());
        assert_eq!(view.last_controls(), Some(false));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.tracks_stopped, 0);
        assert_eq!(calls.monitors_closed, 1);
        // The context still disconnected the analyser from the live bus
        assert_eq!(calls.last_capture_bus.as_ref().unwrap().sink_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_time_counts_only_while_active() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let (mut controller, view) = controller(FakePlatform::new(calls), false);

        controller.start("fake").await;
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(controller.elapsed_seconds(), 2);

        controller.stop();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(controller.elapsed_seconds(), 2);
        assert_eq!(view.elapsed.lock().unwrap().last().map(String::as_str), Some("00:02"));

        // A new session counts from zero
        controller.start("fake").await;
        assert_eq!(controller.elapsed_seconds(), 0);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(controller.elapsed_seconds(), 1);
    }
}
