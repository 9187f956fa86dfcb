//! Live visualization of the session's analysis node.
//!
//! The renderer only ever reads through an [`AnalyserHandle`]. When no session
//! is active the handle is empty and frames are skipped, but the loop keeps
//! running until it is stopped explicitly.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::canvas::Canvas;
use crate::config::VisualizationType;
use crate::session::AnalyserHandle;

/// Maps an amplitude byte to a vertical deflection in `[-1, 1]`.
///
/// 128 is the center line, 255 full positive and 0 full negative deflection.
pub fn byte_to_deflection(value: u8) -> f64 {
    let centered = value as f64 - 128.0;
    if centered >= 0.0 {
        centered / 127.0
    } else {
        centered / 128.0
    }
}

/// Lays samples out across the canvas width, one point per sample.
pub fn waveform_points(samples: &[u8], width: f64, height: f64) -> Vec<(f64, f64)> {
    let half = height / 2.0;
    let step = step_width(samples.len(), width);
    samples
        .iter()
        .enumerate()
        .map(|(i, &b)| (i as f64 * step, half + byte_to_deflection(b) * half))
        .collect()
}

/// Lays frequency bins out across the canvas width, louder bins higher.
pub fn spectrum_points(bins: &[u8], width: f64, height: f64) -> Vec<(f64, f64)> {
    let step = step_width(bins.len(), width);
    bins.iter()
        .enumerate()
        .map(|(i, &b)| (i as f64 * step, b as f64 / 255.0 * height))
        .collect()
}

fn step_width(count: usize, width: f64) -> f64 {
    if count > 1 {
        width / (count - 1) as f64
    } else {
        0.0
    }
}

pub struct WaveformRenderer {
    analyser: AnalyserHandle,
    visualization: VisualizationType,
    buffer: Vec<u8>,
}

impl WaveformRenderer {
    pub fn new(analyser: AnalyserHandle, visualization: VisualizationType) -> Self {
        Self {
            analyser,
            visualization,
            buffer: Vec::new(),
        }
    }

    /// Draws one frame. Returns `false`, leaving the canvas untouched, when
    /// there is no analysis node to read from.
    pub fn render_frame(&mut self, canvas: &mut dyn Canvas) -> bool {
        let Some(analyser) = self.analyser.current() else {
            return false;
        };

        let (width, height) = canvas.size();
        let points = match self.visualization {
            VisualizationType::Waveform => {
                self.buffer.resize(analyser.fft_size(), 128);
                analyser.byte_time_domain_data(&mut self.buffer);
                waveform_points(&self.buffer, width, height)
            }
            VisualizationType::Spectrum => {
                self.buffer.resize(analyser.frequency_bin_count(), 0);
                analyser.byte_frequency_data(&mut self.buffer);
                spectrum_points(&self.buffer, width, height)
            }
        };

        canvas.clear();
        canvas.stroke_polyline(&points);
        true
    }

    /// Runs the renderer at `frame_rate` frames per second until the returned
    /// loop is stopped or dropped.
    pub fn start<C>(mut self, mut canvas: C, frame_rate: u32) -> RenderLoop
    where
        C: Canvas + Send + 'static,
    {
        let period = Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64);
        tracing::debug!(
            "Render loop started ({} at {} fps)",
            self.visualization,
            frame_rate
        );
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.render_frame(&mut canvas);
            }
        });
        RenderLoop { task }
    }
}

/// Handle to a running render loop.
pub struct RenderLoop {
    task: JoinHandle<()>,
}

impl RenderLoop {
    pub fn stop(self) {
        tracing::debug!("Render loop stopped");
        self.task.abort();
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{Analyser, SampleSink};
    use crate::render::TraceCanvas;
    use crate::session::AnalyserSlot;
    use std::sync::Arc;

    #[test]
    fn test_byte_mapping() {
        assert_eq!(byte_to_deflection(128), 0.0);
        assert_eq!(byte_to_deflection(255), 1.0);
        assert_eq!(byte_to_deflection(0), -1.0);
    }

    #[test]
    fn test_waveform_points_span_the_canvas() {
        let points = waveform_points(&[128, 255, 0, 128, 128], 100.0, 40.0);
        assert_eq!(
            points,
            vec![(0.0, 20.0), (25.0, 40.0), (50.0, 0.0), (75.0, 20.0), (100.0, 20.0)]
        );
    }

    #[test]
    fn test_skips_frame_without_analyser() {
        let slot = AnalyserSlot::new();
        let mut renderer = WaveformRenderer::new(slot.handle(), VisualizationType::Waveform);
        let mut canvas = TraceCanvas::new(100.0, 40.0);
        canvas.stroke_polyline(&[(1.0, 2.0)]);

        assert!(!renderer.render_frame(&mut canvas));
        assert_eq!(canvas.points(), vec![(1.0, 2.0)]);
        assert_eq!(canvas.frames(), 1);
    }

    #[test]
    fn test_silence_draws_center_line() {
        let slot = AnalyserSlot::new();
        slot.publish(Arc::new(Analyser::new(32).unwrap()));
        let mut renderer = WaveformRenderer::new(slot.handle(), VisualizationType::Waveform);
        let mut canvas = TraceCanvas::new(310.0, 40.0);

        assert!(renderer.render_frame(&mut canvas));
        let points = canvas.points();
        assert_eq!(points.len(), 32);
        assert!(points.iter().all(|&(_, y)| y == 20.0));
        assert_eq!(points[31].0, 310.0);
    }

    #[test]
    fn test_full_scale_input_reaches_the_edges() {
        let slot = AnalyserSlot::new();
        let analyser = Arc::new(Analyser::new(32).unwrap());
        let mut block = vec![1.0f32; 16];
        block.extend(vec![-1.0f32; 16]);
        analyser.accept(&block);
        slot.publish(analyser);

        let mut renderer = WaveformRenderer::new(slot.handle(), VisualizationType::Waveform);
        let mut canvas = TraceCanvas::new(100.0, 40.0);
        renderer.render_frame(&mut canvas);

        let points = canvas.points();
        assert_eq!(points[0].1, 40.0);
        assert_eq!(points[31].1, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_session_teardown() {
        let slot = AnalyserSlot::new();
        let canvas = TraceCanvas::new(100.0, 40.0);
        let render_loop = WaveformRenderer::new(slot.handle(), VisualizationType::Spectrum)
            .start(canvas.clone(), 10);

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(canvas.frames(), 0);

        slot.publish(Arc::new(Analyser::new(64).unwrap()));
        tokio::time::sleep(Duration::from_millis(300)).await;
        let drawn = canvas.frames();
        assert!(drawn >= 2);
        assert_eq!(canvas.points().len(), 32);

        slot.clear();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(canvas.frames(), drawn);

        render_loop.stop();
    }
}
