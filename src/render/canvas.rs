//! Drawing surface for the live visualization.

use std::sync::{Arc, Mutex, MutexGuard};

/// A 2-D surface a renderer can clear and stroke polylines on.
///
/// Coordinates run from `(0, 0)` at the bottom-left corner to
/// [`size`](Canvas::size) at the top-right.
pub trait Canvas {
    fn size(&self) -> (f64, f64);
    fn clear(&mut self);
    fn stroke_polyline(&mut self, points: &[(f64, f64)]);
}

#[derive(Debug, Default)]
struct Trace {
    width: f64,
    height: f64,
    points: Vec<(f64, f64)>,
    frames: u64,
}

/// In-memory canvas shared between the render task and the terminal UI.
///
/// The render task strokes into it; the UI reads the latest trace back when
/// it draws a frame and reports the area it has available.
#[derive(Debug, Clone, Default)]
pub struct TraceCanvas {
    inner: Arc<Mutex<Trace>>,
}

impl TraceCanvas {
    pub fn new(width: f64, height: f64) -> Self {
        let canvas = Self::default();
        canvas.resize(width, height);
        canvas
    }

    fn lock(&self) -> MutexGuard<'_, Trace> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn resize(&self, width: f64, height: f64) {
        let mut trace = self.lock();
        trace.width = width.max(1.0);
        trace.height = height.max(1.0);
    }

    /// The most recently stroked polyline.
    pub fn points(&self) -> Vec<(f64, f64)> {
        self.lock().points.clone()
    }

    /// Number of frames stroked so far.
    pub fn frames(&self) -> u64 {
        self.lock().frames
    }
}

impl Canvas for TraceCanvas {
    fn size(&self) -> (f64, f64) {
        let trace = self.lock();
        (trace.width, trace.height)
    }

    fn clear(&mut self) {
        self.lock().points.clear();
    }

    fn stroke_polyline(&mut self, points: &[(f64, f64)]) {
        let mut trace = self.lock();
        trace.points.clear();
        trace.points.extend_from_slice(points);
        trace.frames += 1;
    }
}
