//! Rendering of the live analysis trace.

pub mod canvas;
pub mod waveform;

pub use canvas::{Canvas, TraceCanvas};
pub use waveform::{RenderLoop, WaveformRenderer};
