//! In-process audio graph.
//!
//! The capture stream publishes into a [`SampleBus`]; the processing context,
//! analyser, recorder and monitoring effects hang off that bus.

pub mod analyser;
pub mod bus;
pub mod context;
pub mod effects;
pub mod recorder;
pub mod resample;

pub use analyser::Analyser;
pub use bus::{fold_to_mono, SampleBus, SampleSink, SinkId};
pub use context::ProcessingContext;
pub use effects::EffectChain;
pub use recorder::{Recorder, RecorderState, RecordingSummary};
pub use resample::LinearResampler;
