//! Fan-out of captured audio to the nodes connected to a capture stream.
//!
//! The capture callback publishes mono blocks into a [`SampleBus`]; every
//! connected [`SampleSink`] (analyser, recorder, monitor) receives each block
//! on the audio thread.

use std::sync::{Arc, Mutex, MutexGuard};

/// Receives mono `f32` blocks from a capture stream.
///
/// Called on the audio callback thread, so implementations must not block for
/// long.
pub trait SampleSink: Send + Sync {
    fn accept(&self, samples: &[f32]);
}

/// Identifies one connection on a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

#[derive(Default)]
struct BusState {
    next_id: u64,
    sinks: Vec<(SinkId, Arc<dyn SampleSink>)>,
    closed: bool,
}

/// Shared, cloneable fan-out point of one capture stream.
#[derive(Clone, Default)]
pub struct SampleBus {
    state: Arc<Mutex<BusState>>,
}

impl SampleBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Connects a sink. Connecting to a closed bus is allowed but the sink
    /// never receives data.
    pub fn connect(&self, sink: Arc<dyn SampleSink>) -> SinkId {
        let mut state = self.lock();
        let id = SinkId(state.next_id);
        state.next_id += 1;
        if !state.closed {
            state.sinks.push((id, sink));
        }
        id
    }

    /// Disconnects a sink. Returns `false` if it was not connected.
    pub fn disconnect(&self, id: SinkId) -> bool {
        let mut state = self.lock();
        let before = state.sinks.len();
        state.sinks.retain(|(sink_id, _)| *sink_id != id);
        state.sinks.len() != before
    }

    /// Delivers a mono block to every connected sink.
    pub fn publish(&self, samples: &[f32]) {
        let state = self.lock();
        if state.closed {
            return;
        }
        for (_, sink) in &state.sinks {
            sink.accept(samples);
        }
    }

    /// Marks the bus as ended and drops all sinks.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.sinks.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn sink_count(&self) -> usize {
        self.lock().sinks.len()
    }
}

/// Folds interleaved multi-channel audio into mono by averaging channels.
pub fn fold_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        0 | 1 => data.to_vec(),
        2 => data
            .chunks_exact(2)
            .map(|frame| (frame[0] + frame[1]) * 0.5)
            .collect(),
        _ => data
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(Mutex<usize>);

    impl SampleSink for Counter {
        fn accept(&self, samples: &[f32]) {
            *self.0.lock().unwrap() += samples.len();
        }
    }

    #[test]
    fn test_publish_reaches_connected_sinks_only() {
        let bus = SampleBus::new();
        let a = Arc::new(Counter(Mutex::new(0)));
        let b = Arc::new(Counter(Mutex::new(0)));
        let _ = bus.connect(a.clone());
        let id_b = bus.connect(b.clone());

        bus.publish(&[0.0; 4]);
        assert!(bus.disconnect(id_b));
        assert!(!bus.disconnect(id_b));
        bus.publish(&[0.0; 4]);

        assert_eq!(*a.0.lock().unwrap(), 8);
        assert_eq!(*b.0.lock().unwrap(), 4);
    }

    #[test]
    fn test_closed_bus_drops_sinks() {
        let bus = SampleBus::new();
        let a = Arc::new(Counter(Mutex::new(0)));
        bus.connect(a.clone());
        bus.close();
        bus.publish(&[0.0; 4]);
        bus.connect(a.clone());

        assert!(bus.is_closed());
        assert_eq!(bus.sink_count(), 0);
        assert_eq!(*a.0.lock().unwrap(), 0);
    }

    #[test]
    fn test_fold_to_mono_averages_channels() {
        assert_eq!(fold_to_mono(&[0.5, -0.5], 1), vec![0.5, -0.5]);
        assert_eq!(fold_to_mono(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(fold_to_mono(&[0.3, 0.3, 0.3, 0.0, 0.0, 0.0], 3).len(), 2);
    }
}
