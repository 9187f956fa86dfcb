//! Processing context for the visualization path.
//!
//! Owns the connections between a capture stream and the analysis nodes it
//! creates. Closing the context disconnects every node it wired.

use std::sync::Arc;

use super::analyser::Analyser;
use super::bus::{SampleBus, SinkId};
use crate::session::{AcquisitionError, TeardownError};

pub struct ProcessingContext {
    source: SampleBus,
    sample_rate: u32,
    connections: Vec<SinkId>,
    closed: bool,
}

impl ProcessingContext {
    /// Creates a context reading from `source`.
    pub fn new(source: SampleBus, sample_rate: u32) -> Self {
        tracing::debug!("Processing context created at {}Hz", sample_rate);
        Self {
            source,
            sample_rate,
            connections: Vec::new(),
            closed: false,
        }
    }

    /// Creates an analyser and connects the context's source to it.
    ///
    /// # Errors
    /// - If the context is already closed
    /// - If `fft_size` is invalid
    pub fn create_analyser(&mut self, fft_size: usize) -> Result<Arc<Analyser>, AcquisitionError> {
        if self.closed {
            return Err(AcquisitionError::Graph(
                "processing context is closed".to_string(),
            ));
        }

        let analyser = Arc::new(Analyser::new(fft_size)?);
        let id = self.source.connect(analyser.clone());
        self.connections.push(id);
        tracing::debug!(
            "Analyser connected (fft size {}, {:.1}ms window)",
            fft_size,
            fft_size as f32 * 1000.0 / self.sample_rate.max(1) as f32
        );
        Ok(analyser)
    }

    /// Disconnects every node and closes the context.
    ///
    /// # Errors
    /// - If the context was already closed
    pub fn close(&mut self) -> Result<(), TeardownError> {
        if self.closed {
            return Err(TeardownError::AlreadyClosed("processing context"));
        }
        for id in self.connections.drain(..) {
            self.source.disconnect(id);
        }
        self.closed = true;
        tracing::debug!("Processing context closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyser_receives_source_until_close() {
        let bus = SampleBus::new();
        let mut context = ProcessingContext::new(bus.clone(), 48000);
        let analyser = context.create_analyser(32).unwrap();
        assert_eq!(bus.sink_count(), 1);

        bus.publish(&[1.0]);
        context.close().unwrap();
        bus.publish(&[-1.0]);

        let mut out = [0u8; 32];
        analyser.byte_time_domain_data(&mut out);
        assert_eq!(out[31], 255);
        assert_eq!(bus.sink_count(), 0);
    }

    #[test]
    fn test_close_twice_reports_already_closed() {
        let mut context = ProcessingContext::new(SampleBus::new(), 48000);
        assert!(context.close().is_ok());
        assert_eq!(
            context.close(),
            Err(TeardownError::AlreadyClosed("processing context"))
        );
        assert!(context.create_analyser(32).is_err());
    }
}
