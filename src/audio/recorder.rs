//! Recorder attached to the raw capture stream.
//!
//! Collects captured audio as chunks of mono i16 PCM while recording. What
//! happens to the chunks afterwards is up to the caller; the recorder only
//! keeps them in memory.

use std::sync::{Arc, Mutex, MutexGuard};

use super::bus::{SampleBus, SampleSink, SinkId};
use crate::session::{AcquisitionError, TeardownError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Inactive,
    Recording,
}

/// Totals of a finished recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingSummary {
    pub chunks: usize,
    pub samples: usize,
    pub duration_secs: f32,
}

/// Chunks hold one second of audio each, so the callback allocates once per
/// second rather than once per block.
struct ChunkCollector {
    chunk_len: usize,
    chunks: Mutex<Vec<Vec<i16>>>,
}

impl ChunkCollector {
    fn new(sample_rate: u32) -> Self {
        Self {
            chunk_len: sample_rate.max(1) as usize,
            chunks: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Vec<i16>>> {
        self.chunks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SampleSink for ChunkCollector {
    fn accept(&self, samples: &[f32]) {
        let mut chunks = self.lock();
        let mut remaining = samples;
        while !remaining.is_empty() {
            let chunk = match chunks.last_mut() {
                Some(chunk) if chunk.len() < self.chunk_len => chunk,
                _ => {
                    chunks.push(Vec::with_capacity(self.chunk_len));
                    let Some(chunk) = chunks.last_mut() else { return };
                    chunk
                }
            };
            let take = (self.chunk_len - chunk.len()).min(remaining.len());
            chunk.extend(
                remaining[..take]
                    .iter()
                    .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
            );
            remaining = &remaining[take..];
        }
    }
}

/// In-memory recorder.
///
/// Captured audio is kept for the whole session and grows by two bytes per
/// sample (about 94 KiB per second at 48kHz); it is released when the
/// recorder is dropped.
pub struct Recorder {
    source: SampleBus,
    sample_rate: u32,
    collector: Arc<ChunkCollector>,
    link: Option<SinkId>,
}

impl Recorder {
    pub fn new(source: SampleBus, sample_rate: u32) -> Self {
        Self {
            source,
            sample_rate,
            collector: Arc::new(ChunkCollector::new(sample_rate)),
            link: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        if self.link.is_some() {
            RecorderState::Recording
        } else {
            RecorderState::Inactive
        }
    }

    /// Starts collecting chunks from the source.
    ///
    /// # Errors
    /// - If the source stream has already ended
    /// - If the recorder is already recording
    pub fn start(&mut self) -> Result<(), AcquisitionError> {
        if self.source.is_closed() {
            return Err(AcquisitionError::DeviceUnavailable(
                "capture stream has ended".to_string(),
            ));
        }
        if self.link.is_some() {
            return Err(AcquisitionError::Graph("recorder is already recording".to_string()));
        }

        self.link = Some(self.source.connect(self.collector.clone()));
        tracing::debug!("Recorder started");
        Ok(())
    }

    /// Stops collecting and returns what was captured.
    ///
    /// # Errors
    /// - If the recorder is not recording
    pub fn stop(&mut self) -> Result<RecordingSummary, TeardownError> {
        let link = self
            .link
            .take()
            .ok_or(TeardownError::AlreadyClosed("recorder"))?;
        self.source.disconnect(link);

        let chunks = self.collector.lock();
        let samples: usize = chunks.iter().map(Vec::len).sum();
        Ok(RecordingSummary {
            chunks: chunks.len(),
            samples,
            duration_secs: samples as f32 / self.sample_rate.max(1) as f32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_only_while_recording() {
        let bus = SampleBus::new();
        let mut recorder = Recorder::new(bus.clone(), 4);
        bus.publish(&[0.5; 4]);

        recorder.start().unwrap();
        assert_eq!(recorder.state(), RecorderState::Recording);
        bus.publish(&[1.0, -1.0, 0.0, 0.0]);
        bus.publish(&[0.0; 4]);

        let summary = recorder.stop().unwrap();
        bus.publish(&[0.5; 4]);

        assert_eq!(recorder.state(), RecorderState::Inactive);
        assert_eq!(summary.chunks, 2);
        assert_eq!(summary.samples, 8);
        assert_eq!(summary.duration_secs, 2.0);
        assert_eq!(recorder.collector.lock()[0][..2], [i16::MAX, -i16::MAX]);
    }

    #[test]
    fn test_small_blocks_fill_whole_second_chunks() {
        let bus = SampleBus::new();
        let mut recorder = Recorder::new(bus.clone(), 1000);
        recorder.start().unwrap();
        for _ in 0..25 {
            bus.publish(&[0.25; 100]);
        }

        let summary = recorder.stop().unwrap();
        assert_eq!(summary.chunks, 3);
        assert_eq!(summary.samples, 2500);
        assert_eq!(summary.duration_secs, 2.5);

        let chunks = recorder.collector.lock();
        assert_eq!(chunks[0].len(), 1000);
        assert_eq!(chunks[0].capacity(), 1000);
        assert_eq!(chunks[1].len(), 1000);
        assert_eq!(chunks[2].len(), 500);
    }

    #[test]
    fn test_start_on_ended_stream_fails() {
        let bus = SampleBus::new();
        bus.close();
        let mut recorder = Recorder::new(bus, 48000);
        assert!(matches!(
            recorder.start(),
            Err(AcquisitionError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_stop_when_inactive_is_reported() {
        let mut recorder = Recorder::new(SampleBus::new(), 48000);
        assert_eq!(
            recorder.stop(),
            Err(TeardownError::AlreadyClosed("recorder"))
        );
    }
}
