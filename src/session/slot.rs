//! The shared analysis node reference.
//!
//! The session controller is the only writer: it publishes the analyser when
//! a session starts and clears it on teardown. The renderer holds an
//! [`AnalyserHandle`], which can only look at the current analyser.

use std::sync::{Arc, RwLock};

use crate::audio::Analyser;

type Shared = Arc<RwLock<Option<Arc<Analyser>>>>;

/// Writer side, owned by the session controller.
#[derive(Default)]
pub struct AnalyserSlot {
    inner: Shared,
}

impl AnalyserSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn publish(&self, analyser: Arc<Analyser>) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = Some(analyser);
    }

    pub(crate) fn clear(&self) -> Option<Arc<Analyser>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner()).take()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).is_none()
    }

    /// Returns a read-only handle for consumers such as the renderer.
    pub fn handle(&self) -> AnalyserHandle {
        AnalyserHandle {
            inner: self.inner.clone(),
        }
    }
}

/// Reader side of the analyser slot.
#[derive(Clone)]
pub struct AnalyserHandle {
    inner: Shared,
}

impl AnalyserHandle {
    /// The analyser of the active session, if any.
    pub fn current(&self) -> Option<Arc<Analyser>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_sees_publish_and_clear() {
        let slot = AnalyserSlot::new();
        let handle = slot.handle();
        assert!(handle.current().is_none());

        slot.publish(Arc::new(Analyser::new(32).unwrap()));
        assert_eq!(handle.current().map(|a| a.fft_size()), Some(32));

        assert!(slot.clear().is_some());
        assert!(handle.current().is_none());
        assert!(slot.is_empty());
    }
}
