//! Error taxonomy for the recording session lifecycle.

use thiserror::Error;

/// A failure while acquiring the resources of a session.
///
/// Raised by the capture backend or while wiring the processing graph.
/// The controller catches it, tears down whatever was acquired and leaves the
/// session inactive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquisitionError {
    #[error("permission to use '{0}' was denied")]
    PermissionDenied(String),
    #[error("input device '{0}' is not available")]
    DeviceUnavailable(String),
    #[error("input device '{0}' is busy")]
    DeviceBusy(String),
    #[error("no input device satisfies the constraint: {0}")]
    ConstraintUnsatisfiable(String),
    #[error("failed to build processing graph: {0}")]
    Graph(String),
}

/// A failure while releasing one resource of a session.
///
/// Never blocks the remaining release steps.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TeardownError {
    #[error("{0} was already closed")]
    AlreadyClosed(&'static str),
    #[error("platform error: {0}")]
    Platform(String),
}
