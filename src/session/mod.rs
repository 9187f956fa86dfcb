//! Recording session lifecycle: acquisition, teardown and elapsed time.

pub mod controller;
pub mod error;
pub mod slot;
pub mod timer;
pub mod view;

pub use controller::{SessionController, SessionSettings, StartOutcome, Teardown};
pub use error::{AcquisitionError, TeardownError};
pub use slot::{AnalyserHandle, AnalyserSlot};
pub use timer::{format_time, ElapsedTimer};
pub use view::SessionView;
