//! Terminal screens.

pub mod error;
pub mod recorder;

pub use error::ErrorScreen;
pub use recorder::{MicmonTui, PanelView, RecorderCommand};
