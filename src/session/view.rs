//! UI affordances driven by the session controller.

/// What the controller needs from the user interface.
///
/// Called from the UI task and from the timer task, so implementations are
/// shared across threads.
pub trait SessionView: Send + Sync {
    /// `true`: start disabled, stop enabled. `false`: the reverse.
    fn set_recording_controls(&self, recording: bool);

    /// Shows the elapsed recording time, already formatted as `MM:SS`.
    fn show_elapsed(&self, text: &str);
}
