//! Elapsed-time counter of a recording session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use super::view::SessionView;

/// Formats seconds as `MM:SS`. Minutes are not wrapped into hours.
pub fn format_time(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Ticks once per second, bumping a shared counter and pushing the formatted
/// time to the view. Dropping the timer stops it.
pub struct ElapsedTimer {
    task: JoinHandle<()>,
}

impl ElapsedTimer {
    /// Spawns the ticking task. Must be called within a tokio runtime.
    pub fn start(counter: Arc<AtomicU64>, view: Arc<dyn SessionView>) -> Self {
        let task = tokio::spawn(async move {
            let period = Duration::from_secs(1);
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let seconds = counter.fetch_add(1, Ordering::SeqCst) + 1;
                view.show_elapsed(&format_time(seconds));
            }
        });
        Self { task }
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for ElapsedTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct TextLog(Mutex<Vec<String>>);

    impl SessionView for TextLog {
        fn set_recording_controls(&self, _recording: bool) {}

        fn show_elapsed(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(59), "00:59");
        assert_eq!(format_time(60), "01:00");
        assert_eq!(format_time(3661), "61:01");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_second_until_stopped() {
        let counter = Arc::new(AtomicU64::new(0));
        let view = Arc::new(TextLog::default());
        let timer = ElapsedTimer::start(counter.clone(), view.clone());

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2501)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        timer.stop();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(
            *view.0.lock().unwrap(),
            vec!["00:01".to_string(), "00:02".to_string(), "00:03".to_string()]
        );
    }
}
