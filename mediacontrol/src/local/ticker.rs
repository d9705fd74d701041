use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::inbox::InboxHandle;

/// Periodic wake-up thread for the position observer.
///
/// The thread only posts `make_tick()` into the coordinator inbox every
/// `interval`; reading the playhead happens on the coordinator side.
pub(crate) struct PositionTicker {
    interval: Duration,
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PositionTicker {
    pub(crate) fn spawn<M, F>(
        interval: Duration,
        inbox: InboxHandle<M>,
        make_tick: F,
    ) -> std::io::Result<Self>
    where
        M: Send + 'static,
        F: Fn() -> M + Send + 'static,
    {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let thread_flag = Arc::clone(&stop_flag);

        let handle = thread::Builder::new()
            .name("position-ticker".to_string())
            .spawn(move || {
                while !thread_flag.load(Ordering::SeqCst) {
                    thread::sleep(interval);
                    if thread_flag.load(Ordering::SeqCst) {
                        break;
                    }
                    if !inbox.post(make_tick()) {
                        break;
                    }
                }
                debug!("Position ticker exiting");
            })?;

        debug!(interval_ms = interval.as_millis() as u64, "Position ticker started");

        Ok(Self {
            interval,
            stop_flag,
            handle: Some(handle),
        })
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }

    /// Signals the thread and waits for it to exit.
    pub(crate) fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PositionTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbox::Inbox;

    #[test]
    fn test_ticker_posts_until_stopped() {
        let inbox = Inbox::<u8>::new();
        let mut ticker =
            PositionTicker::spawn(Duration::from_millis(5), inbox.handle(), || 1u8).unwrap();

        assert_eq!(inbox.next_timeout(Duration::from_secs(2)), Some(1));
        ticker.stop();

        // Drain whatever was posted before the stop flag was seen
        while inbox.try_next().is_some() {}
        thread::sleep(Duration::from_millis(20));
        assert_eq!(inbox.try_next(), None);
    }
}
