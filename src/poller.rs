//! Cancellable repeating background task.
//!
//! The task runs once immediately, then once per interval, until `stop` is
//! called or the handle is dropped. Stopping wakes the worker right away
//! instead of waiting out the current interval.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct Poller {
    name: String,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    /// Spawn a named worker thread calling `tick` every `interval`.
    pub fn start<F>(name: &str, interval: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(format!("poller-{}", name))
            .spawn(move || loop {
                tick();
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    // explicit stop or handle dropped
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        log::debug!("poller '{}' started ({:?})", name, interval);
        Ok(Self {
            name: name.to_string(),
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the worker and wait for the in-flight tick to finish.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            // A tick calling back into a dropped owner would deadlock a join
            // from the worker itself.
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                log::warn!("poller '{}' panicked", self.name);
            }
            log::debug!("poller '{}' stopped", self.name);
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn ticks_immediately_and_repeats() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let mut poller = Poller::start("test", Duration::from_millis(5), move || {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < 3 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        poller.stop();
        assert!(count.load(Ordering::SeqCst) >= 3);
        assert!(!poller.is_running());
    }

    #[test]
    fn stop_halts_ticks() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let poller = Poller::start("test", Duration::from_secs(60), move || {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        // long interval: dropping must not wait a minute
        let started = std::time::Instant::now();
        drop(poller);
        assert!(started.elapsed() < Duration::from_secs(10));
        let after = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), after);
        assert!(after <= 1);
    }
}
