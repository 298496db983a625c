//! Execution deadline watcher
//!
//! A watchdog thread waits until either the run reports completion or the
//! deadline passes. On the deadline it raises the runtime's interrupt flag and
//! nothing else: it never touches engine values.

use crate::error::{BridgeError, BridgeResult};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// State shared with the watcher thread
struct Shared {
    /// Set once the guarded run has finished
    done: Mutex<bool>,
    /// Wakes the watcher early
    signal: Condvar,
}

/// Watcher for one deadline-bound run
pub(crate) struct Watchdog {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<bool>>,
}

impl Watchdog {
    /// Start watching; `interrupt` is raised when `timeout` elapses first
    pub(crate) fn start(timeout: Duration, interrupt: Arc<AtomicBool>) -> BridgeResult<Self> {
        let shared = Arc::new(Shared {
            done: Mutex::new(false),
            signal: Condvar::new(),
        });
        let deadline = Instant::now() + timeout;

        let watched = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("jsbridge-watchdog".to_string())
            .spawn(move || {
                let mut done = watched.done.lock();
                while !*done {
                    if watched.signal.wait_until(&mut done, deadline).timed_out() {
                        break;
                    }
                }
                if *done {
                    return false;
                }
                debug!(?timeout, "deadline reached, interrupting script");
                interrupt.store(true, Ordering::SeqCst);
                true
            })
            .map_err(|e| BridgeError::internal(format!("Failed to spawn watchdog: {}", e)))?;

        trace!(?timeout, "watchdog started");
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Signal completion and join the watcher.
    ///
    /// Returns whether the deadline fired before completion was signalled.
    pub(crate) fn finish(mut self) -> bool {
        self.stop()
    }

    fn stop(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return false;
        };
        {
            let mut done = self.shared.done.lock();
            *done = true;
            self.shared.signal.notify_one();
        }
        let fired = handle.join().unwrap_or(false);
        trace!(fired, "watchdog joined");
        fired
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_before_deadline() {
        let interrupt = Arc::new(AtomicBool::new(false));
        let watchdog = Watchdog::start(Duration::from_secs(10), Arc::clone(&interrupt)).unwrap();
        let started = Instant::now();
        assert!(!watchdog.finish());
        assert!(!interrupt.load(Ordering::SeqCst));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_deadline_raises_interrupt() {
        let interrupt = Arc::new(AtomicBool::new(false));
        let watchdog = Watchdog::start(Duration::from_millis(20), Arc::clone(&interrupt)).unwrap();
        thread::sleep(Duration::from_millis(200));
        assert!(interrupt.load(Ordering::SeqCst));
        assert!(watchdog.finish());
    }

    #[test]
    fn test_drop_joins_watcher() {
        let interrupt = Arc::new(AtomicBool::new(false));
        {
            let _watchdog =
                Watchdog::start(Duration::from_secs(10), Arc::clone(&interrupt)).unwrap();
        }
        assert!(!interrupt.load(Ordering::SeqCst));
    }
}
