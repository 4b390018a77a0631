//! Background expiry of stale sessions.

use crate::core::errors::SegResult;
use crate::session::store::SessionStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Sessions inspected.
    pub scanned: usize,
    /// Sessions removed.
    pub removed: usize,
    /// Sessions that could not be inspected or removed.
    pub failed: usize,
}

/// Periodic sweeper running on a dedicated thread.
pub struct CleanupScheduler;

impl CleanupScheduler {
    /// Starts a thread that sweeps `store` every `interval`, removing sessions
    /// idle for longer than `retention`.
    ///
    /// The first sweep runs after one interval. Shutdown is observed between
    /// sweeps, so a sweep in progress always completes.
    pub fn spawn(
        store: Arc<SessionStore>,
        interval: Duration,
        retention: Duration,
    ) -> SegResult<CleanupHandle> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread = thread::Builder::new()
            .name("oar-seg-cleanup".to_string())
            .spawn(move || {
                info!(
                    "cleanup scheduler started (interval {:?}, retention {:?})",
                    interval, retention
                );
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let started: DateTime<Utc> = Utc::now();
                            let report = store.sweep_expired(retention);
                            if report.failed > 0 {
                                warn!("sweep at {} finished with failures: {:?}", started, report);
                            } else {
                                info!("sweep at {}: {:?}", started, report);
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("cleanup scheduler stopped");
            })?;
        Ok(CleanupHandle {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

/// Handle to a running [`CleanupScheduler`]. Dropping it stops the thread.
pub struct CleanupHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CleanupHandle {
    /// Signals the scheduler and waits for it to exit.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("cleanup scheduler thread panicked");
        }
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
