//! Periodic background threads.
//!
//! Each worker opens its own database connection inside the thread, runs a
//! tick, then sleeps in short steps so shutdown is noticed quickly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::info;

/// Sleep granularity for shutdown responsiveness.
const SLEEP_GRANULARITY: Duration = Duration::from_millis(100);

/// Handle for a background thread. Dropping it stops and joins the thread.
pub struct WorkerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Ask the thread to stop after the current tick.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// Spawn a thread that builds its state with `init` and calls `tick` on it
/// every `interval` until shut down. The first tick runs immediately.
///
/// When `init` returns `None` the thread exits without ticking.
pub(crate) fn spawn_periodic<S, I, T>(
    name: &'static str,
    interval: Duration,
    init: I,
    mut tick: T,
) -> WorkerHandle
where
    S: 'static,
    I: FnOnce() -> Option<S> + Send + 'static,
    T: FnMut(&S) + Send + 'static,
{
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();

    let handle = std::thread::spawn(move || {
        let Some(state) = init() else {
            return;
        };
        info!(worker = name, interval_ms = interval.as_millis() as u64, "Worker started");

        while !flag.load(Ordering::Relaxed) {
            tick(&state);

            let mut slept = Duration::ZERO;
            while slept < interval && !flag.load(Ordering::Relaxed) {
                std::thread::sleep(SLEEP_GRANULARITY);
                slept += SLEEP_GRANULARITY;
            }
        }
        info!(worker = name, "Worker shutting down");
    });

    WorkerHandle {
        shutdown,
        handle: Some(handle),
    }
}
