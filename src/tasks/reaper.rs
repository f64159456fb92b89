//! TTL Reaper Task
//!
//! Background task that periodically removes expired cache entries.
//!
//! The reaper owns a dedicated thread driving a single-threaded tokio runtime,
//! so a cache can be built and used from plain synchronous code.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::CacheState;

/// Longest sweep period; larger intervals are clamped so tick deadlines stay
/// representable as instants.
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Handle to a running reaper.
///
/// Dropping the handle stops the task and waits for its thread to exit.
#[derive(Debug)]
pub struct Reaper {
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Starts sweeping `state` for expired entries every `interval`.
    ///
    /// The first sweep runs one full interval after the call. Intervals above
    /// [`MAX_INTERVAL`] are clamped to it.
    pub(crate) fn spawn(state: Arc<Mutex<CacheState>>, interval: Duration) -> io::Result<Self> {
        let interval = interval.min(MAX_INTERVAL);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (tx, rx) = oneshot::channel();

        let thread = thread::Builder::new()
            .name("cache-reaper".to_string())
            .spawn(move || runtime.block_on(run(state, interval, rx)))?;

        Ok(Self {
            shutdown: Some(tx),
            thread: Some(thread),
        })
    }

    /// Signals the task to stop and blocks until its thread has exited.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            // The receiver is gone only if the task already exited.
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Cache reaper thread panicked");
            }
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    state: Arc<Mutex<CacheState>>,
    interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    info!("Starting cache reaper with interval of {:?}", interval);

    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let removed = state.lock().purge_expired(std::time::Instant::now());

                if removed > 0 {
                    info!("TTL sweep: removed {} expired entries", removed);
                } else {
                    debug!("TTL sweep: no expired entries found");
                }
            }
        }
    }

    info!("Cache reaper stopped");
}
