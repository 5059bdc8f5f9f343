//! In-flight stream accounting and graceful shutdown.
//!
//! Every streaming call holds a [`StreamGuard`] for its whole lifetime.
//! [`StreamTracker::shutdown`] then proceeds in three phases:
//!
//! 1. refuse new streams ([`Error::ServiceShutdown`]);
//! 2. wait, bounded by the configured timeout, for in-flight streams to end;
//! 3. cancel the shared [`CancellationToken`] so whatever is left stops.

use crate::server::telemetry::{
    decrement_streams_inflight, increment_streams_inflight, record_stream_duration,
};
use core::time::Duration;
use ordermgt_core::Error;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::time::Instant;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct StreamTracker {
    inflight: AtomicUsize,
    shutting_down: AtomicBool,
    shutdown_token: CancellationToken,
}

impl StreamTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once shutdown has started.
    pub fn begin(self: &Arc<Self>) -> Result<StreamGuard, Error> {
        // Count first so a concurrent shutdown never misses this stream.
        let guard = StreamGuard::new(Arc::clone(self));
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(Error::ServiceShutdown);
        }
        Ok(guard)
    }

    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Token cancelled in the last shutdown phase.
    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub async fn shutdown(&self, drain_timeout: Duration) {
        // === Phase 0: Stop accepting new streams ===
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new streams");
        self.shutting_down.store(true, Ordering::Release);

        // === Phase 1: Wait for in-flight streams to drain ===
        #[cfg(feature = "tracing")]
        tracing::info!("Draining in-flight streams ({} active)", self.inflight());
        let drain_result = timeout(drain_timeout, async {
            while self.inflight() > 0 {
                sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight streams drained successfully");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} streams still active)",
                    self.inflight()
                );
            }
        }

        // === Phase 2: Cancel whatever is left ===
        self.shutdown_token.cancel();

        #[cfg(feature = "tracing")]
        tracing::info!("Stream shutdown complete");
    }
}

/// Keeps a stream counted as in flight until dropped.
#[derive(Debug)]
pub struct StreamGuard {
    tracker: Arc<StreamTracker>,
    start: Instant,
}

impl StreamGuard {
    fn new(tracker: Arc<StreamTracker>) -> Self {
        tracker.inflight.fetch_add(1, Ordering::AcqRel);
        increment_streams_inflight();
        Self {
            tracker,
            start: Instant::now(),
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.tracker.inflight.fetch_sub(1, Ordering::AcqRel);
        decrement_streams_inflight();
        record_stream_duration(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}
