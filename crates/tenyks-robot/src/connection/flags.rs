//! Runtime flags shared between a connection and its supervisor.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// `needsReconnect`, `userDisconnect` and the liveness timestamp.
#[derive(Debug)]
pub struct ConnectionFlags {
    needs_reconnect: AtomicBool,
    user_disconnect: AtomicBool,
    last_liveness: Mutex<Instant>,
}

impl Default for ConnectionFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionFlags {
    pub fn new() -> Self {
        Self {
            needs_reconnect: AtomicBool::new(false),
            user_disconnect: AtomicBool::new(false),
            last_liveness: Mutex::new(Instant::now()),
        }
    }

    /// Record traffic.
    pub fn touch(&self) {
        self.set_last_liveness(Instant::now());
    }

    pub fn set_last_liveness(&self, at: Instant) {
        *self
            .last_liveness
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = at;
    }

    pub fn last_liveness(&self) -> Instant {
        *self
            .last_liveness
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Whether nothing has been heard for longer than `after`, as of `now`.
    pub fn is_stale(&self, now: Instant, after: Duration) -> bool {
        now.saturating_duration_since(self.last_liveness()) > after
    }

    pub fn needs_reconnect(&self) -> bool {
        self.needs_reconnect.load(Ordering::Acquire)
    }

    pub fn request_reconnect(&self) {
        self.needs_reconnect.store(true, Ordering::Release);
    }

    pub fn clear_reconnect(&self) {
        self.needs_reconnect.store(false, Ordering::Release);
    }

    pub fn user_disconnect(&self) -> bool {
        self.user_disconnect.load(Ordering::Acquire)
    }

    /// Ask the supervising task to stop. Never cleared.
    pub fn set_user_disconnect(&self) {
        self.user_disconnect.store(true, Ordering::Release);
    }
}
