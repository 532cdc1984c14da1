//! Stop propagation: shared cancellation tokens for in-flight operations.
//!
//! The session hands the current token to the ingest and relay drivers;
//! both observe cancellation at their next suspension point (the next
//! stream pull), so a stop never waits on a poll interval. Tokens come in
//! generations: once stopped, the next armed operation gets a fresh one.

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct StopController {
    current: Mutex<CancellationToken>,
}

impl StopController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for a new in-flight operation. A token spent by a previous
    /// stop is replaced, so re-issued fetches and dispatches start fresh.
    pub fn arm(&self) -> CancellationToken {
        let mut current = self.current.lock().unwrap();
        if current.is_cancelled() {
            *current = CancellationToken::new();
        }
        current.clone()
    }

    /// Cancels the current generation. Idempotent; a stop with nothing in
    /// flight is a no-op.
    pub fn stop(&self) {
        self.current.lock().unwrap().cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.current.lock().unwrap().is_cancelled()
    }
}
