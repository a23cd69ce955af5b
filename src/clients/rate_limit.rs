//! Token-tick rate limiter for outbound requests.
//!
//! A generator task produces one token per interval into a capacity-1
//! channel via try_send: tokens nobody takes are discarded, so there is no
//! burst accumulation beyond the single buffered token.

use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limiter cancelled")]
    Cancelled,
    #[error("rate limiter stopped")]
    Stopped,
}

/// Shared pacing for all outbound requests of one client.
pub struct RateLimiter {
    tokens: Mutex<mpsc::Receiver<()>>,
    generator: JoinHandle<()>,
}

impl RateLimiter {
    /// Create a limiter emitting `requests_per_second` tokens per second.
    pub fn new(requests_per_second: f64) -> Self {
        let interval = Duration::from_secs_f64(1.0 / requests_per_second.max(f64::EPSILON));
        let (tx, rx) = mpsc::channel(1);

        let generator = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick fires immediately; skip it so the first token
            // arrives one full interval after start.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }
                let _ = tx.try_send(());
            }
        });

        Self {
            tokens: Mutex::new(rx),
            generator,
        }
    }

    /// Wait until a token is available, or fail when cancelled.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        let mut rx = self.tokens.lock().await;
        tokio::select! {
            _ = cancel.cancelled() => Err(RateLimitError::Cancelled),
            token = rx.recv() => token.ok_or(RateLimitError::Stopped),
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.generator.abort();
    }
}
