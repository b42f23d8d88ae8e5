//! Exponential backoff for feed reconnects and storage retries.

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug)]
pub struct MaxRetriesExceeded;

impl std::fmt::Display for MaxRetriesExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maximum retry attempts exceeded")
    }
}

impl std::error::Error for MaxRetriesExceeded {}

/// Doubling delays with jitter, capped at `max_delay_ms`.
///
/// A bounded instance refuses to sleep once `max_retries` attempts are spent;
/// an unbounded one (feed reconnects) never gives up, its delay just stops
/// growing.
#[derive(Debug)]
pub struct Backoff {
    initial_delay_ms: u64,
    max_delay_ms: u64,
    max_retries: Option<u32>,
    current_attempt: u32,
}

impl Backoff {
    pub fn bounded(initial_ms: u64, max_ms: u64, retries: u32) -> Self {
        Self {
            initial_delay_ms: initial_ms,
            max_delay_ms: max_ms,
            max_retries: Some(retries),
            current_attempt: 0,
        }
    }

    pub fn unbounded(initial_ms: u64, max_ms: u64) -> Self {
        Self {
            initial_delay_ms: initial_ms,
            max_delay_ms: max_ms,
            max_retries: None,
            current_attempt: 0,
        }
    }

    pub async fn sleep(&mut self) -> Result<(), MaxRetriesExceeded> {
        if let Some(max) = self.max_retries {
            if self.current_attempt >= max {
                return Err(MaxRetriesExceeded);
            }
        }

        let ceiling = std::cmp::min(
            self.initial_delay_ms
                .saturating_mul(2_u64.saturating_pow(self.current_attempt)),
            self.max_delay_ms,
        );
        // Jitter keeps a fleet of scrapers from reconnecting in lockstep
        let delay = rand::thread_rng().gen_range(ceiling / 2..=ceiling);

        match self.max_retries {
            Some(max) => log::warn!(
                "⏳ Retry attempt {} of {} in {}ms",
                self.current_attempt + 1,
                max,
                delay
            ),
            None => log::warn!(
                "⏳ Reconnect attempt {} in {}ms",
                self.current_attempt + 1,
                delay
            ),
        }

        sleep(Duration::from_millis(delay)).await;
        self.current_attempt = self.current_attempt.saturating_add(1);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_gives_up() {
        let mut backoff = Backoff::bounded(1, 4, 3);

        for _ in 0..3 {
            assert!(backoff.sleep().await.is_ok());
        }
        assert!(backoff.sleep().await.is_err());

        backoff.reset();
        assert!(backoff.sleep().await.is_ok());
    }

    #[tokio::test]
    async fn test_unbounded_never_errors() {
        let mut backoff = Backoff::unbounded(1, 2);
        for _ in 0..10 {
            assert!(backoff.sleep().await.is_ok());
        }
    }
}
