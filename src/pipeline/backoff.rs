use std::time::Duration;
use tokio::time::sleep;

/// Delay applied between loop iterations while a source is down.
///
/// Doubles per consecutive failure up to `max_delay` and resets after an
/// iteration with no outage. Unlike a bounded retry, it never gives up: the
/// pipeline keeps waiting for the source to return.
#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_delay: u64,
    max_delay: u64,
    current_attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(initial: u64, max: u64) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max,
            current_attempt: 0,
        }
    }

    /// Delay in seconds for the next failure
    pub fn next_delay(&self) -> u64 {
        let factor = 2_u64.checked_pow(self.current_attempt).unwrap_or(u64::MAX);
        std::cmp::min(self.initial_delay.saturating_mul(factor), self.max_delay)
    }

    pub async fn sleep(&mut self) {
        let delay = self.next_delay();

        log::warn!(
            "⏳ Source outage #{}, backing off {}s",
            self.current_attempt + 1,
            delay
        );

        sleep(Duration::from_secs(delay)).await;
        self.current_attempt = self.current_attempt.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}
