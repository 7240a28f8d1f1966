use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Spaces calls to one provider at least `min_interval` apart
///
/// Callers queue on the internal lock, so concurrent requests are released
/// one slot at a time. Nothing is retried here.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, calls: u32, period: Duration) -> Self {
        Self {
            name: name.into(),
            min_interval: period / calls.max(1),
            next_slot: Mutex::new(None),
        }
    }

    pub fn per_second(name: impl Into<String>, calls: u32) -> Self {
        Self::new(name, calls, Duration::from_secs(1))
    }

    pub fn per_minute(name: impl Into<String>, calls: u32) -> Self {
        Self::new(name, calls, Duration::from_secs(60))
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for the next free slot
    pub async fn acquire(&self) {
        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();

        let slot = match *next_slot {
            Some(slot) if slot > now => {
                debug!(provider = %self.name, wait_ms = (slot - now).as_millis() as u64, "Rate limited");
                sleep_until(slot).await;
                slot
            }
            _ => now,
        };

        *next_slot = Some(slot + self.min_interval);
    }
}
