use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Fixed-interval gate: consecutive `acquire` calls return at least
/// `min_interval` apart. Shared by every request a client makes.
pub struct RateGate {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// OpenAlex asks polite clients to stay under 10 requests per second.
    pub fn polite() -> Self {
        Self::new(Duration::from_millis(100))
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the next request slot is open, then claim it.
    pub async fn acquire(&self) {
        let mut next = self.next_slot.lock().await;
        if let Some(at) = *next {
            if at > Instant::now() {
                tokio::time::sleep_until(at).await;
            }
        }
        *next = Some(Instant::now() + self.min_interval);
    }
}
