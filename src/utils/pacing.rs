use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// Fixed-interval gate: consecutive `ready()` calls return at least `interval`
/// apart. The first call never waits.
#[derive(Debug)]
pub struct RequestPacer {
    interval: Duration,
    last_release: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_release: Mutex::new(None),
        }
    }

    pub fn unpaced() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn ready(&self) {
        let mut last_release = self.last_release.lock().await;
        if let Some(previous) = *last_release {
            let next = previous + self.interval;
            if next > Instant::now() {
                trace!(target: "app::xbox", wait_ms = (next - Instant::now()).as_millis() as u64, "pacing request");
                sleep_until(next).await;
            }
        }
        *last_release = Some(Instant::now());
    }
}
