use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

/// Serialises requests and keeps a minimum gap between them.
///
/// The gap is measured from the completion of one request to the start of
/// the next, and the lock is held for the whole request, so at most one
/// request per throttle is ever in flight.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Waits for the next slot, then runs `request`
    pub async fn run<F, T>(&self, request: F) -> T
    where
        F: Future<Output = T>,
    {
        let mut last_request = self.last_request.lock().await;

        if let Some(previous) = *last_request {
            sleep_until(previous + self.min_interval).await;
        }

        let output = request.await;
        *last_request = Some(Instant::now());
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_request_is_not_delayed() {
        let throttle = Throttle::new(Duration::from_secs(5));
        let start = std::time::Instant::now();

        let value = throttle.run(async { 7 }).await;

        assert_eq!(value, 7);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_consecutive_requests_are_spaced() {
        let throttle = Throttle::new(Duration::from_millis(60));
        let start = std::time::Instant::now();

        throttle.run(async {}).await;
        throttle.run(async {}).await;
        throttle.run(async {}).await;

        assert!(start.elapsed() >= Duration::from_millis(120));
    }
}
