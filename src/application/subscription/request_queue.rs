//! Request queue for on-demand snapshot fetches.
//!
//! Every caller shares one FIFO lane: at most one request runs at a time and
//! successive requests *start* at least `min_spacing` apart. A failing
//! request only fails its own caller.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Serializes and spaces out on-demand requests.
#[derive(Debug)]
pub struct RequestQueue {
    min_spacing: Duration,
    last_started: Mutex<Option<Instant>>,
}

impl RequestQueue {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last_started: Mutex::new(None),
        }
    }

    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Runs `request` once every earlier caller has finished and the spacing
    /// since the previous start has elapsed.
    ///
    /// Waiters are served in arrival order (`tokio::sync::Mutex` is fair).
    pub async fn enqueue<F, Fut, T>(&self, request: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut last_started = self.last_started.lock().await;

        if let Some(previous) = *last_started {
            let ready_at = previous + self.min_spacing;
            if Instant::now() < ready_at {
                tracing::trace!(
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "Spacing out queued request"
                );
                sleep_until(ready_at).await;
            }
        }

        *last_started = Some(Instant::now());
        request().await
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn first_request_starts_immediately() {
        let queue = RequestQueue::new(Duration::from_secs(1));
        let started = Instant::now();

        let value = queue.enqueue(|| async { 7 }).await;

        assert_eq!(value, 7);
        assert_eq!(Instant::now(), started);
    }

    #[tokio::test(start_paused = true)]
    async fn successive_starts_are_spaced() {
        let queue = Arc::new(RequestQueue::new(Duration::from_secs(1)));
        let origin = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                queue.enqueue(|| async { Instant::now() }).await
            }));
        }

        let mut starts = Vec::new();
        for handle in handles {
            starts.push(handle.await.unwrap() - origin);
        }
        starts.sort();

        assert_eq!(
            starts,
            vec![Duration::ZERO, Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_request_in_flight() {
        let queue = Arc::new(RequestQueue::new(Duration::from_millis(10)));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let (queue, in_flight, peak) = (queue.clone(), in_flight.clone(), peak.clone());
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(|| async {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_does_not_poison_queue() {
        let queue = RequestQueue::new(Duration::from_secs(1));

        let failed: Result<(), &str> = queue.enqueue(|| async { Err("boom") }).await;
        let succeeded: Result<u8, &str> = queue.enqueue(|| async { Ok(1) }).await;

        assert!(failed.is_err());
        assert_eq!(succeeded, Ok(1));
    }
}
