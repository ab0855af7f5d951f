use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
///
/// Cloning shares the underlying call log, so every clone draws from the same quota.
#[derive(Clone)]
pub struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
    margin: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self::with_margin(max_requests, window, Duration::from_millis(100))
    }

    pub fn with_margin(max_requests: usize, window: Duration, margin: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::with_capacity(max_requests))),
            max_requests: max_requests.max(1),
            window,
            margin,
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait for a free slot in the window, then record the call.
    pub async fn admit(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            // Remove timestamps outside the window
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Wait until the oldest call falls out of the window, then re-check
            let sleep_dur = match ts.front() {
                Some(&oldest) => (oldest + self.window).saturating_duration_since(now) + self.margin,
                None => self.margin,
            };
            drop(ts);
            tracing::info!("TwelveData rate limit hit, sleeping {:.1}s", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }

    /// Calls recorded inside the current window.
    pub async fn in_window(&self) -> usize {
        let ts = self.timestamps.lock().await;
        let now = Instant::now();
        ts.iter().filter(|&&t| now.duration_since(t) < self.window).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    async fn admit_concurrently(limiter: &RateLimiter, callers: usize) -> Vec<Instant> {
        let admitted = Arc::new(StdMutex::new(Vec::new()));
        let mut handles = Vec::new();
        for _ in 0..callers {
            let limiter = limiter.clone();
            let admitted = Arc::clone(&admitted);
            handles.push(tokio::spawn(async move {
                limiter.admit().await;
                admitted.lock().unwrap().push(Instant::now());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let mut times = admitted.lock().unwrap().clone();
        times.sort();
        times
    }

    #[tokio::test(start_paused = true)]
    async fn test_admits_up_to_limit_without_waiting() {
        let limiter = RateLimiter::new(8, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..8 {
            limiter.admit().await;
        }
        assert_eq!(Instant::now(), start);
        assert_eq!(limiter.in_window().await, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ninth_and_tenth_calls_wait_for_window() {
        let limiter = RateLimiter::new(8, Duration::from_secs(60));
        let start = Instant::now();
        let times = admit_concurrently(&limiter, 10).await;

        assert_eq!(times.len(), 10);
        for t in &times[..8] {
            assert_eq!(*t, start);
        }
        for t in &times[8..] {
            assert!(t.duration_since(start) >= Duration::from_secs(60));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_limit_in_any_window() {
        let limit = 3;
        let window = Duration::from_secs(10);
        let limiter = RateLimiter::new(limit, window);
        let times = admit_concurrently(&limiter, 11).await;

        // Any limit+1 consecutive admissions must span at least one full window
        for pair in times.windows(limit + 1) {
            assert!(pair[limit].duration_since(pair[0]) >= window);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slots_free_up_after_window() {
        let limiter = RateLimiter::with_margin(2, Duration::from_secs(5), Duration::ZERO);
        limiter.admit().await;
        limiter.admit().await;
        tokio::time::advance(Duration::from_secs(5)).await;
        let before = Instant::now();
        limiter.admit().await;
        assert_eq!(Instant::now(), before);
    }
}
