use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::core::config::rate_limit;

/// Sliding-window rate limiter for incoming messages.
///
/// Each user may send at most `max_requests` messages within any `window`.
/// Protects the bot (and the leader's inbox) from flooding.
#[derive(Clone)]
pub struct RateLimiter {
    /// Timestamps of accepted requests per user, oldest first
    requests: Arc<Mutex<HashMap<i64, VecDeque<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Creates a limiter with the default 5 messages per 60 seconds.
    pub fn new() -> Self {
        Self::with_limits(rate_limit::MAX_REQUESTS, rate_limit::window())
    }

    /// Creates a limiter with custom limits.
    ///
    /// # Arguments
    ///
    /// * `max_requests` - Messages accepted per user within `window`
    /// * `window` - Length of the sliding window
    pub fn with_limits(max_requests: usize, window: Duration) -> Self {
        Self {
            requests: Arc::new(Mutex::new(HashMap::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    /// Records a request if the user is under the limit.
    ///
    /// # Returns
    ///
    /// `None` if the request is allowed (and now counted), or
    /// `Some(remaining)` with the time until the oldest request leaves the window.
    pub async fn try_acquire(&self, user_id: i64) -> Option<Duration> {
        let now = Instant::now();
        let mut requests = self.requests.lock().await;
        let timestamps = requests.entry(user_id).or_default();

        while let Some(&oldest) = timestamps.front() {
            if now.duration_since(oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.max_requests {
            let oldest = timestamps.front().copied().unwrap_or(now);
            return Some(self.window.saturating_sub(now.duration_since(oldest)));
        }

        timestamps.push_back(now);
        None
    }

    /// Removes the history for a user.
    pub async fn remove_rate_limit(&self, user_id: i64) {
        let mut requests = self.requests.lock().await;
        requests.remove(&user_id);
    }

    /// Drops users whose whole history has aged out of the window.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let window = self.window;
        let mut requests = self.requests.lock().await;
        requests.retain(|_, timestamps| timestamps.back().is_some_and(|last| now.duration_since(*last) < window));
    }

    /// Number of users currently tracked.
    pub async fn tracked_users(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allows_up_to_limit() {
        let limiter = RateLimiter::with_limits(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.try_acquire(1).await.is_none());
        }
        let wait = limiter.try_acquire(1).await;
        assert!(wait.is_some());
        assert!(wait.unwrap() <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let limiter = RateLimiter::with_limits(1, Duration::from_secs(60));
        assert!(limiter.try_acquire(1).await.is_none());
        assert!(limiter.try_acquire(1).await.is_some());
        assert!(limiter.try_acquire(2).await.is_none());
    }

    #[tokio::test]
    async fn test_window_slides() {
        let limiter = RateLimiter::with_limits(1, Duration::from_millis(50));
        assert!(limiter.try_acquire(1).await.is_none());
        assert!(limiter.try_acquire(1).await.is_some());
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(limiter.try_acquire(1).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_and_cleanup() {
        let limiter = RateLimiter::with_limits(1, Duration::from_millis(20));
        limiter.try_acquire(1).await;
        limiter.try_acquire(2).await;
        assert_eq!(limiter.tracked_users().await, 2);

        limiter.remove_rate_limit(1).await;
        assert_eq!(limiter.tracked_users().await, 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        limiter.cleanup().await;
        assert_eq!(limiter.tracked_users().await, 0);
    }
}
