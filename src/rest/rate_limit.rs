// rest/rate_limit.rs — Per-IP sliding-window request limiter.

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::error::DependencyError;

/// Above this many tracked addresses, idle windows are swept on the next
/// check so the map cannot grow without bound.
const MAX_TRACKED_IPS: usize = 10_000;

/// A sliding-window counter: one timestamp per accepted request, evicted
/// once it ages past the window boundary.
struct SlidingWindow {
    window_secs: u64,
    events: VecDeque<DateTime<Utc>>,
}

impl SlidingWindow {
    fn new(window_secs: u64) -> Self {
        Self {
            window_secs,
            events: VecDeque::new(),
        }
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(self.window_secs as i64);
        while self.events.front().is_some_and(|t| *t <= cutoff) {
            self.events.pop_front();
        }
    }

    fn count_in_window(&mut self, now: DateTime<Utc>) -> u64 {
        self.evict(now);
        self.events.len() as u64
    }

    fn record(&mut self, at: DateTime<Utc>) {
        self.events.push_back(at);
    }
}

pub struct RateLimiter {
    window_secs: u64,
    max_requests: u64,
    windows: Mutex<HashMap<IpAddr, SlidingWindow>>,
}

impl RateLimiter {
    pub fn new(window_secs: u64, max_requests: u64) -> Self {
        Self {
            window_secs,
            max_requests,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record one request from `ip`, returning `false` once the cap is hit.
    pub async fn allow(&self, ip: IpAddr) -> bool {
        self.allow_at(ip, Utc::now()).await
    }

    async fn allow_at(&self, ip: IpAddr, now: DateTime<Utc>) -> bool {
        let mut windows = self.windows.lock().await;
        if windows.len() > MAX_TRACKED_IPS {
            windows.retain(|_, w| w.count_in_window(now) > 0);
        }
        let window = windows
            .entry(ip)
            .or_insert_with(|| SlidingWindow::new(self.window_secs));
        if window.count_in_window(now) >= self.max_requests {
            return false;
        }
        window.record(now);
        true
    }
}

pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, DependencyError> {
    if !limiter.allow(addr.ip()).await {
        return Err(DependencyError::RateLimited);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([127, 0, 0, last])
    }

    #[tokio::test]
    async fn cap_is_enforced_per_ip() {
        let limiter = RateLimiter::new(60, 3);
        let now = Utc::now();
        for _ in 0..3 {
            assert!(limiter.allow_at(ip(1), now).await);
        }
        assert!(!limiter.allow_at(ip(1), now).await);
        // A different address has its own window.
        assert!(limiter.allow_at(ip(2), now).await);
    }

    #[tokio::test]
    async fn window_slides_open_again() {
        let limiter = RateLimiter::new(60, 2);
        let start = Utc::now();
        assert!(limiter.allow_at(ip(1), start).await);
        assert!(limiter.allow_at(ip(1), start).await);
        assert!(!limiter.allow_at(ip(1), start).await);
        let later = start + Duration::seconds(61);
        assert!(limiter.allow_at(ip(1), later).await);
    }
}
