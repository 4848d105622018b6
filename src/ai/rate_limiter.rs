// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Rate Limiter (C6): sliding 60-second window over judge calls. A
//! bounded deque of timestamps plus a single mutex suffices — no atomics,
//! no dedicated timer threads, since contention is low (one classifier
//! per process).

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const WINDOW: Duration = Duration::from_secs(60);

pub struct RateLimiter {
    capacity: usize,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Evicts timestamps older than 60 s; if at capacity, sleeps until
    /// the oldest timestamp would fall out of the window, then
    /// re-checks, before admitting the call.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut timestamps = self.timestamps.lock().await;
                let now = Instant::now();
                while timestamps
                    .front()
                    .map(|t| now.duration_since(*t) >= WINDOW)
                    .unwrap_or(false)
                {
                    timestamps.pop_front();
                }

                if timestamps.len() < self.capacity {
                    timestamps.push_back(now);
                    None
                } else {
                    let oldest = *timestamps.front().unwrap();
                    Some(WINDOW - now.duration_since(oldest))
                }
            };

            match wait {
                None => return,
                Some(duration) => tokio::time::sleep(duration).await,
            }
        }
    }

    pub async fn current_count(&self) -> usize {
        self.timestamps.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_calls_up_to_capacity_without_blocking() {
        let limiter = RateLimiter::new(3);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(200));
        assert_eq!(limiter.current_count().await, 3);
    }

    #[tokio::test]
    async fn evicts_timestamps_outside_window() {
        let limiter = RateLimiter::new(1);
        limiter.acquire().await;
        assert_eq!(limiter.current_count().await, 1);

        {
            let mut ts = limiter.timestamps.lock().await;
            let t = ts.pop_front().unwrap();
            ts.push_back(t - Duration::from_secs(61));
        }

        limiter.acquire().await;
        assert_eq!(limiter.current_count().await, 1);
    }
}
