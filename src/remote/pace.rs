//! Fixed-window request pacing
//!
//! Caps how many requests may *start* within each time window, independent of
//! how many are in flight. Search-driven exports fan out quickly, so the
//! export engine paces every fetch through one of these.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Default pacing window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Window {
    started: Instant,
    used: usize,
}

/// Allows `per_window` acquisitions per `window`
#[derive(Debug)]
pub struct Pacer {
    per_window: usize,
    window: Duration,
    state: Mutex<Window>,
}

impl Pacer {
    pub fn new(per_window: usize, window: Duration) -> Self {
        Self {
            per_window: per_window.max(1),
            window,
            state: Mutex::new(Window {
                started: Instant::now(),
                used: 0,
            }),
        }
    }

    /// Waits until a slot in the current (or a later) window is free
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let elapsed = state.started.elapsed();

                if elapsed >= self.window {
                    state.started = Instant::now();
                    state.used = 0;
                }

                if state.used < self.per_window {
                    state.used += 1;
                    return;
                }

                self.window.saturating_sub(state.started.elapsed())
            };

            sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn limits_per_window() {
        let pacer = Pacer::new(2, Duration::from_secs(1));
        let start = Instant::now();

        for _ in 0..5 {
            pacer.acquire().await;
        }

        // 2 in the first window, 2 in the second, 1 in the third
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn no_wait_under_limit() {
        let pacer = Pacer::new(10, Duration::from_secs(1));
        let start = Instant::now();

        for _ in 0..10 {
            pacer.acquire().await;
        }

        assert!(start.elapsed() < Duration::from_millis(1));
    }
}
