use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

/// Source of epoch-millisecond timestamps written to the coordination store.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall-clock time. Use when several processes share one store.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Wall-clock time sampled once, then advanced by tokio's monotonic clock.
///
/// Deadlines computed from it agree with `tokio::time::sleep`, including
/// under a paused test runtime.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    epoch_ms: i64,
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            epoch_ms: Utc::now().timestamp_millis(),
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> i64 {
        self.epoch_ms + self.origin.elapsed().as_millis() as i64
    }
}

/// Sleep for `total`, never suspending longer than `cap` at a time.
pub async fn capped_sleep(total: Duration, cap: Duration) {
    let cap = cap.max(Duration::from_millis(1));
    let mut remaining = total;
    while !remaining.is_zero() {
        let chunk = remaining.min(cap);
        tokio::time::sleep(chunk).await;
        remaining -= chunk;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_paused_time() {
        let clock = TokioClock::new();
        let t0 = clock.now_millis();
        tokio::time::sleep(Duration::from_millis(1_250)).await;
        assert_eq!(clock.now_millis() - t0, 1_250);
    }

    #[tokio::test(start_paused = true)]
    async fn capped_sleep_covers_full_duration() {
        let start = Instant::now();
        capped_sleep(Duration::from_millis(2_500), Duration::from_millis(1_000)).await;
        assert_eq!(start.elapsed(), Duration::from_millis(2_500));
    }

    #[tokio::test(start_paused = true)]
    async fn capped_sleep_zero_returns_immediately() {
        let start = Instant::now();
        capped_sleep(Duration::ZERO, Duration::from_secs(1)).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn system_clock_is_epoch_millis() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }
}
