// Session pacing
//
// Every one-second boundary of an epoch or countdown is a suspension point on
// a `Ticker`. Production runs use the tokio timer; tests and demos use the
// instant ticker, which keeps the same event sequence with zero delay.

use async_trait::async_trait;
use std::time::Duration;

/// Source of real-time suspension for the session state machine
#[async_trait]
pub trait Ticker: Send + Sync {
    /// Suspend for `duration` (or not at all, for accelerated tickers)
    async fn sleep(&self, duration: Duration);

    /// Whether waits collapse to zero
    fn is_accelerated(&self) -> bool;
}

/// Wall-clock pacing backed by `tokio::time::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct RealTimeTicker;

#[async_trait]
impl Ticker for RealTimeTicker {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn is_accelerated(&self) -> bool {
        false
    }
}

/// Zero-delay pacing for tests and fast runs
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantTicker;

#[async_trait]
impl Ticker for InstantTicker {
    async fn sleep(&self, _duration: Duration) {
        tokio::task::yield_now().await;
    }

    fn is_accelerated(&self) -> bool {
        true
    }
}

/// Pick the ticker for a session: accelerated when `fast_mode` is set
pub fn ticker_for(fast_mode: bool) -> std::sync::Arc<dyn Ticker> {
    if fast_mode {
        std::sync::Arc::new(InstantTicker)
    } else {
        std::sync::Arc::new(RealTimeTicker)
    }
}

pub(crate) const ONE_SECOND: Duration = Duration::from_secs(1);

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_instant_ticker_does_not_wait() {
        let ticker = InstantTicker;
        let started = Instant::now();
        for _ in 0..100 {
            ticker.sleep(ONE_SECOND).await;
        }
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(ticker.is_accelerated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_real_time_ticker_advances_clock() {
        let ticker = RealTimeTicker;
        let started = tokio::time::Instant::now();
        ticker.sleep(Duration::from_secs(3)).await;
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(!ticker.is_accelerated());
    }
}
