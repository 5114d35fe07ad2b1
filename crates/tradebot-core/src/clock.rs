//! Logical time source for the engine.
//!
//! Strategies must never read the wall clock directly: elapsed-time
//! logic goes through [`EngineClock`] so that a backtest replay of a
//! recorded session observes exactly the same clock readings as the
//! live run did.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Logical time source.
///
/// In live mode this is the wall clock. In backtest mode it is driven
/// by the timestamp of the market event currently being processed.
#[derive(Debug, Clone)]
pub enum EngineClock {
    /// Wall-clock time (live mode).
    Wall,
    /// Simulated time in unix milliseconds, advanced by the engine.
    Simulated(Arc<AtomicI64>),
}

impl EngineClock {
    /// Create a wall clock for live runs.
    pub fn wall() -> Self {
        EngineClock::Wall
    }

    /// Create a simulated clock starting at the unix epoch.
    pub fn simulated() -> Self {
        EngineClock::Simulated(Arc::new(AtomicI64::new(0)))
    }

    /// Current logical time.
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            EngineClock::Wall => Utc::now(),
            EngineClock::Simulated(millis) => {
                let ms = millis.load(Ordering::Acquire);
                Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
            }
        }
    }

    /// Advance simulated time to `ts`. No-op on a wall clock, and never
    /// moves simulated time backwards.
    pub fn advance_to(&self, ts: DateTime<Utc>) {
        if let EngineClock::Simulated(millis) = self {
            millis.fetch_max(ts.timestamp_millis(), Ordering::AcqRel);
        }
    }

    /// Whether this clock is simulated (backtest mode).
    pub fn is_simulated(&self) -> bool {
        matches!(self, EngineClock::Simulated(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_clock_advances() {
        let clock = EngineClock::simulated();
        assert_eq!(clock.now().timestamp_millis(), 0);

        let ts = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        clock.advance_to(ts);
        assert_eq!(clock.now(), ts);
    }

    #[test]
    fn test_simulated_clock_never_rewinds() {
        let clock = EngineClock::simulated();
        let later = Utc.timestamp_millis_opt(2_000).unwrap();
        let earlier = Utc.timestamp_millis_opt(1_000).unwrap();

        clock.advance_to(later);
        clock.advance_to(earlier);
        assert_eq!(clock.now(), later);
    }

    #[test]
    fn test_clones_share_time() {
        let clock = EngineClock::simulated();
        let view = clock.clone();

        clock.advance_to(Utc.timestamp_millis_opt(5_000).unwrap());
        assert_eq!(view.now().timestamp_millis(), 5_000);
    }
}
