//! Monotonicity filter for incoming market events.

use chrono::{DateTime, Utc};
use tradebot_core::types::MarketEvent;

/// Verdict for one incoming event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admit {
    /// Forward to the engine.
    Accept,
    /// Same sequence number seen again.
    DuplicateSequence,
    /// Sequence number lower than one already seen.
    StaleSequence,
    /// Timestamp moved backwards.
    BackwardsTimestamp,
}

impl Admit {
    /// Whether the event should be dropped.
    pub fn is_drop(&self) -> bool {
        *self != Admit::Accept
    }
}

/// Tracks the last sequence number and timestamp seen on a stream and
/// rejects anything that would violate ordering. Dropped events are
/// counted, never forwarded.
#[derive(Debug, Default)]
pub struct SequenceGuard {
    last_sequence: Option<u64>,
    last_timestamp: Option<DateTime<Utc>>,
    dropped: u64,
}

impl SequenceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Judge one event, updating internal state.
    pub fn admit(&mut self, event: &MarketEvent) -> Admit {
        if let Some(last) = self.last_sequence {
            if event.sequence == last {
                self.dropped += 1;
                return Admit::DuplicateSequence;
            }
            if event.sequence < last {
                self.dropped += 1;
                return Admit::StaleSequence;
            }
        }
        if let Some(last_ts) = self.last_timestamp {
            if event.timestamp < last_ts {
                self.dropped += 1;
                return Admit::BackwardsTimestamp;
            }
        }

        self.last_sequence = Some(event.sequence);
        self.last_timestamp = Some(event.timestamp);
        Admit::Accept
    }

    /// Last accepted sequence number, if any.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Events dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Forget the sequence floor but keep the timestamp floor. Used
    /// after a reconnect when the transport may restart its numbering;
    /// time still must not move backwards.
    pub fn resync(&mut self) {
        self.last_sequence = None;
    }
}
