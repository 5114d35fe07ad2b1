//! Engine lifecycle events delivered to notifier sinks.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::Side;

/// A lifecycle event emitted by the engine.
///
/// Delivery is best-effort and fire-and-forget: sinks must never block
/// the engine loop, and the engine never retries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    OrderSubmitted {
        order_id: Uuid,
        symbol: String,
        side: Side,
        quantity: Decimal,
    },
    OrderFilled {
        order_id: Uuid,
        fill_id: Uuid,
        quantity: Decimal,
        price: Decimal,
        remaining: Decimal,
    },
    OrderRejected {
        order_id: Uuid,
        reason: String,
    },
    GapDetected {
        dropped: u64,
        at: DateTime<Utc>,
    },
    EngineFaulted {
        reason: String,
    },
    EngineStopped,
}
