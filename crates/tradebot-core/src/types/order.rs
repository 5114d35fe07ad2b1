//! Order lifecycle types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Get the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Get the sign for position calculations (+1 for buy, -1 for sell).
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => -Decimal::ONE,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    /// Execute at the best available price.
    Market,
    /// Execute at the limit price or better.
    Limit,
}

/// A strategy's request to buy or sell, before execution.
///
/// Created by the strategy with a client-generated id; owned by the
/// engine until the order reaches a terminal state. `created_at` must
/// come from the engine clock so that backtests are reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    /// Client-generated order id
    pub id: Uuid,
    /// Symbol to trade
    pub symbol: String,
    /// Buy or sell
    pub side: Side,
    /// Quantity to trade
    pub quantity: Decimal,
    /// Market or limit
    pub kind: OrderKind,
    /// Limit price (limit orders only)
    pub limit_price: Option<Decimal>,
    /// Logical creation time
    pub created_at: DateTime<Utc>,
}

impl OrderIntent {
    /// Create a market order intent.
    pub fn market(
        symbol: impl Into<String>,
        side: Side,
        quantity: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            side,
            quantity,
            kind: OrderKind::Market,
            limit_price: None,
            created_at,
        }
    }

    /// Create a limit order intent.
    pub fn limit(
        symbol: impl Into<String>,
        side: Side,
        quantity: Decimal,
        limit_price: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            side,
            quantity,
            kind: OrderKind::Limit,
            limit_price: Some(limit_price),
            created_at,
        }
    }
}

/// Order status.
///
/// Terminal states are final; the ledger rejects any further mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted by the broker, no fills yet
    Pending,
    /// Some quantity filled, more outstanding
    PartiallyFilled,
    /// Completely filled
    Filled,
    /// Rejected by the broker
    Rejected,
    /// Cancelled before completion
    Cancelled,
}

impl OrderStatus {
    /// Check if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Rejected | OrderStatus::Cancelled
        )
    }

    /// Check if the order can still receive fills.
    pub fn is_active(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::PartiallyFilled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Confirmation that some or all of an order executed at a price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    /// Fill id, unique per execution
    pub id: Uuid,
    /// Order this fill belongs to
    pub order_id: Uuid,
    /// Quantity filled
    pub quantity: Decimal,
    /// Execution price
    pub price: Decimal,
    /// Execution timestamp
    pub timestamp: DateTime<Utc>,
}

/// Current state of one order. Exactly one exists per intent id,
/// owned and mutated only by the engine's event loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderState {
    /// The originating intent
    pub intent: OrderIntent,
    /// Current status
    pub status: OrderStatus,
    /// Quantity filled so far
    pub filled_quantity: Decimal,
    /// Average fill price across all fills
    pub avg_fill_price: Option<Decimal>,
    /// Rejection reason, if rejected
    pub reject_reason: Option<String>,
    /// When the state last changed
    pub updated_at: DateTime<Utc>,
}

impl OrderState {
    /// A freshly accepted order.
    pub fn pending(intent: OrderIntent) -> Self {
        let at = intent.created_at;
        Self {
            intent,
            status: OrderStatus::Pending,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: None,
            reject_reason: None,
            updated_at: at,
        }
    }

    /// A synchronously rejected order.
    pub fn rejected(intent: OrderIntent, reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            intent,
            status: OrderStatus::Rejected,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: None,
            reject_reason: Some(reason.into()),
            updated_at: at,
        }
    }

    /// Quantity still outstanding.
    pub fn remaining_quantity(&self) -> Decimal {
        self.intent.quantity - self.filled_quantity
    }

    /// Apply a fill, enforcing the order sum invariant.
    ///
    /// The sum of fill quantities never exceeds the intent quantity;
    /// once it reaches it the order transitions to `Filled` and any
    /// further fill is a protocol error. Overfills are rejected, never
    /// clamped.
    pub fn apply_fill(&mut self, fill: &Fill) -> Result<OrderStatus, ProtocolError> {
        if self.status.is_terminal() {
            return Err(ProtocolError::TerminalOrder {
                order_id: self.intent.id,
                status: self.status.to_string(),
            });
        }
        let remaining = self.remaining_quantity();
        if fill.quantity > remaining {
            return Err(ProtocolError::Overfill {
                order_id: self.intent.id,
                attempted: fill.quantity,
                remaining,
            });
        }

        let prev_value = self.avg_fill_price.unwrap_or(Decimal::ZERO) * self.filled_quantity;
        self.filled_quantity += fill.quantity;
        self.avg_fill_price =
            Some((prev_value + fill.price * fill.quantity) / self.filled_quantity);
        self.status = if self.filled_quantity == self.intent.quantity {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.updated_at = fill.timestamp;

        Ok(self.status)
    }

    /// Cancel the order if it is still active. Returns false if it was
    /// already terminal.
    pub fn cancel(&mut self, at: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = OrderStatus::Cancelled;
        self.updated_at = at;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fill_for(order_id: Uuid, quantity: Decimal, price: Decimal) -> Fill {
        Fill {
            id: Uuid::new_v4(),
            order_id,
            quantity,
            price,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_side_helpers() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.sign(), dec!(-1));
    }

    #[test]
    fn test_partial_then_full_fill() {
        let intent = OrderIntent::market("BTCUSD", Side::Buy, dec!(10), Utc::now());
        let id = intent.id;
        let mut state = OrderState::pending(intent);

        let status = state.apply_fill(&fill_for(id, dec!(4), dec!(100))).unwrap();
        assert_eq!(status, OrderStatus::PartiallyFilled);
        assert_eq!(state.remaining_quantity(), dec!(6));

        let status = state.apply_fill(&fill_for(id, dec!(6), dec!(110))).unwrap();
        assert_eq!(status, OrderStatus::Filled);
        assert_eq!(state.filled_quantity, dec!(10));
        assert_eq!(state.avg_fill_price, Some(dec!(106)));
    }

    #[test]
    fn test_overfill_rejected_not_clamped() {
        let intent = OrderIntent::market("BTCUSD", Side::Buy, dec!(5), Utc::now());
        let id = intent.id;
        let mut state = OrderState::pending(intent);

        let err = state.apply_fill(&fill_for(id, dec!(6), dec!(100))).unwrap_err();
        assert!(matches!(err, ProtocolError::Overfill { .. }));
        // State untouched after the rejected fill.
        assert_eq!(state.filled_quantity, Decimal::ZERO);
        assert_eq!(state.status, OrderStatus::Pending);
    }

    #[test]
    fn test_no_fill_after_terminal() {
        let intent = OrderIntent::market("BTCUSD", Side::Sell, dec!(1), Utc::now());
        let id = intent.id;
        let mut state = OrderState::pending(intent);

        state.apply_fill(&fill_for(id, dec!(1), dec!(100))).unwrap();
        assert_eq!(state.status, OrderStatus::Filled);

        let err = state.apply_fill(&fill_for(id, dec!(1), dec!(100))).unwrap_err();
        assert!(matches!(err, ProtocolError::TerminalOrder { .. }));
    }

    #[test]
    fn test_cancel_terminal_is_noop() {
        let intent = OrderIntent::limit("BTCUSD", Side::Buy, dec!(1), dec!(90), Utc::now());
        let mut state = OrderState::pending(intent);

        assert!(state.cancel(Utc::now()));
        assert_eq!(state.status, OrderStatus::Cancelled);
        assert!(!state.cancel(Utc::now()));
    }
}
