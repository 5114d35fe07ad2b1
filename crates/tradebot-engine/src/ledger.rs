//! Order ledger: the engine's authoritative order book.

use std::collections::{HashMap, HashSet};
use tracing::warn;
use tradebot_core::error::ProtocolError;
use tradebot_core::types::{Fill, OrderState, OrderStatus};
use uuid::Uuid;

/// Outcome of applying a fill to the ledger.
#[derive(Debug)]
pub enum FillOutcome {
    /// The fill was applied; carries the resulting order status.
    Applied {
        status: OrderStatus,
        remaining: rust_decimal::Decimal,
    },
    /// Same fill id seen before; no effect.
    Duplicate,
    /// Protocol violation; no effect. The operation is rejected, never
    /// repaired.
    Violation(ProtocolError),
}

/// Exactly one [`OrderState`] per intent id, mutated only by the engine
/// task, plus the fill-id dedup set that makes fill application
/// idempotent.
#[derive(Debug, Default)]
pub struct OrderLedger {
    orders: HashMap<Uuid, OrderState>,
    seen_fills: HashSet<Uuid>,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a broker-accepted (or rejected) order state. Returns
    /// false if the id was already present.
    pub fn record(&mut self, order: OrderState) -> bool {
        let id = order.intent.id;
        if self.orders.contains_key(&id) {
            warn!(order_id = %id, "duplicate order id in ledger, keeping original");
            return false;
        }
        self.orders.insert(id, order);
        true
    }

    /// Whether an intent id is already known.
    pub fn contains(&self, order_id: Uuid) -> bool {
        self.orders.contains_key(&order_id)
    }

    pub fn get(&self, order_id: Uuid) -> Option<&OrderState> {
        self.orders.get(&order_id)
    }

    /// Ids of orders that can still receive fills.
    pub fn active_ids(&self) -> Vec<Uuid> {
        self.orders
            .values()
            .filter(|order| order.status.is_active())
            .map(|order| order.intent.id)
            .collect()
    }

    /// Apply a fill, idempotently.
    ///
    /// Duplicate fill ids are no-ops. Fills for unknown orders and
    /// fills exceeding the remaining quantity are rejected without
    /// mutating anything.
    pub fn apply_fill(&mut self, fill: &Fill) -> FillOutcome {
        if self.seen_fills.contains(&fill.id) {
            return FillOutcome::Duplicate;
        }
        let Some(order) = self.orders.get_mut(&fill.order_id) else {
            return FillOutcome::Violation(ProtocolError::UnknownOrder(fill.order_id));
        };
        match order.apply_fill(fill) {
            Ok(status) => {
                self.seen_fills.insert(fill.id);
                FillOutcome::Applied {
                    status,
                    remaining: order.remaining_quantity(),
                }
            }
            Err(e) => FillOutcome::Violation(e),
        }
    }

    /// Cancel every still-active order. Returns the cancelled ids.
    pub fn cancel_active(&mut self, at: chrono::DateTime<chrono::Utc>) -> Vec<Uuid> {
        let mut cancelled = Vec::new();
        for order in self.orders.values_mut() {
            if order.status.is_active() && order.cancel(at) {
                cancelled.push(order.intent.id);
            }
        }
        cancelled
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tradebot_core::types::{OrderIntent, Side};

    fn pending(quantity: Decimal) -> OrderState {
        OrderState::pending(OrderIntent::market("AAPL", Side::Buy, quantity, Utc::now()))
    }

    fn fill_for(order_id: Uuid, quantity: Decimal) -> Fill {
        Fill {
            id: Uuid::new_v4(),
            order_id,
            quantity,
            price: dec!(100),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_duplicate_fill_is_noop() {
        let mut ledger = OrderLedger::new();
        let order = pending(dec!(2));
        let order_id = order.intent.id;
        ledger.record(order);

        let fill = fill_for(order_id, dec!(1));
        assert!(matches!(
            ledger.apply_fill(&fill),
            FillOutcome::Applied { status: OrderStatus::PartiallyFilled, .. }
        ));
        assert!(matches!(ledger.apply_fill(&fill), FillOutcome::Duplicate));
        assert_eq!(ledger.get(order_id).unwrap().filled_quantity, dec!(1));
    }

    #[test]
    fn test_unknown_order_rejected() {
        let mut ledger = OrderLedger::new();
        let fill = fill_for(Uuid::new_v4(), dec!(1));
        assert!(matches!(
            ledger.apply_fill(&fill),
            FillOutcome::Violation(ProtocolError::UnknownOrder(_))
        ));
    }

    #[test]
    fn test_overfill_rejected_without_mutation() {
        let mut ledger = OrderLedger::new();
        let order = pending(dec!(1));
        let order_id = order.intent.id;
        ledger.record(order);

        let fill = fill_for(order_id, dec!(5));
        assert!(matches!(
            ledger.apply_fill(&fill),
            FillOutcome::Violation(ProtocolError::Overfill { .. })
        ));
        assert_eq!(ledger.get(order_id).unwrap().filled_quantity, Decimal::ZERO);

        // The rejected fill id was not consumed; a corrected fill with
        // a fresh id still applies.
        let fill = fill_for(order_id, dec!(1));
        assert!(matches!(
            ledger.apply_fill(&fill),
            FillOutcome::Applied { status: OrderStatus::Filled, .. }
        ));
    }

    #[test]
    fn test_fill_after_terminal_rejected() {
        let mut ledger = OrderLedger::new();
        let order = pending(dec!(1));
        let order_id = order.intent.id;
        ledger.record(order);

        ledger.apply_fill(&fill_for(order_id, dec!(1)));
        assert!(matches!(
            ledger.apply_fill(&fill_for(order_id, dec!(1))),
            FillOutcome::Violation(ProtocolError::TerminalOrder { .. })
        ));
    }

    #[test]
    fn test_record_rejects_duplicate_id() {
        let mut ledger = OrderLedger::new();
        let order = pending(dec!(1));
        assert!(ledger.record(order.clone()));
        assert!(!ledger.record(order));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_cancel_active_skips_terminal() {
        let mut ledger = OrderLedger::new();
        let filled = pending(dec!(1));
        let filled_id = filled.intent.id;
        let open = pending(dec!(1));
        let open_id = open.intent.id;
        ledger.record(filled);
        ledger.record(open);
        ledger.apply_fill(&fill_for(filled_id, dec!(1)));

        let cancelled = ledger.cancel_active(Utc::now());
        assert_eq!(cancelled, vec![open_id]);
        assert_eq!(ledger.get(filled_id).unwrap().status, OrderStatus::Filled);
    }
}
