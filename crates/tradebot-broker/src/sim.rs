//! Simulated broker for backtests.
//!
//! The central correctness requirement is the absence of look-ahead
//! bias: matching only ever uses market events the strategy has already
//! been shown. The engine feeds each event through
//! [`Broker::on_market_event`] before the strategy's new intents are
//! submitted, so an order first becomes eligible on the event *after*
//! the one that produced it — a market order fills at the next close, a
//! limit order when a later event's [low, high] range crosses the limit
//! price. At end of stream a still-pending market order is flushed at
//! the last observed close (information the strategy already had);
//! resting limit orders are auto-cancelled.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tradebot_core::clock::EngineClock;
use tradebot_core::error::BrokerError;
use tradebot_core::traits::Broker;
use tradebot_core::types::{Fill, MarketEvent, OrderIntent, OrderKind, OrderState, Side};
use tracing::debug;
use uuid::Uuid;

struct SimState {
    /// One state per intent id, ever. Also the duplicate-id record.
    orders: HashMap<Uuid, OrderState>,
    /// Active order ids in submission order, for deterministic matching.
    pending: Vec<Uuid>,
    /// Cash mirror used for balance checks at submission time.
    cash: Decimal,
    /// Last observed close per symbol, for market-order cost estimates.
    marks: HashMap<String, Decimal>,
    /// Closed after end of stream; no further submissions.
    fills_tx: Option<mpsc::Sender<Fill>>,
}

/// Simulated order execution against historical data.
pub struct SimBroker {
    state: Mutex<SimState>,
    fills_rx: Mutex<Option<mpsc::Receiver<Fill>>>,
    clock: EngineClock,
}

impl SimBroker {
    /// Create a simulated broker with a starting cash balance.
    pub fn new(initial_cash: Decimal, clock: EngineClock) -> Self {
        let (fills_tx, fills_rx) = mpsc::channel(1024);
        Self {
            state: Mutex::new(SimState {
                orders: HashMap::new(),
                pending: Vec::new(),
                cash: initial_cash,
                marks: HashMap::new(),
                fills_tx: Some(fills_tx),
            }),
            fills_rx: Mutex::new(Some(fills_rx)),
            clock,
        }
    }

    /// Current state of an order, if known.
    pub fn order(&self, order_id: Uuid) -> Option<OrderState> {
        self.state.lock().unwrap().orders.get(&order_id).cloned()
    }

    fn validate(state: &SimState, intent: &OrderIntent) -> Option<String> {
        if intent.quantity <= Decimal::ZERO {
            return Some("non-positive quantity".to_string());
        }
        if intent.kind == OrderKind::Limit && intent.limit_price.is_none() {
            return Some("limit order without limit price".to_string());
        }
        if intent.side == Side::Buy {
            // Estimate cost at the limit price or the last mark.
            let estimate = intent
                .limit_price
                .or_else(|| state.marks.get(&intent.symbol).copied());
            if let Some(price) = estimate {
                let cost = price * intent.quantity;
                if cost > state.cash {
                    return Some(format!(
                        "insufficient balance: required {cost}, available {}",
                        state.cash
                    ));
                }
            }
        }
        None
    }

    /// Matching rule for one pending order against one event. Returns
    /// the fill price if the order executes.
    fn match_price(order: &OrderState, event: &MarketEvent) -> Option<Decimal> {
        if order.intent.symbol != event.symbol {
            return None;
        }
        match order.intent.kind {
            OrderKind::Market => Some(event.close),
            OrderKind::Limit => {
                let limit = order.intent.limit_price?;
                let crossed = match order.intent.side {
                    Side::Buy => event.low <= limit,
                    Side::Sell => event.high >= limit,
                };
                crossed.then_some(limit)
            }
        }
    }
}

#[async_trait]
impl Broker for SimBroker {
    async fn submit(&self, intent: &OrderIntent) -> Result<OrderState, BrokerError> {
        let mut state = self.state.lock().unwrap();

        if state.orders.contains_key(&intent.id) {
            return Err(BrokerError::DuplicateOrder(intent.id));
        }
        if state.fills_tx.is_none() {
            return Ok(OrderState::rejected(
                intent.clone(),
                "stream ended",
                self.clock.now(),
            ));
        }

        let order = match Self::validate(&state, intent) {
            Some(reason) => OrderState::rejected(intent.clone(), reason, self.clock.now()),
            None => {
                state.pending.push(intent.id);
                OrderState::pending(intent.clone())
            }
        };
        state.orders.insert(intent.id, order.clone());
        Ok(order)
    }

    async fn cancel(&self, order_id: Uuid) -> Result<bool, BrokerError> {
        let mut state = self.state.lock().unwrap();
        let now = self.clock.now();
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(BrokerError::OrderNotFound(order_id))?;
        let cancelled = order.cancel(now);
        if cancelled {
            state.pending.retain(|id| *id != order_id);
        }
        Ok(cancelled)
    }

    fn fills(&self) -> Option<mpsc::Receiver<Fill>> {
        self.fills_rx.lock().unwrap().take()
    }

    async fn on_market_event(&self, event: &MarketEvent) {
        // Collect fills under the lock, send after releasing it.
        let (fills, tx) = {
            let mut state = self.state.lock().unwrap();
            let state = &mut *state;
            let Some(tx) = state.fills_tx.clone() else {
                return;
            };
            state.marks.insert(event.symbol.clone(), event.close);

            let mut fills = Vec::new();
            let mut still_pending = Vec::new();
            let pending = std::mem::take(&mut state.pending);
            for order_id in pending {
                let Some(order) = state.orders.get_mut(&order_id) else {
                    continue;
                };
                match Self::match_price(order, event) {
                    Some(price) => {
                        let fill = Fill {
                            id: Uuid::new_v4(),
                            order_id,
                            quantity: order.intent.quantity,
                            price,
                            timestamp: event.timestamp,
                        };
                        let side = order.intent.side;
                        // Fully filled in one execution; the engine's
                        // ledger re-derives the state transition.
                        let _ = order.apply_fill(&fill);
                        let value = price * fill.quantity;
                        match side {
                            Side::Buy => state.cash -= value,
                            Side::Sell => state.cash += value,
                        }
                        fills.push(fill);
                    }
                    None => still_pending.push(order_id),
                }
            }
            state.pending = still_pending;
            (fills, tx)
        };

        for fill in fills {
            if tx.send(fill).await.is_err() {
                debug!("fill stream consumer gone");
                return;
            }
        }
    }

    async fn on_end_of_stream(&self) {
        let (fills, tx) = {
            let mut state = self.state.lock().unwrap();
            let state = &mut *state;
            let now = self.clock.now();
            let tx = state.fills_tx.take();
            let pending = std::mem::take(&mut state.pending);
            let mut fills = Vec::new();
            for order_id in pending {
                let Some(order) = state.orders.get_mut(&order_id) else {
                    continue;
                };
                let mark = state.marks.get(&order.intent.symbol).copied();
                match (order.intent.kind, mark) {
                    // Market orders flush at the last observed close.
                    (OrderKind::Market, Some(price)) => {
                        let fill = Fill {
                            id: Uuid::new_v4(),
                            order_id,
                            quantity: order.intent.quantity,
                            price,
                            timestamp: now,
                        };
                        let side = order.intent.side;
                        let _ = order.apply_fill(&fill);
                        let value = price * fill.quantity;
                        match side {
                            Side::Buy => state.cash -= value,
                            Side::Sell => state.cash += value,
                        }
                        fills.push(fill);
                    }
                    _ => {
                        order.cancel(now);
                        debug!(%order_id, "auto-cancelled at end of stream");
                    }
                }
            }
            (fills, tx)
        };

        if let Some(tx) = tx {
            for fill in fills {
                if tx.send(fill).await.is_err() {
                    break;
                }
            }
        }
        // The sender is dropped here, closing the fill stream so the
        // engine's drain completes immediately.
    }

    fn name(&self) -> &str {
        "sim"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn event(sequence: u64, low: Decimal, high: Decimal, close: Decimal) -> MarketEvent {
        MarketEvent {
            symbol: "AAPL".to_string(),
            timestamp: Utc.timestamp_millis_opt(sequence as i64 * 60_000).unwrap(),
            open: close,
            high,
            low,
            close,
            volume: dec!(100),
            sequence,
        }
    }

    fn broker() -> SimBroker {
        SimBroker::new(dec!(10000), EngineClock::simulated())
    }

    #[tokio::test]
    async fn test_market_order_fills_at_next_close() {
        let broker = broker();
        let mut fills = broker.fills().unwrap();

        // The strategy saw event 1 and decided to buy.
        broker.on_market_event(&event(1, dec!(9), dec!(11), dec!(10))).await;
        let intent = OrderIntent::market("AAPL", Side::Buy, dec!(1), Utc::now());
        let state = broker.submit(&intent).await.unwrap();
        assert!(state.status.is_active());

        // Nothing fills until the next event arrives.
        assert!(fills.try_recv().is_err());

        broker.on_market_event(&event(2, dec!(11), dec!(13), dec!(12))).await;
        let fill = fills.recv().await.unwrap();
        assert_eq!(fill.order_id, intent.id);
        assert_eq!(fill.price, dec!(12));
        assert_eq!(fill.quantity, dec!(1));
    }

    #[tokio::test]
    async fn test_pending_market_order_flushed_at_end_of_stream() {
        let broker = broker();
        let mut fills = broker.fills().unwrap();

        // Submitted on the last event of the stream: no further event
        // arrives, so the flush executes at the last observed close.
        broker.on_market_event(&event(1, dec!(8), dec!(10), dec!(9))).await;
        let intent = OrderIntent::market("AAPL", Side::Sell, dec!(1), Utc::now());
        broker.submit(&intent).await.unwrap();

        broker.on_end_of_stream().await;
        let fill = fills.recv().await.unwrap();
        assert_eq!(fill.price, dec!(9));
        assert!(fills.recv().await.is_none());

        let state = broker.order(intent.id).unwrap();
        assert_eq!(state.status, tradebot_core::types::OrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_limit_order_fills_when_range_crosses() {
        let broker = broker();
        let mut fills = broker.fills().unwrap();

        let intent = OrderIntent::limit("AAPL", Side::Buy, dec!(1), dec!(9.5), Utc::now());
        broker.submit(&intent).await.unwrap();

        // Range stays above the limit: no fill.
        broker.on_market_event(&event(1, dec!(10), dec!(12), dec!(11))).await;
        assert!(fills.try_recv().is_err());

        // Low touches the limit: fills at the limit price.
        broker.on_market_event(&event(2, dec!(9), dec!(11), dec!(10))).await;
        let fill = fills.recv().await.unwrap();
        assert_eq!(fill.price, dec!(9.5));
    }

    #[tokio::test]
    async fn test_duplicate_order_id_rejected() {
        let broker = broker();

        let intent = OrderIntent::market("AAPL", Side::Buy, dec!(1), Utc::now());
        let first = broker.submit(&intent).await.unwrap();
        assert!(first.status.is_active());

        let second = broker.submit(&intent).await.unwrap_err();
        assert!(matches!(second, BrokerError::DuplicateOrder(id) if id == intent.id));
    }

    #[tokio::test]
    async fn test_insufficient_balance_rejected() {
        let broker = SimBroker::new(dec!(100), EngineClock::simulated());

        let intent = OrderIntent::limit("AAPL", Side::Buy, dec!(100), dec!(50), Utc::now());
        let state = broker.submit(&intent).await.unwrap();
        assert_eq!(state.status, tradebot_core::types::OrderStatus::Rejected);
        assert!(state.reject_reason.unwrap().contains("insufficient balance"));
    }

    #[tokio::test]
    async fn test_unfilled_limit_auto_cancelled_at_end_of_stream() {
        let broker = broker();
        let mut fills = broker.fills().unwrap();

        let intent = OrderIntent::limit("AAPL", Side::Buy, dec!(1), dec!(1), Utc::now());
        broker.submit(&intent).await.unwrap();
        broker.on_market_event(&event(1, dec!(9), dec!(11), dec!(10))).await;
        broker.on_end_of_stream().await;

        let state = broker.order(intent.id).unwrap();
        assert_eq!(state.status, tradebot_core::types::OrderStatus::Cancelled);
        // Fill stream is closed so a drain completes immediately.
        assert!(fills.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_no_submissions_after_end_of_stream() {
        let broker = broker();
        broker.on_end_of_stream().await;

        let intent = OrderIntent::market("AAPL", Side::Buy, dec!(1), Utc::now());
        let state = broker.submit(&intent).await.unwrap();
        assert_eq!(state.status, tradebot_core::types::OrderStatus::Rejected);
    }
}
