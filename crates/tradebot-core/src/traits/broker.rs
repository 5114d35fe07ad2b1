//! Broker trait definition.

use crate::error::BrokerError;
use crate::types::{Fill, MarketEvent, OrderIntent, OrderState};
use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

/// An order-execution backend.
///
/// Submission resolves synchronously to `Pending` (or a terminal
/// `Rejected`); fills arrive asynchronously on the stream returned by
/// [`Broker::fills`]. Submitting the same intent id twice yields
/// [`BrokerError::DuplicateOrder`] without creating a new order.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Submit a new order intent.
    async fn submit(&self, intent: &OrderIntent) -> Result<OrderState, BrokerError>;

    /// Cancel an order. Returns true if the order was still active.
    async fn cancel(&self, order_id: Uuid) -> Result<bool, BrokerError>;

    /// Take the fill stream. Returns `None` if it was already taken;
    /// there is exactly one consumer (the engine).
    fn fills(&self) -> Option<mpsc::Receiver<Fill>>;

    /// Reconcile state after a reconnect: query open orders and replay
    /// any missed fills onto the fill stream. Live brokers only; the
    /// default returns nothing.
    async fn reconcile(&self) -> Result<Vec<OrderState>, BrokerError> {
        Ok(Vec::new())
    }

    /// Observe a market event the strategy is being shown.
    ///
    /// A simulated broker matches pending orders here, which is what
    /// confines it to information the strategy has already observed. A
    /// live broker ignores this.
    async fn on_market_event(&self, _event: &MarketEvent) {}

    /// Observe the end of a finite stream. A simulated broker flushes
    /// pending market orders at the last observed close, cancels the
    /// rest, and closes its fill stream.
    async fn on_end_of_stream(&self) {}

    /// Get the broker name.
    fn name(&self) -> &str;
}
