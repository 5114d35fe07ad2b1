//! The event loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use tradebot_core::clock::EngineClock;
use tradebot_core::error::{BrokerError, EngineError};
use tradebot_core::traits::{Broker, DataSource, Notifier, Strategy};
use tradebot_core::types::{
    EngineEvent, FeedItem, Fill, MarketEvent, OrderIntent, OrderState, OrderStatus, Portfolio,
};

use crate::ledger::{FillOutcome, OrderLedger};
use crate::queue::{EngineMessage, EngineQueue};

/// Engine run settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Symbol this run trades
    pub symbol: String,
    /// Starting cash
    pub initial_cash: rust_decimal::Decimal,
    /// How long to wait for in-flight fills at shutdown
    pub drain_timeout: Duration,
}

impl EngineConfig {
    pub fn new(symbol: impl Into<String>, initial_cash: rust_decimal::Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            initial_cash,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Stopped,
    Faulted,
}

/// Summary of a completed run.
#[derive(Debug)]
pub struct RunReport {
    pub state: EngineState,
    pub events_processed: u64,
    pub fills_applied: u64,
    pub gaps_observed: u64,
    pub orders_submitted: u64,
    pub dropped_events: u64,
    pub portfolio: Portfolio,
}

/// Requests a stop from outside the loop. Cheap to clone; stopping an
/// already-stopped engine is a no-op.
#[derive(Clone)]
pub struct EngineHandle {
    stop_tx: mpsc::Sender<()>,
}

impl EngineHandle {
    pub fn stop(&self) {
        let _ = self.stop_tx.try_send(());
    }
}

/// The trading engine: single consumer of market events and fills, sole
/// owner of the portfolio and the order ledger.
pub struct Engine {
    config: EngineConfig,
    data: Arc<dyn DataSource>,
    broker: Arc<dyn Broker>,
    strategy: Box<dyn Strategy>,
    notifier: Arc<dyn Notifier>,
    clock: EngineClock,
    portfolio: Portfolio,
    ledger: OrderLedger,
    state: EngineState,
    stop_tx: mpsc::Sender<()>,
    stop_rx: Option<mpsc::Receiver<()>>,
    events_processed: u64,
    fills_applied: u64,
    gaps_observed: u64,
    orders_submitted: u64,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        data: Arc<dyn DataSource>,
        broker: Arc<dyn Broker>,
        strategy: Box<dyn Strategy>,
        notifier: Arc<dyn Notifier>,
        clock: EngineClock,
    ) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let portfolio = Portfolio::new(config.initial_cash);
        Self {
            config,
            data,
            broker,
            strategy,
            notifier,
            clock,
            portfolio,
            ledger: OrderLedger::new(),
            state: EngineState::Idle,
            stop_tx,
            stop_rx: Some(stop_rx),
            events_processed: 0,
            fills_applied: 0,
            gaps_observed: 0,
            orders_submitted: 0,
        }
    }

    /// Get a handle for stopping the engine from another task.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            stop_tx: self.stop_tx.clone(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Run to completion: until EndOfStream, an external stop, or a
    /// fatal error.
    pub async fn run(mut self) -> Result<RunReport, EngineError> {
        let feed_rx = self.data.subscribe(&self.config.symbol).await?;
        let fills_rx = self
            .broker
            .fills()
            .ok_or_else(|| EngineError::Internal("broker fill stream already taken".into()))?;
        let stop_rx = self
            .stop_rx
            .take()
            .ok_or_else(|| EngineError::Internal("engine already run".into()))?;
        let mut queue = EngineQueue::new(feed_rx, fills_rx, stop_rx);

        // Live brokers re-sync open orders and replay missed fills
        // before the first event; the fills arrive on the fill stream
        // and are deduplicated like any others.
        for order in self.broker.reconcile().await? {
            debug!(order_id = %order.intent.id, status = %order.status, "reconciled open order");
            self.ledger.record(order);
        }

        self.state = EngineState::Running;
        info!(
            symbol = %self.config.symbol,
            data = self.data.name(),
            broker = self.broker.name(),
            strategy = self.strategy.name(),
            "engine running"
        );

        loop {
            let Some(message) = queue.next().await else {
                // Both producer channels closed without EndOfStream.
                return self.fault(&mut queue, "data stream closed unexpectedly").await;
            };
            match message {
                EngineMessage::Feed(FeedItem::Event(event)) => {
                    self.on_event(&mut queue, event).await?;
                }
                EngineMessage::Feed(FeedItem::GapDetected { dropped }) => {
                    self.gaps_observed += 1;
                    warn!(dropped, "gap in market data");
                    self.notifier.notify(EngineEvent::GapDetected {
                        dropped,
                        at: self.clock.now(),
                    });
                }
                EngineMessage::Feed(FeedItem::EndOfStream) => {
                    info!("end of stream");
                    self.broker.on_end_of_stream().await;
                    let drained = self.drain(&mut queue).await;
                    let leftovers = self.ledger.cancel_active(self.clock.now());
                    if !drained && !leftovers.is_empty() {
                        return self
                            .fault_already_drained("undrained fills at end of stream")
                            .await;
                    }
                    if !leftovers.is_empty() {
                        debug!(count = leftovers.len(), "cancelled leftover orders");
                    }
                    return Ok(self.finish(EngineState::Stopped));
                }
                EngineMessage::Fill(fill) => {
                    self.on_fill(&fill);
                }
                EngineMessage::Stop => {
                    info!("stop requested");
                    self.broker.on_end_of_stream().await;
                    self.drain(&mut queue).await;
                    self.ledger.cancel_active(self.clock.now());
                    return Ok(self.finish(EngineState::Stopped));
                }
            }
        }
    }

    /// One market event: advance the clock, let the broker match
    /// resting orders, then ask the strategy.
    async fn on_event(
        &mut self,
        queue: &mut EngineQueue,
        event: MarketEvent,
    ) -> Result<(), EngineError> {
        self.events_processed += 1;
        self.clock.advance_to(event.timestamp);
        self.portfolio.mark_to_market(&event);

        // The broker sees the event before any intents created from it,
        // so simulated matching never uses information the strategy has
        // not already observed.
        self.broker.on_market_event(&event).await;

        let intents = self.strategy.decide(&event, &self.portfolio, &self.clock);
        for intent in intents {
            if let Err(reason) = self.submit(intent.clone()).await {
                return self.fault(queue, &reason).await.map(|_| ());
            }
        }
        Ok(())
    }

    /// Submit one intent. Returns `Err(reason)` only for fatal broker
    /// errors; everything else resolves to a recorded order state.
    async fn submit(&mut self, intent: OrderIntent) -> Result<(), String> {
        if self.ledger.contains(intent.id) {
            // Exactly-once submission: never hand the broker an id the
            // ledger already owns.
            warn!(order_id = %intent.id, "strategy reused an order id, dropping intent");
            return Ok(());
        }

        self.orders_submitted += 1;
        let order = match self.broker.submit(&intent).await {
            Ok(order) => order,
            Err(e) if e.is_fatal() => return Err(e.to_string()),
            Err(BrokerError::DuplicateOrder(id)) => {
                warn!(order_id = %id, "broker reports duplicate order id");
                return Ok(());
            }
            Err(BrokerError::Timeout(secs)) => {
                warn!(order_id = %intent.id, secs, "submission timed out");
                OrderState::rejected(intent.clone(), "timeout", self.clock.now())
            }
            Err(e) => {
                warn!(order_id = %intent.id, error = %e, "submission failed");
                OrderState::rejected(intent.clone(), e.to_string(), self.clock.now())
            }
        };

        match order.status {
            OrderStatus::Rejected => {
                let reason = order.reject_reason.clone().unwrap_or_default();
                self.notifier.notify(EngineEvent::OrderRejected {
                    order_id: intent.id,
                    reason,
                });
            }
            _ => {
                self.notifier.notify(EngineEvent::OrderSubmitted {
                    order_id: intent.id,
                    symbol: intent.symbol.clone(),
                    side: intent.side,
                    quantity: intent.quantity,
                });
            }
        }
        self.ledger.record(order);
        Ok(())
    }

    /// One fill: ledger first (idempotence), then portfolio and
    /// strategy bookkeeping.
    fn on_fill(&mut self, fill: &Fill) {
        match self.ledger.apply_fill(fill) {
            FillOutcome::Applied { status, remaining } => {
                self.fills_applied += 1;
                let Some(order) = self.ledger.get(fill.order_id) else {
                    return;
                };
                let (symbol, side) = (order.intent.symbol.clone(), order.intent.side);
                self.portfolio.apply_fill(&symbol, side, fill);
                self.strategy.on_fill(fill);
                debug!(order_id = %fill.order_id, %status, price = %fill.price, "fill applied");
                self.notifier.notify(EngineEvent::OrderFilled {
                    order_id: fill.order_id,
                    fill_id: fill.id,
                    quantity: fill.quantity,
                    price: fill.price,
                    remaining,
                });
            }
            FillOutcome::Duplicate => {
                debug!(fill_id = %fill.id, "duplicate fill ignored");
            }
            FillOutcome::Violation(e) => {
                // Rejected, never repaired.
                error!(fill_id = %fill.id, error = %e, "protocol violation in fill stream");
            }
        }
    }

    /// Consume remaining fills, bounded by the drain timeout. Returns
    /// true if the fill stream closed before the deadline.
    async fn drain(&mut self, queue: &mut EngineQueue) -> bool {
        let deadline = Instant::now() + self.config.drain_timeout;
        loop {
            match tokio::time::timeout_at(deadline, queue.next_fill()).await {
                Ok(Some(fill)) => self.on_fill(&fill),
                Ok(None) => return true,
                Err(_) => {
                    warn!("drain timeout elapsed with fill stream still open");
                    return false;
                }
            }
        }
    }

    async fn fault(
        &mut self,
        queue: &mut EngineQueue,
        reason: &str,
    ) -> Result<RunReport, EngineError> {
        error!(reason, "engine faulted");
        self.drain(queue).await;
        self.fault_already_drained(reason).await
    }

    async fn fault_already_drained(&mut self, reason: &str) -> Result<RunReport, EngineError> {
        self.ledger.cancel_active(self.clock.now());
        self.notifier.notify(EngineEvent::EngineFaulted {
            reason: reason.to_string(),
        });
        self.state = EngineState::Faulted;
        Err(EngineError::Faulted(reason.to_string()))
    }

    fn finish(&mut self, state: EngineState) -> RunReport {
        self.state = state;
        self.notifier.notify(EngineEvent::EngineStopped);
        info!(
            events = self.events_processed,
            fills = self.fills_applied,
            equity = %self.portfolio.equity(),
            "engine stopped"
        );
        RunReport {
            state,
            events_processed: self.events_processed,
            fills_applied: self.fills_applied,
            gaps_observed: self.gaps_observed,
            orders_submitted: self.orders_submitted,
            dropped_events: self.data.dropped_events(),
            portfolio: self.portfolio.clone(),
        }
    }
}
