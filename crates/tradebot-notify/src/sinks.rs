//! Notifier implementations.

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tradebot_core::traits::Notifier;
use tradebot_core::types::EngineEvent;

/// Logs every engine event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: EngineEvent) {
        match &event {
            EngineEvent::OrderSubmitted {
                order_id,
                symbol,
                side,
                quantity,
            } => info!(%order_id, %symbol, %side, %quantity, "order submitted"),
            EngineEvent::OrderFilled {
                order_id,
                fill_id,
                quantity,
                price,
                remaining,
            } => info!(%order_id, %fill_id, %quantity, %price, %remaining, "order filled"),
            EngineEvent::OrderRejected { order_id, reason } => {
                warn!(%order_id, %reason, "order rejected")
            }
            EngineEvent::GapDetected { dropped, at } => {
                warn!(dropped, %at, "market data gap")
            }
            EngineEvent::EngineFaulted { reason } => error!(%reason, "engine faulted"),
            EngineEvent::EngineStopped => info!("engine stopped"),
        }
    }
}

/// POSTs each event as JSON to a webhook endpoint.
///
/// Events are handed to a background task over an unbounded channel so
/// `notify` never blocks; failed deliveries are logged and dropped.
pub struct WebhookNotifier {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<EngineEvent>();
        tokio::spawn(async move {
            let client = reqwest::Client::new();
            while let Some(event) = rx.recv().await {
                let body = match serde_json::to_value(&event) {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(error = %e, "unserializable engine event");
                        continue;
                    }
                };
                if let Err(e) = client.post(&url).json(&body).send().await {
                    warn!(error = %e, "webhook delivery failed");
                }
            }
        });
        Self { tx }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            warn!("webhook task gone, event dropped");
        }
    }
}

/// Fans one event out to several sinks.
#[derive(Default)]
pub struct FanoutNotifier {
    sinks: Vec<Box<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn Notifier>) {
        self.sinks.push(sink);
    }
}

impl Notifier for FanoutNotifier {
    fn notify(&self, event: EngineEvent) {
        for sink in &self.sinks {
            sink.notify(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    struct CountingSink(Arc<Mutex<u32>>);

    impl Notifier for CountingSink {
        fn notify(&self, _event: EngineEvent) {
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let count = Arc::new(Mutex::new(0));
        let mut fanout = FanoutNotifier::new();
        fanout.push(Box::new(CountingSink(count.clone())));
        fanout.push(Box::new(CountingSink(count.clone())));

        fanout.notify(EngineEvent::EngineStopped);
        fanout.notify(EngineEvent::OrderRejected {
            order_id: Uuid::new_v4(),
            reason: "test".to_string(),
        });

        assert_eq!(*count.lock().unwrap(), 4);
    }

    #[test]
    fn test_engine_events_serialize_for_webhooks() {
        let json = serde_json::to_value(EngineEvent::EngineFaulted {
            reason: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "engine_faulted");
        assert_eq!(json["reason"], "boom");
    }
}
