//! Live broker: order execution over an exchange's REST API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tradebot_core::clock::EngineClock;
use tradebot_core::error::BrokerError;
use tradebot_core::traits::Broker;
use tradebot_core::types::{Fill, OrderIntent, OrderKind, OrderState, OrderStatus, Side};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// REST broker configuration.
#[derive(Debug, Clone)]
pub struct RestBrokerConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    /// How long a submission may take before it is treated as failed.
    pub submit_timeout: Duration,
    /// Interval between fill polls.
    pub poll_interval: Duration,
}

impl RestBrokerConfig {
    pub fn new(base_url: String, api_key: String, api_secret: String) -> Self {
        Self {
            base_url,
            api_key,
            api_secret,
            submit_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(2),
        }
    }

    /// Load credentials from environment variables.
    pub fn from_env(base_url: String) -> Result<Self, BrokerError> {
        let api_key = std::env::var("TRADEBOT_API_KEY")
            .map_err(|_| BrokerError::Configuration("TRADEBOT_API_KEY not set".into()))?;
        let api_secret = std::env::var("TRADEBOT_API_SECRET")
            .map_err(|_| BrokerError::Configuration("TRADEBOT_API_SECRET not set".into()))?;
        Ok(Self::new(base_url, api_key, api_secret))
    }
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest {
    client_order_id: String,
    symbol: String,
    qty: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireOrder {
    client_order_id: String,
    symbol: String,
    status: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    qty: String,
    filled_qty: String,
    limit_price: Option<String>,
    filled_avg_price: Option<String>,
    reject_reason: Option<String>,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, Deserialize)]
struct WireFill {
    id: String,
    order_id: String,
    qty: String,
    price: String,
    timestamp: String,
}

impl WireFill {
    fn parse(self) -> Option<Fill> {
        Some(Fill {
            id: Uuid::parse_str(&self.id).ok()?,
            order_id: Uuid::parse_str(&self.order_id).ok()?,
            quantity: self.qty.parse().ok()?,
            price: self.price.parse().ok()?,
            timestamp: DateTime::parse_from_rfc3339(&self.timestamp)
                .ok()?
                .with_timezone(&Utc),
        })
    }
}

fn parse_wire_order(order: WireOrder) -> Result<OrderState, BrokerError> {
    let id = Uuid::parse_str(&order.client_order_id)
        .map_err(|e| BrokerError::Api(format!("bad client order id: {e}")))?;
    let side = match order.side.as_str() {
        "buy" => Side::Buy,
        "sell" => Side::Sell,
        other => return Err(BrokerError::Api(format!("unknown side: {other}"))),
    };
    let kind = match order.order_type.as_str() {
        "limit" => OrderKind::Limit,
        _ => OrderKind::Market,
    };
    let status = match order.status.as_str() {
        "new" | "accepted" | "pending" => OrderStatus::Pending,
        "partially_filled" => OrderStatus::PartiallyFilled,
        "filled" => OrderStatus::Filled,
        "cancelled" | "canceled" | "expired" => OrderStatus::Cancelled,
        "rejected" => OrderStatus::Rejected,
        other => return Err(BrokerError::Api(format!("unknown order status: {other}"))),
    };

    let quantity: Decimal = order
        .qty
        .parse()
        .map_err(|_| BrokerError::Api(format!("bad quantity: {}", order.qty)))?;
    let filled_quantity: Decimal = order
        .filled_qty
        .parse()
        .map_err(|_| BrokerError::Api(format!("bad filled quantity: {}", order.filled_qty)))?;
    let limit_price = order.limit_price.as_deref().and_then(|p| p.parse().ok());
    let avg_fill_price = order
        .filled_avg_price
        .as_deref()
        .and_then(|p| p.parse().ok());

    let created_at = DateTime::parse_from_rfc3339(&order.created_at)
        .map_err(|e| BrokerError::Api(format!("bad created_at: {e}")))?
        .with_timezone(&Utc);
    let updated_at = DateTime::parse_from_rfc3339(&order.updated_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(created_at);

    Ok(OrderState {
        intent: OrderIntent {
            id,
            symbol: order.symbol,
            side,
            quantity,
            kind,
            limit_price,
            created_at,
        },
        status,
        filled_quantity,
        avg_fill_price,
        reject_reason: order.reject_reason,
        updated_at,
    })
}

/// Live order execution over REST.
///
/// Submissions are bounded by a timeout; fills are discovered by a
/// background polling task and delivered on the fill stream, deduplicated
/// by fill id so that polling overlap and reconciliation replays never
/// double-report an execution.
pub struct RestBroker {
    config: RestBrokerConfig,
    client: Client,
    clock: EngineClock,
    submitted: Mutex<HashSet<Uuid>>,
    fills_tx: mpsc::Sender<Fill>,
    fills_rx: Mutex<Option<mpsc::Receiver<Fill>>>,
    seen_fills: Mutex<HashSet<Uuid>>,
}

impl RestBroker {
    /// Create a REST broker client and start its fill poller.
    pub fn new(config: RestBrokerConfig, clock: EngineClock) -> Result<std::sync::Arc<Self>, BrokerError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            "X-API-KEY",
            header::HeaderValue::from_str(&config.api_key)
                .map_err(|e| BrokerError::Configuration(e.to_string()))?,
        );
        headers.insert(
            "X-API-SECRET",
            header::HeaderValue::from_str(&config.api_secret)
                .map_err(|e| BrokerError::Configuration(e.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let (fills_tx, fills_rx) = mpsc::channel(1024);
        let broker = std::sync::Arc::new(Self {
            config,
            client,
            clock,
            submitted: Mutex::new(HashSet::new()),
            fills_tx,
            fills_rx: Mutex::new(Some(fills_rx)),
            seen_fills: Mutex::new(HashSet::new()),
        });

        let poller = broker.clone();
        tokio::spawn(async move {
            poller.poll_fills().await;
        });

        Ok(broker)
    }

    /// Poll the fills endpoint until the engine drops its receiver.
    async fn poll_fills(&self) {
        loop {
            tokio::time::sleep(self.config.poll_interval).await;
            if self.fills_tx.is_closed() {
                return;
            }
            match self.fetch_fills().await {
                Ok(fills) => {
                    for fill in fills {
                        if self.fills_tx.send(fill).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "fill poll failed"),
            }
        }
    }

    /// Fetch recent fills, filtering out ids already delivered.
    async fn fetch_fills(&self) -> Result<Vec<Fill>, BrokerError> {
        let url = format!("{}/v1/fills", self.config.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let resp = check_status(resp).await?;

        let wire: Vec<WireFill> = resp
            .json()
            .await
            .map_err(|e| BrokerError::Api(e.to_string()))?;

        let mut seen = self.seen_fills.lock().unwrap();
        let fills = wire
            .into_iter()
            .filter_map(|w| {
                let fill = w.parse();
                if fill.is_none() {
                    warn!("skipping malformed fill record");
                }
                fill
            })
            .filter(|fill| seen.insert(fill.id))
            .collect();
        Ok(fills)
    }
}

/// Map an error response to the broker error taxonomy. 401/403 are
/// authentication failures, which fault the engine.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, BrokerError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(BrokerError::Authentication(format!("{status}: {text}")))
        }
        StatusCode::CONFLICT => Err(BrokerError::Rejected(format!("duplicate: {text}"))),
        StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => {
            Err(BrokerError::Rejected(format!("{status}: {text}")))
        }
        _ => Err(BrokerError::Api(format!("{status}: {text}"))),
    }
}

#[async_trait]
impl Broker for RestBroker {
    async fn submit(&self, intent: &OrderIntent) -> Result<OrderState, BrokerError> {
        if !self.submitted.lock().unwrap().insert(intent.id) {
            return Err(BrokerError::DuplicateOrder(intent.id));
        }

        let create = CreateOrderRequest {
            client_order_id: intent.id.to_string(),
            symbol: intent.symbol.clone(),
            qty: intent.quantity.to_string(),
            side: match intent.side {
                Side::Buy => "buy".to_string(),
                Side::Sell => "sell".to_string(),
            },
            order_type: match intent.kind {
                OrderKind::Market => "market".to_string(),
                OrderKind::Limit => "limit".to_string(),
            },
            limit_price: intent.limit_price.map(|p| p.to_string()),
        };
        debug!(order_id = %intent.id, "submitting order");

        let url = format!("{}/v1/orders", self.config.base_url);
        let request = self.client.post(&url).json(&create).send();
        let resp = match tokio::time::timeout(self.config.submit_timeout, request).await {
            Ok(result) => result.map_err(|e| BrokerError::Connection(e.to_string()))?,
            Err(_) => {
                // The order's fate is unknown; the id stays in the
                // submitted set so a retry cannot silently double it.
                return Err(BrokerError::Timeout(self.config.submit_timeout.as_secs()));
            }
        };

        let resp = match check_status(resp).await {
            Ok(resp) => resp,
            Err(BrokerError::Rejected(reason)) => {
                return Ok(OrderState::rejected(intent.clone(), reason, self.clock.now()))
            }
            Err(e) => return Err(e),
        };

        let wire: WireOrder = resp
            .json()
            .await
            .map_err(|e| BrokerError::Api(e.to_string()))?;
        let state = parse_wire_order(wire)?;
        info!(order_id = %intent.id, side = %intent.side, symbol = %intent.symbol, "order accepted");
        Ok(state)
    }

    async fn cancel(&self, order_id: Uuid) -> Result<bool, BrokerError> {
        let url = format!("{}/v1/orders/{order_id}", self.config.base_url);
        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(BrokerError::OrderNotFound(order_id));
        }
        if resp.status() == StatusCode::GONE {
            // Already terminal on the exchange.
            return Ok(false);
        }
        check_status(resp).await?;
        info!(%order_id, "order cancelled");
        Ok(true)
    }

    fn fills(&self) -> Option<mpsc::Receiver<Fill>> {
        self.fills_rx.lock().unwrap().take()
    }

    async fn reconcile(&self) -> Result<Vec<OrderState>, BrokerError> {
        let url = format!("{}/v1/orders", self.config.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("status", "open")])
            .send()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let resp = check_status(resp).await?;

        let wire: Vec<WireOrder> = resp
            .json()
            .await
            .map_err(|e| BrokerError::Api(e.to_string()))?;
        let open: Vec<OrderState> = wire
            .into_iter()
            .map(parse_wire_order)
            .collect::<Result<_, _>>()?;

        {
            let mut submitted = self.submitted.lock().unwrap();
            for order in &open {
                submitted.insert(order.intent.id);
            }
        }

        // Replay any executions that happened while we were away; the
        // seen-set keeps this idempotent across repeated reconciles.
        let missed = self.fetch_fills().await?;
        info!(open = open.len(), replayed = missed.len(), "broker state reconciled");
        for fill in missed {
            if self.fills_tx.send(fill).await.is_err() {
                break;
            }
        }

        Ok(open)
    }

    fn name(&self) -> &str {
        "rest"
    }
}
