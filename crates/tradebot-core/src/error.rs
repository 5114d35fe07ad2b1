//! Error types for the trading engine.

use thiserror::Error;
use uuid::Uuid;

/// Top-level engine error.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Engine faulted: {0}")]
    Faulted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Strategy-specific errors.
#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Strategy not found: {0}")]
    NotFound(String),
}

/// Broker-specific errors.
///
/// `Authentication` is fatal to the engine; everything else is surfaced
/// as a terminal order state and the loop continues.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Duplicate order id: {0}")]
    DuplicateOrder(Uuid),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    #[error("Submission timed out after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),
}

impl BrokerError {
    /// Whether this error should fault the engine rather than be
    /// reported as an order rejection.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BrokerError::Authentication(_))
    }
}

/// Data source errors.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("No data available at {0}")]
    NotFound(String),

    #[error("Missing column in history file: {0}")]
    MissingColumn(String),

    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("Non-monotonic timestamp at line {line}")]
    NonMonotonicTimestamp { line: usize },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Stream closed")]
    Closed,
}

/// Order lifecycle protocol violations.
///
/// These are never silently repaired; the offending operation is
/// rejected and a diagnostic is emitted.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Duplicate fill id {0}")]
    DuplicateFill(Uuid),

    #[error("Fill for unknown order id {0}")]
    UnknownOrder(Uuid),

    #[error("Fill exceeds remaining quantity for order {order_id}: attempted {attempted}, remaining {remaining}")]
    Overfill {
        order_id: Uuid,
        attempted: rust_decimal::Decimal,
        remaining: rust_decimal::Decimal,
    },

    #[error("Order {order_id} is already terminal ({status})")]
    TerminalOrder { order_id: Uuid, status: String },
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
