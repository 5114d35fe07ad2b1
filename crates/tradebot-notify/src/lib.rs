//! Notifier sinks: where engine lifecycle events go.
//!
//! Delivery is always fire-and-forget; no sink may block the engine
//! loop or cause it to retry.

pub mod logging;
mod sinks;

pub use sinks::{FanoutNotifier, LogNotifier, WebhookNotifier};
