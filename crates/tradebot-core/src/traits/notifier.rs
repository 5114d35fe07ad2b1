//! Notifier trait definition.

use crate::types::EngineEvent;

/// A fan-out sink for engine lifecycle events.
///
/// Constructed by the caller and injected into the engine; never a
/// process-wide global. `notify` must not block: implementations hand
/// the event off to a channel or log it and return immediately.
/// Delivery failures are logged by the sink and never retried by the
/// engine.
pub trait Notifier: Send + Sync {
    /// Deliver one engine event, best-effort.
    fn notify(&self, event: EngineEvent);
}

/// A notifier that discards everything. Useful in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: EngineEvent) {}
}
