use thiserror::Error;

use crate::{Event, EventBus, EventEnvelope};

/// Failure reported by an [`EventHandler`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Receives committed domain events.
///
/// Handlers are registered once at startup (see
/// [`crate::EventDispatcherBuilder`]) and invoked synchronously, in queue
/// order, after the transaction that produced the events has committed.
/// Delivery is at-most-once: a failing handler is reported, never retried.
pub trait EventHandler<E>: Send + Sync
where
    E: Event,
{
    /// Name used when reporting delivery failures.
    fn name(&self) -> &str;

    fn handle(&self, envelope: &EventEnvelope<E>) -> Result<(), HandlerError>;
}

/// Handler that forwards every envelope it receives onto an [`EventBus`].
///
/// This bridges the dispatcher (in-transaction-order delivery) and the bus
/// (broadcast to any number of independent subscribers).
#[derive(Debug)]
pub struct BusPublisher<B> {
    bus: B,
}

impl<B> BusPublisher<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }
}

impl<E, B> EventHandler<E> for BusPublisher<B>
where
    E: Event,
    B: EventBus<EventEnvelope<E>>,
{
    fn name(&self) -> &str {
        "bus-publisher"
    }

    fn handle(&self, envelope: &EventEnvelope<E>) -> Result<(), HandlerError> {
        self.bus
            .publish(envelope.clone())
            .map_err(|e| HandlerError::new(format!("publish failed: {e:?}")))
    }
}
