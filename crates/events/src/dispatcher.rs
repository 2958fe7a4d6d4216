//! Post-commit delivery of domain events to registered handlers.
//!
//! The dispatcher is built once at startup and never mutated afterwards.
//! Every call to [`EventDispatcher::dispatch`] corresponds to exactly one
//! successful commit, so each event reaches each interested handler at most
//! once.

use std::sync::Arc;

use thiserror::Error;

use passport_core::EventId;

use crate::{Event, EventEnvelope, EventHandler};

enum Interest {
    All,
    Kinds(Vec<&'static str>),
}

impl Interest {
    fn accepts(&self, event_type: &str) -> bool {
        match self {
            Interest::All => true,
            Interest::Kinds(kinds) => kinds.iter().any(|k| *k == event_type),
        }
    }
}

struct Registration<E: Event> {
    interest: Interest,
    handler: Arc<dyn EventHandler<E>>,
}

/// One handler failing on one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub handler: String,
    pub event_id: EventId,
    pub event_type: &'static str,
    pub message: String,
}

/// Dispatch finished but at least one delivery failed.
///
/// The state change behind the events is already durable when this is
/// returned; only the notification is incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} event deliveries failed", failures.len())]
pub struct DispatchError {
    pub failures: Vec<DeliveryFailure>,
}

/// Startup-time registration of handlers.
pub struct EventDispatcherBuilder<E: Event> {
    registrations: Vec<Registration<E>>,
}

impl<E: Event> Default for EventDispatcherBuilder<E> {
    fn default() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }
}

impl<E: Event> EventDispatcherBuilder<E> {
    /// Subscribe `handler` to the given event kinds (see [`Event::event_type`]).
    pub fn subscribe(
        mut self,
        kinds: impl IntoIterator<Item = &'static str>,
        handler: Arc<dyn EventHandler<E>>,
    ) -> Self {
        self.registrations.push(Registration {
            interest: Interest::Kinds(kinds.into_iter().collect()),
            handler,
        });
        self
    }

    /// Subscribe `handler` to every event kind.
    pub fn subscribe_all(mut self, handler: Arc<dyn EventHandler<E>>) -> Self {
        self.registrations.push(Registration {
            interest: Interest::All,
            handler,
        });
        self
    }

    pub fn build(self) -> EventDispatcher<E> {
        EventDispatcher {
            registrations: self.registrations,
        }
    }
}

/// Delivers committed events to the handlers registered for their kind.
pub struct EventDispatcher<E: Event> {
    registrations: Vec<Registration<E>>,
}

impl<E: Event> core::fmt::Debug for EventDispatcher<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let names: Vec<&str> = self.registrations.iter().map(|r| r.handler.name()).collect();
        f.debug_struct("EventDispatcher").field("handlers", &names).finish()
    }
}

impl<E: Event> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl<E: Event> EventDispatcher<E> {
    pub fn builder() -> EventDispatcherBuilder<E> {
        EventDispatcherBuilder::default()
    }

    pub fn handler_count(&self) -> usize {
        self.registrations.len()
    }

    /// Deliver `events` in order. Handlers are invoked in registration order.
    ///
    /// A failing handler does not prevent delivery to the remaining handlers
    /// or of later events. Returns the number of successful deliveries.
    pub fn dispatch(&self, events: &[EventEnvelope<E>]) -> Result<usize, DispatchError> {
        let mut delivered = 0usize;
        let mut failures = Vec::new();

        for envelope in events {
            let event_type = envelope.event_type();
            for registration in self
                .registrations
                .iter()
                .filter(|r| r.interest.accepts(event_type))
            {
                match registration.handler.handle(envelope) {
                    Ok(()) => delivered += 1,
                    Err(err) => {
                        tracing::warn!(
                            handler = registration.handler.name(),
                            event_type,
                            event_id = %envelope.event_id(),
                            error = %err,
                            "event handler failed"
                        );
                        failures.push(DeliveryFailure {
                            handler: registration.handler.name().to_string(),
                            event_id: envelope.event_id(),
                            event_type,
                            message: err.message().to_string(),
                        });
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(delivered)
        } else {
            Err(DispatchError { failures })
        }
    }
}
