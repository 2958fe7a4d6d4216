//! Domain events and their delivery mechanics.
//!
//! Aggregates queue events in memory; the unit of work wraps them in
//! envelopes once the enclosing transaction commits and hands them to the
//! [`EventDispatcher`]. Nothing in this crate performs IO.

pub mod bus;
pub mod dispatcher;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use dispatcher::{DeliveryFailure, DispatchError, EventDispatcher, EventDispatcherBuilder};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::{BusPublisher, EventHandler, HandlerError};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
