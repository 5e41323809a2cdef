//! Domain events, the type-erased envelope, and the per-invocation queue.
//!
//! Events represent immutable facts about things that have happened. A
//! command handler appends them to an [`EventQueue`]; once the handler
//! returns, the invoker drains the queue in insertion order, writes one audit
//! record per event, and fans each event out to subscribed policies.
//!
//! # Erasure
//!
//! The queue is heterogeneous, so each appended event is erased into an
//! [`EventEnvelope`]: its [`TypeId`] (used for declared-event matching and
//! listener routing), its display name, an eagerly serialized JSON payload
//! for the audit log, and the event value itself behind `Arc<dyn Any>` so
//! listeners can downcast back to the concrete type.

use crate::short_type_name;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// An immutable fact emitted by a command handler.
///
/// Events must be serializable: each one is independently persisted as an
/// audit record with a JSON payload. The audit payload is not interpreted by
/// the mediator, only its type name is.
///
/// # Naming
///
/// [`event_type`](DomainEvent::event_type) defaults to the unqualified type
/// name (`FolderCreatedEvent`). Routing and declared-event matching are by
/// [`TypeId`], never by this string.
///
/// # Examples
///
/// ```
/// use scriptorium_core::event::DomainEvent;
/// use serde::Serialize;
///
/// #[derive(Debug, Serialize)]
/// struct FolderCreatedEvent {
///     folder_id: u64,
/// }
///
/// impl DomainEvent for FolderCreatedEvent {}
///
/// let event = FolderCreatedEvent { folder_id: 7 };
/// assert_eq!(event.event_type(), "FolderCreatedEvent");
/// ```
pub trait DomainEvent: fmt::Debug + Serialize + Send + Sync + 'static {
    /// The display name stored in audit records for this event.
    fn event_type(&self) -> &'static str {
        short_type_name::<Self>()
    }
}

/// A descriptor for an event type: its [`TypeId`] plus a display name.
///
/// Used by command handlers to declare which events they may emit, and by
/// the flow report. Equality and hashing are by [`TypeId`] alone.
#[derive(Clone, Copy, Debug)]
pub struct EventType {
    id: TypeId,
    name: &'static str,
}

impl EventType {
    /// Build the descriptor for a concrete event type.
    ///
    /// # Examples
    ///
    /// ```
    /// use scriptorium_core::event::{DomainEvent, EventType};
    /// use serde::Serialize;
    ///
    /// #[derive(Debug, Serialize)]
    /// struct ScriptSavedEvent;
    /// impl DomainEvent for ScriptSavedEvent {}
    ///
    /// let descriptor = EventType::of::<ScriptSavedEvent>();
    /// assert_eq!(descriptor.name(), "ScriptSavedEvent");
    /// ```
    #[must_use]
    pub fn of<E: DomainEvent>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: short_type_name::<E>(),
        }
    }

    /// The erased type identity.
    #[must_use]
    pub const fn id(self) -> TypeId {
        self.id
    }

    /// The display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.name
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventType {}

impl std::hash::Hash for EventType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A type-erased event ready for audit and fan-out.
///
/// The JSON payload is captured eagerly when the event is appended. An event
/// that fails to serialize is still enveloped; its payload becomes a JSON
/// object naming the error, so the fact itself is never dropped from the
/// audit trail.
#[derive(Clone)]
pub struct EventEnvelope {
    type_id: TypeId,
    event_type: &'static str,
    payload: serde_json::Value,
    event: Arc<dyn Any + Send + Sync>,
}

impl EventEnvelope {
    /// Erase a concrete event into an envelope.
    #[must_use]
    pub fn new<E: DomainEvent>(event: E) -> Self {
        let payload = match serde_json::to_value(&event) {
            Ok(value) => value,
            Err(err) => serde_json::json!({ "serialization_error": err.to_string() }),
        };
        Self {
            type_id: TypeId::of::<E>(),
            event_type: event.event_type(),
            payload,
            event: Arc::new(event),
        }
    }

    /// The erased type identity, used for listener routing.
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The display name stored in audit records.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        self.event_type
    }

    /// The serialized audit payload.
    #[must_use]
    pub const fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Borrow the erased event value for listener downcasting.
    #[must_use]
    pub fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self.event.as_ref()
    }

    /// Downcast back to the concrete event type.
    #[must_use]
    pub fn downcast_ref<E: DomainEvent>(&self) -> Option<&E> {
        self.event.downcast_ref::<E>()
    }
}

// Manual Debug implementation since `dyn Any` does not implement Debug
impl fmt::Debug for EventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEnvelope")
            .field("event_type", &self.event_type)
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for EventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventEnvelope {{ type: {} }}", self.event_type)
    }
}

/// The mutable, per-invocation collection of emitted events.
///
/// Owned exclusively by the command invoker call that created it; passed by
/// mutable reference into the handler; append-only during handler execution;
/// drained (iterated, never mutated afterward) by the invoker once the
/// handler returns. Insertion order is the fan-out and audit order.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<EventEnvelope>,
}

impl EventQueue {
    /// Create an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Append a single event.
    pub fn append<E: DomainEvent>(&mut self, event: E) {
        self.events.push(EventEnvelope::new(event));
    }

    /// Append a batch of same-typed events, preserving iteration order.
    pub fn append_all<E, I>(&mut self, events: I)
    where
        E: DomainEvent,
        I: IntoIterator<Item = E>,
    {
        for event in events {
            self.append(event);
        }
    }

    /// Number of events appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no events have been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Borrow the enveloped events in insertion order.
    #[must_use]
    pub fn envelopes(&self) -> &[EventEnvelope] {
        &self.events
    }

    /// Consume the queue, yielding the envelopes in insertion order.
    #[must_use]
    pub fn into_envelopes(self) -> Vec<EventEnvelope> {
        self.events
    }
}
