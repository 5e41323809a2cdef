//! Command and query traits, and the handler contracts the mediator routes to.
//!
//! Commands are write operations: a handler receives an [`EventQueue`] to
//! declare what happened and returns a result of the command's `Output` type.
//! Queries are read operations: no queue, no events, no audit.
//!
//! Handlers return [`anyhow::Result`] so business errors of any concrete type
//! propagate verbatim to the caller; the mediator wraps them without
//! interpreting them.

use crate::event::{EventQueue, EventType};
use serde::Serialize;
use std::fmt;

/// An intent to mutate state, dispatched through the command invoker.
///
/// Commands are immutable value objects parameterized by their result type.
/// They are constructed by a caller (controller, test, or a policy reacting
/// to an event), consumed exactly once by the invoker, and discarded after.
///
/// The `Serialize` bound exists so the command itself can be written to the
/// audit log alongside the events it produced.
///
/// # Examples
///
/// ```
/// use scriptorium_core::command::Command;
/// use serde::Serialize;
///
/// #[derive(Debug, Serialize)]
/// struct RenameScriptCommand {
///     script_id: u64,
///     new_name: String,
/// }
///
/// impl Command for RenameScriptCommand {
///     type Output = ();
/// }
/// ```
pub trait Command: fmt::Debug + Serialize + Send + Sync + 'static {
    /// The result type produced by this command's handler.
    type Output: Send + 'static;
}

/// A read-only request, dispatched through the query invoker.
///
/// Same lifecycle shape as [`Command`], but routed without transactional
/// write semantics, without an event queue, and without audit records.
pub trait Query: fmt::Debug + Send + Sync + 'static {
    /// The result type produced by this query's handler.
    type Output: Send + 'static;
}

/// A stateless service handling exactly one concrete command type.
///
/// One handler is registered per command type for the process lifetime; it is
/// never created per call. The mediator executes `handle` inside a read-write
/// transaction: if it returns `Err`, the transaction is rolled back and zero
/// events are recorded for the invocation.
///
/// # Event declaration
///
/// [`declared_events`](CommandHandler::declared_events) names the event types
/// this handler may append to the queue. The declaration feeds the audit
/// completeness check (an emitted-but-undeclared event is recorded and
/// flagged for review) and the static flow map used by the visualizer.
/// The default declares nothing.
pub trait CommandHandler<C: Command>: Send + Sync + 'static {
    /// Execute the command, appending any domain events to `queue`.
    ///
    /// # Errors
    ///
    /// Returns any business error raised by the domain logic (not-found,
    /// validation, ...). The error is propagated verbatim to the caller and
    /// the surrounding transaction is rolled back.
    fn handle(&self, queue: &mut EventQueue, command: C) -> anyhow::Result<C::Output>;

    /// The event types this handler may emit.
    fn declared_events(&self) -> Vec<EventType> {
        Vec::new()
    }
}

/// A stateless service handling exactly one concrete query type.
///
/// Query handlers have no event emission capability and run inside a
/// read-only transaction scope.
pub trait QueryHandler<Q: Query>: Send + Sync + 'static {
    /// Execute the query and return its result.
    ///
    /// # Errors
    ///
    /// Returns any business error raised by the domain logic; propagated
    /// unchanged to the caller after logging.
    fn handle(&self, query: Q) -> anyhow::Result<Q::Output>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::DomainEvent;
    use serde::Serialize;

    #[derive(Debug, Serialize)]
    struct Ping {
        label: String,
    }

    impl Command for Ping {
        type Output = String;
    }

    #[derive(Debug, Serialize)]
    struct Pinged;

    impl DomainEvent for Pinged {}

    struct PingHandler;

    impl CommandHandler<Ping> for PingHandler {
        fn handle(&self, queue: &mut EventQueue, command: Ping) -> anyhow::Result<String> {
            queue.append(Pinged);
            Ok(command.label)
        }

        fn declared_events(&self) -> Vec<EventType> {
            vec![EventType::of::<Pinged>()]
        }
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: test fails if the handler errors
    fn handler_fills_queue_and_returns_output() {
        let mut queue = EventQueue::new();
        let output = PingHandler
            .handle(
                &mut queue,
                Ping {
                    label: "hello".to_string(),
                },
            )
            .expect("handler should succeed");

        assert_eq!(output, "hello");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn declared_events_default_is_empty() {
        #[derive(Debug, Serialize)]
        struct Quiet;
        impl Command for Quiet {
            type Output = ();
        }
        struct QuietHandler;
        impl CommandHandler<Quiet> for QuietHandler {
            fn handle(&self, _queue: &mut EventQueue, _command: Quiet) -> anyhow::Result<()> {
                Ok(())
            }
        }

        assert!(QuietHandler.declared_events().is_empty());
    }
}
