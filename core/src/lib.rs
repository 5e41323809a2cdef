//! # Scriptorium Core
//!
//! Core traits and value types for the Scriptorium dispatch architecture.
//!
//! This crate provides the fundamental abstractions for an in-process
//! command/query/event mediator: commands mutate state and emit domain
//! events, policies react to events by issuing further commands, and
//! queries read state.
//!
//! ## Core Concepts
//!
//! - **Command**: an intent to mutate state, parameterized by its result type
//! - **Query**: a read-only request, routed without write semantics or events
//! - **`DomainEvent`**: an immutable fact emitted by a command handler
//! - **`EventQueue`**: the per-invocation buffer a handler appends events to
//! - **`EventLog`**: the durable audit store of all emitted events
//! - **`UnitOfWork`**: the transactional boundary handlers execute inside
//!
//! ## Architecture Principles
//!
//! - One handler per concrete command/query type
//! - Events are facts: append-only, serialized for audit, never dropped
//! - All dispatch is synchronous on the caller's stack (request-per-thread)
//! - External dependencies injected behind narrow traits
//!
//! ## Example
//!
//! ```
//! use scriptorium_core::command::{Command, CommandHandler};
//! use scriptorium_core::event::{DomainEvent, EventQueue, EventType};
//! use serde::Serialize;
//!
//! #[derive(Debug, Serialize)]
//! struct CreateFolderCommand {
//!     name: String,
//! }
//!
//! impl Command for CreateFolderCommand {
//!     type Output = u64;
//! }
//!
//! #[derive(Debug, Serialize)]
//! struct FolderCreatedEvent {
//!     folder_id: u64,
//! }
//!
//! impl DomainEvent for FolderCreatedEvent {}
//!
//! struct CreateFolderHandler;
//!
//! impl CommandHandler<CreateFolderCommand> for CreateFolderHandler {
//!     fn handle(
//!         &self,
//!         queue: &mut EventQueue,
//!         command: CreateFolderCommand,
//!     ) -> anyhow::Result<u64> {
//!         let folder_id = 1;
//!         let _ = command.name;
//!         queue.append(FolderCreatedEvent { folder_id });
//!         Ok(folder_id)
//!     }
//!
//!     fn declared_events(&self) -> Vec<EventType> {
//!         vec![EventType::of::<FolderCreatedEvent>()]
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod command;
pub mod environment;
pub mod event;
pub mod record;
pub mod transaction;

pub use command::{Command, CommandHandler, Query, QueryHandler};
pub use environment::{Clock, SystemClock};
pub use event::{DomainEvent, EventEnvelope, EventQueue, EventType};
pub use record::{EventLog, EventLogError, EventRecord, NewEventRecord, RequestId};
pub use transaction::{Transaction, TransactionError, TransactionMode, UnitOfWork};

/// Returns the unqualified name of a type, without its module path.
///
/// Used as the default display name for commands, events, and handlers in
/// audit records and logs. Matching inside the mediator is always by
/// [`std::any::TypeId`]; names are for humans.
///
/// # Examples
///
/// ```
/// use scriptorium_core::short_type_name;
///
/// struct CreateFolderCommand;
///
/// assert_eq!(short_type_name::<CreateFolderCommand>(), "CreateFolderCommand");
/// ```
#[must_use]
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
