//! Startup-time handler registration and the immutable dispatch table.
//!
//! The registry maps each concrete command or query type to its single
//! handler instance. Registration is explicit (builder calls name the type),
//! so the table is compile-time checked; there is no runtime type discovery.
//! Exactly one handler may be registered per concrete type: a duplicate is a
//! configuration error surfaced by [`RegistryBuilder::build`], never at
//! first use.
//!
//! After construction the table is immutable and safe for unsynchronized
//! concurrent lookup.

use scriptorium_core::command::{Command, CommandHandler, Query, QueryHandler};
use scriptorium_core::event::EventType;
use scriptorium_core::short_type_name;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::flow::CommandEventFlow;

/// Which dispatch table an entry or error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerKind {
    /// The read-write command table.
    Command,
    /// The read-only query table.
    Query,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => write!(f, "command"),
            Self::Query => write!(f, "query"),
        }
    }
}

/// Two handlers were registered for the same concrete type.
///
/// The process must not start with an ambiguous registry; this error is
/// returned from [`RegistryBuilder::build`] and names both handlers and the
/// contested type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Duplicate handler for {kind} `{target}`: `{existing}` and `{duplicate}` are both registered"
)]
pub struct DuplicateHandlerError {
    /// Which table the collision happened in.
    pub kind: HandlerKind,
    /// The contested command or query type.
    pub target: &'static str,
    /// The handler registered first.
    pub existing: &'static str,
    /// The handler that collided with it.
    pub duplicate: &'static str,
}

// Typed registration payloads, stored behind `dyn Any` and recovered by
// downcasting with the same TypeId the table is keyed by.
struct CommandRegistration<C: Command> {
    handler: Arc<dyn CommandHandler<C>>,
}

struct QueryRegistration<Q: Query> {
    handler: Arc<dyn QueryHandler<Q>>,
}

struct CommandEntry {
    command_name: &'static str,
    handler_name: &'static str,
    declared: Vec<EventType>,
    registration: Arc<dyn Any + Send + Sync>,
}

struct QueryEntry {
    query_name: &'static str,
    handler_name: &'static str,
    registration: Arc<dyn Any + Send + Sync>,
}

/// A resolved command registration: the typed handler plus its declared
/// event types.
pub(crate) struct CommandLookup<'a, C: Command> {
    pub handler: &'a Arc<dyn CommandHandler<C>>,
    pub declared: &'a [EventType],
}

/// The immutable dispatch table built by [`RegistryBuilder`].
pub struct HandlerRegistry {
    commands: HashMap<TypeId, CommandEntry>,
    queries: HashMap<TypeId, QueryEntry>,
    command_order: Vec<TypeId>,
}

impl HandlerRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            commands: HashMap::new(),
            queries: HashMap::new(),
            command_order: Vec::new(),
            duplicate: None,
        }
    }

    pub(crate) fn command<C: Command>(&self) -> Option<CommandLookup<'_, C>> {
        let entry = self.commands.get(&TypeId::of::<C>())?;
        let registration = entry
            .registration
            .downcast_ref::<CommandRegistration<C>>()?;
        Some(CommandLookup {
            handler: &registration.handler,
            declared: &entry.declared,
        })
    }

    pub(crate) fn query<Q: Query>(&self) -> Option<&Arc<dyn QueryHandler<Q>>> {
        let entry = self.queries.get(&TypeId::of::<Q>())?;
        let registration = entry.registration.downcast_ref::<QueryRegistration<Q>>()?;
        Some(&registration.handler)
    }

    /// Names of all registered command types, sorted for stable error
    /// messages.
    #[must_use]
    pub fn known_commands(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> =
            self.commands.values().map(|e| e.command_name).collect();
        names.sort_unstable();
        names
    }

    /// Names of all registered query types, sorted for stable error
    /// messages.
    #[must_use]
    pub fn known_queries(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.queries.values().map(|e| e.query_name).collect();
        names.sort_unstable();
        names
    }

    /// The static command → declared-events edges, in registration order.
    /// Commands that declare nothing are omitted.
    #[must_use]
    pub fn command_flows(&self) -> Vec<CommandEventFlow> {
        self.command_order
            .iter()
            .filter_map(|id| self.commands.get(id))
            .filter(|entry| !entry.declared.is_empty())
            .map(|entry| CommandEventFlow {
                command: entry.command_name,
                events: entry.declared.iter().map(|t| t.name()).collect(),
            })
            .collect()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("commands", &self.known_commands())
            .field("queries", &self.known_queries())
            .finish()
    }
}

/// Chainable, explicit handler registration.
///
/// ```ignore
/// let registry = HandlerRegistry::builder()
///     .command::<CreateFolderCommand, _>(CreateFolderHandler::new(db.clone()))
///     .command::<DeleteFolderCommand, _>(DeleteFolderHandler::new(db.clone()))
///     .query::<GetFoldersQuery, _>(GetFoldersHandler::new(db))
///     .build()?;
/// ```
pub struct RegistryBuilder {
    commands: HashMap<TypeId, CommandEntry>,
    queries: HashMap<TypeId, QueryEntry>,
    command_order: Vec<TypeId>,
    duplicate: Option<DuplicateHandlerError>,
}

impl RegistryBuilder {
    /// Register the handler for a concrete command type.
    #[must_use]
    pub fn command<C: Command, H: CommandHandler<C>>(mut self, handler: H) -> Self {
        let handler_name = short_type_name::<H>();
        let command_name = short_type_name::<C>();
        match self.commands.entry(TypeId::of::<C>()) {
            Entry::Occupied(existing) => {
                self.duplicate.get_or_insert(DuplicateHandlerError {
                    kind: HandlerKind::Command,
                    target: command_name,
                    existing: existing.get().handler_name,
                    duplicate: handler_name,
                });
            },
            Entry::Vacant(slot) => {
                let declared = handler.declared_events();
                tracing::debug!(handler = handler_name, command = command_name, "registered command handler");
                slot.insert(CommandEntry {
                    command_name,
                    handler_name,
                    declared,
                    registration: Arc::new(CommandRegistration::<C> {
                        handler: Arc::new(handler),
                    }),
                });
                self.command_order.push(TypeId::of::<C>());
            },
        }
        self
    }

    /// Register the handler for a concrete query type.
    #[must_use]
    pub fn query<Q: Query, H: QueryHandler<Q>>(mut self, handler: H) -> Self {
        let handler_name = short_type_name::<H>();
        let query_name = short_type_name::<Q>();
        match self.queries.entry(TypeId::of::<Q>()) {
            Entry::Occupied(existing) => {
                self.duplicate.get_or_insert(DuplicateHandlerError {
                    kind: HandlerKind::Query,
                    target: query_name,
                    existing: existing.get().handler_name,
                    duplicate: handler_name,
                });
            },
            Entry::Vacant(slot) => {
                tracing::debug!(handler = handler_name, query = query_name, "registered query handler");
                slot.insert(QueryEntry {
                    query_name,
                    handler_name,
                    registration: Arc::new(QueryRegistration::<Q> {
                        handler: Arc::new(handler),
                    }),
                });
            },
        }
        self
    }

    /// Finish construction.
    ///
    /// # Errors
    ///
    /// Returns the first [`DuplicateHandlerError`] recorded during
    /// registration. An ambiguous registry must never serve dispatch.
    pub fn build(self) -> Result<HandlerRegistry, DuplicateHandlerError> {
        match self.duplicate {
            Some(err) => Err(err),
            None => Ok(HandlerRegistry {
                commands: self.commands,
                queries: self.queries,
                command_order: self.command_order,
            }),
        }
    }
}
