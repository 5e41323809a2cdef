//! The command and query invokers: transaction bracketing, audit, fan-out.
//!
//! [`CommandInvoker::invoke`] drives one invocation through a fixed state
//! machine:
//!
//! 1. **Correlate** — the public entry point mints a fresh [`RequestId`];
//!    nested, policy-triggered invocations flow through
//!    [`DispatchContext::invoke`], which reuses the id so every command and
//!    event transitively caused by one external trigger shares one
//!    correlation id.
//! 2. **Resolve** — registry lookup by runtime type.
//! 3. **Execute** — open a read-write transaction, create a fresh
//!    [`EventQueue`], run the handler.
//! 4. **Commit or abort** — a handler error rolls the transaction back,
//!    records nothing, and propagates verbatim.
//! 5. **Audit** — one record for the command, then one per emitted event,
//!    in queue order. Emitted-but-undeclared events are recorded and
//!    flagged for review.
//! 6. **Fan-out** — each event is dispatched synchronously to its listeners
//!    in queue order; listeners may invoke further commands on the same
//!    call stack.
//! 7. **Return** — after this invocation's own fan-out has completed.
//!
//! Queries run steps 1–4 only, in a read-only scope, and never touch the
//! event log.

use scriptorium_core::command::{Command, Query};
use scriptorium_core::environment::{Clock, SystemClock};
use scriptorium_core::event::{EventEnvelope, EventQueue, EventType};
use scriptorium_core::record::{EventLog, EventLogError, EventRecord, NewEventRecord, RequestId};
use scriptorium_core::short_type_name;
use scriptorium_core::transaction::{TransactionError, TransactionMode, UnitOfWork};
use std::sync::Arc;
use thiserror::Error;

use crate::flow::FlowReport;
use crate::policy::PolicyEngine;
use crate::registry::{HandlerKind, HandlerRegistry};

/// Tunables for the dispatch runtime.
///
/// # Depth guard
///
/// A cyclic policy graph (A's event triggers command B whose event triggers
/// command A again) would recurse until stack exhaustion. The runtime
/// bounds the nesting depth of policy-triggered invocations; exceeding the
/// bound surfaces [`DispatchError::DepthExceeded`] instead of crashing the
/// process.
#[derive(Clone, Copy, Debug)]
pub struct DispatchConfig {
    max_dispatch_depth: u32,
    audit_retries: u32,
}

impl DispatchConfig {
    /// Defaults: depth 32, two audit retries.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_dispatch_depth: 32,
            audit_retries: 2,
        }
    }

    /// Maximum nesting depth of policy-triggered invocations.
    #[must_use]
    pub const fn with_max_dispatch_depth(mut self, depth: u32) -> Self {
        self.max_dispatch_depth = depth;
        self
    }

    /// How many times a failed audit write is retried before the
    /// inconsistency is surfaced.
    #[must_use]
    pub const fn with_audit_retries(mut self, retries: u32) -> Self {
        self.audit_retries = retries;
        self
    }

    /// Current depth bound.
    #[must_use]
    pub const fn max_dispatch_depth(&self) -> u32 {
        self.max_dispatch_depth
    }

    /// Current audit retry bound.
    #[must_use]
    pub const fn audit_retries(&self) -> u32 {
        self.audit_retries
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors surfaced by the dispatch runtime.
///
/// Business errors raised by handlers are wrapped in
/// [`Domain`](DispatchError::Domain) with their message propagated verbatim;
/// everything else is infrastructure.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// No handler is registered for the dispatched type. A missing
    /// registration is a programming/deployment error, never retried.
    #[error("No handler registered for {kind} `{requested}` (registered: {known:?})")]
    NoHandlerFound {
        /// Whether a command or a query was dispatched.
        kind: HandlerKind,
        /// The unrouteable type.
        requested: &'static str,
        /// All registered type names, to aid debugging.
        known: Vec<&'static str>,
    },

    /// The transaction boundary failed.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// A business error raised by a handler. The transaction was rolled
    /// back and zero events were recorded for the invocation.
    #[error("{source}")]
    Domain {
        /// The command or query that failed.
        target: &'static str,
        /// The handler's error, unchanged.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The audit write failed after the business transaction committed.
    /// State and audit log are now inconsistent; the committed mutation is
    /// never rolled back in response.
    #[error("Event log write failed after commit of `{command}`: {source}")]
    EventPersistence {
        /// The command whose events could not be recorded.
        command: &'static str,
        /// The log failure.
        #[source]
        source: EventLogError,
    },

    /// A policy listener (or a follow-up command it issued) failed during
    /// fan-out. The triggering command's transaction had already committed;
    /// only invocations still in flight lower in the stack were rolled
    /// back.
    #[error("Policy `{policy}` listener `{listener}` failed reacting to `{event_type}`: {source}")]
    FanOut {
        /// The event being fanned out.
        event_type: &'static str,
        /// The failing policy.
        policy: &'static str,
        /// The failing listener method.
        listener: &'static str,
        /// The underlying failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The policy-chain depth guard tripped; the policy graph likely
    /// contains a cycle.
    #[error("Dispatch depth {depth} exceeds the configured limit {limit}; \
             the policy graph may contain a cycle")]
    DepthExceeded {
        /// The depth that was about to be entered.
        depth: u32,
        /// The configured bound.
        limit: u32,
    },
}

/// Where a nested invocation came from: the event a policy reacted to.
///
/// Carried explicitly through [`DispatchContext`] so the audit record of a
/// policy-triggered command names its full `event > policy > command`
/// origin chain.
#[derive(Clone, Copy, Debug)]
pub struct CommandOrigin {
    /// The event the policy listened to.
    pub event_type: &'static str,
    /// The reacting policy.
    pub policy: &'static str,
}

/// The execution context handed to policy listeners.
///
/// Carries the correlation id and nesting depth of the in-flight causal
/// chain; [`invoke`](DispatchContext::invoke) reuses both, so a follow-up
/// command's events land in the audit log under the same request id as the
/// event that triggered it.
pub struct DispatchContext<'a> {
    invoker: &'a CommandInvoker,
    request_id: RequestId,
    depth: u32,
    origin: CommandOrigin,
}

impl<'a> DispatchContext<'a> {
    pub(crate) const fn new(
        invoker: &'a CommandInvoker,
        request_id: RequestId,
        depth: u32,
        event_type: &'static str,
        policy: &'static str,
    ) -> Self {
        Self {
            invoker,
            request_id,
            depth,
            origin: CommandOrigin { event_type, policy },
        }
    }

    /// Invoke a follow-up command inside the current causal chain.
    ///
    /// # Errors
    ///
    /// Same error surface as [`CommandInvoker::invoke`], plus
    /// [`DispatchError::DepthExceeded`] when the chain nests past the
    /// configured bound.
    pub fn invoke<C: Command>(&self, command: C) -> Result<C::Output, DispatchError> {
        self.invoker
            .invoke_at(self.request_id, self.depth + 1, Some(self.origin), command)
    }

    /// The correlation id of the chain this listener runs in.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// The type name of the event that triggered this listener.
    #[must_use]
    pub const fn triggering_event(&self) -> &'static str {
        self.origin.event_type
    }
}

/// Routes a command to its single registered handler, executes it inside a
/// read-write transaction, audits the emitted events, and fans them out to
/// policies.
pub struct CommandInvoker {
    registry: Arc<HandlerRegistry>,
    policies: Arc<PolicyEngine>,
    event_log: Arc<dyn EventLog>,
    unit_of_work: Arc<dyn UnitOfWork>,
    clock: Arc<dyn Clock>,
    config: DispatchConfig,
}

impl CommandInvoker {
    /// Assemble an invoker over a built registry and policy engine.
    ///
    /// Defaults to the system clock and [`DispatchConfig::new`]; override
    /// with [`with_clock`](CommandInvoker::with_clock) and
    /// [`with_config`](CommandInvoker::with_config).
    #[must_use]
    pub fn new(
        registry: Arc<HandlerRegistry>,
        policies: Arc<PolicyEngine>,
        event_log: Arc<dyn EventLog>,
        unit_of_work: Arc<dyn UnitOfWork>,
    ) -> Self {
        Self {
            registry,
            policies,
            event_log,
            unit_of_work,
            clock: Arc::new(SystemClock),
            config: DispatchConfig::new(),
        }
    }

    /// Replace the clock used for audit timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the dispatch tunables.
    #[must_use]
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// The static flow map for the visualizer.
    #[must_use]
    pub fn flow(&self) -> FlowReport {
        FlowReport {
            command_events: self.registry.command_flows(),
            policy_commands: self.policies.flows().to_vec(),
        }
    }

    /// Dispatch a command as a fresh external trigger.
    ///
    /// Returns the handler's result after the command's transaction has
    /// committed and all fan-out transitively caused by its events has
    /// completed on this call stack.
    ///
    /// # Errors
    ///
    /// See [`DispatchError`] for the full taxonomy. A returned error does
    /// not necessarily mean this command's effects were undone: a
    /// [`FanOut`](DispatchError::FanOut) failure happens after this
    /// command's own transaction committed.
    pub fn invoke<C: Command>(&self, command: C) -> Result<C::Output, DispatchError> {
        self.invoke_at(RequestId::new(), 0, None, command)
    }

    pub(crate) fn invoke_at<C: Command>(
        &self,
        request_id: RequestId,
        depth: u32,
        origin: Option<CommandOrigin>,
        command: C,
    ) -> Result<C::Output, DispatchError> {
        let command_name = short_type_name::<C>();

        if depth > self.config.max_dispatch_depth() {
            return Err(DispatchError::DepthExceeded {
                depth,
                limit: self.config.max_dispatch_depth(),
            });
        }

        let Some(lookup) = self.registry.command::<C>() else {
            return Err(DispatchError::NoHandlerFound {
                kind: HandlerKind::Command,
                requested: command_name,
                known: self.registry.known_commands(),
            });
        };

        let span =
            tracing::info_span!("command", request_id = %request_id, command = command_name, depth);
        let _guard = span.enter();

        // The handler consumes the command, so its audit payload is
        // captured up front.
        let command_payload = serialize_payload(&command);

        let tx = self.unit_of_work.begin(TransactionMode::ReadWrite)?;
        let mut queue = EventQueue::new();
        let output = match lookup.handler.handle(&mut queue, command) {
            Ok(output) => output,
            Err(source) => {
                tracing::warn!(error = %source, "command failed; rolling back");
                tx.rollback()?;
                return Err(DispatchError::Domain {
                    target: command_name,
                    source: source.into(),
                });
            },
        };
        tx.commit()?;

        let envelopes = queue.into_envelopes();
        self.audit(
            request_id,
            command_name,
            origin,
            lookup.declared,
            &envelopes,
            command_payload,
        )?;

        for envelope in &envelopes {
            self.policies.dispatch(self, request_id, depth, envelope)?;
        }

        tracing::debug!(events = envelopes.len(), "command completed");
        Ok(output)
    }

    /// Step 5: one record for the command, then one per emitted event, in
    /// queue order. Declared-but-not-emitted events are not recorded;
    /// emitted-but-undeclared events are recorded and flagged.
    fn audit(
        &self,
        request_id: RequestId,
        command_name: &'static str,
        origin: Option<CommandOrigin>,
        declared: &[EventType],
        envelopes: &[EventEnvelope],
        command_payload: serde_json::Value,
    ) -> Result<(), DispatchError> {
        let command_record_type = match origin {
            Some(origin) => format!(
                "{} > {} > {}",
                origin.event_type, origin.policy, command_name
            ),
            None => command_name.to_string(),
        };
        self.append_with_retry(
            command_name,
            NewEventRecord::success(
                request_id,
                command_record_type,
                command_payload,
                self.clock.now(),
            ),
        )?;

        for envelope in envelopes {
            let was_declared = declared.iter().any(|t| t.id() == envelope.type_id());
            let record = if was_declared {
                NewEventRecord::success(
                    request_id,
                    envelope.event_type(),
                    envelope.payload().clone(),
                    self.clock.now(),
                )
            } else {
                tracing::warn!(
                    event = envelope.event_type(),
                    command = command_name,
                    "event emitted but not declared; recorded and flagged for review"
                );
                NewEventRecord::flagged_undeclared(
                    request_id,
                    envelope.event_type(),
                    envelope.payload().clone(),
                    self.clock.now(),
                )
            };
            self.append_with_retry(command_name, record)?;
        }
        Ok(())
    }

    fn append_with_retry(
        &self,
        command: &'static str,
        record: NewEventRecord,
    ) -> Result<EventRecord, DispatchError> {
        let mut attempt = 0;
        loop {
            match self.event_log.append(record.clone()) {
                Ok(saved) => return Ok(saved),
                Err(err) if attempt < self.config.audit_retries() => {
                    attempt += 1;
                    tracing::warn!(error = %err, attempt, "audit write failed; retrying");
                },
                Err(source) => {
                    tracing::error!(
                        error = %source,
                        command,
                        "audit write failed after commit; state and audit log are inconsistent"
                    );
                    return Err(DispatchError::EventPersistence { command, source });
                },
            }
        }
    }
}

/// Routes a query to its single registered handler inside a read-only
/// transaction scope. No events, no audit records.
pub struct QueryInvoker {
    registry: Arc<HandlerRegistry>,
    unit_of_work: Arc<dyn UnitOfWork>,
}

impl QueryInvoker {
    /// Assemble a query invoker over the shared registry.
    #[must_use]
    pub fn new(registry: Arc<HandlerRegistry>, unit_of_work: Arc<dyn UnitOfWork>) -> Self {
        Self {
            registry,
            unit_of_work,
        }
    }

    /// Dispatch a query.
    ///
    /// The read-only scope guarantees no writes are committed even if the
    /// handler mistakenly mutates state.
    ///
    /// # Errors
    ///
    /// [`DispatchError::NoHandlerFound`] for a missing registration;
    /// handler errors propagate unchanged as
    /// [`DispatchError::Domain`] after logging. No retry.
    pub fn invoke<Q: Query>(&self, query: Q) -> Result<Q::Output, DispatchError> {
        let query_name = short_type_name::<Q>();

        let Some(handler) = self.registry.query::<Q>() else {
            return Err(DispatchError::NoHandlerFound {
                kind: HandlerKind::Query,
                requested: query_name,
                known: self.registry.known_queries(),
            });
        };

        // Correlation id is minted purely for log correlation; queries
        // never write to the event log.
        let request_id = RequestId::new();
        let span = tracing::debug_span!("query", request_id = %request_id, query = query_name);
        let _guard = span.enter();

        let tx = self.unit_of_work.begin(TransactionMode::ReadOnly)?;
        match handler.handle(query) {
            Ok(output) => {
                tx.commit()?;
                Ok(output)
            },
            Err(source) => {
                tracing::warn!(error = %source, "query failed");
                tx.rollback()?;
                Err(DispatchError::Domain {
                    target: query_name,
                    source: source.into(),
                })
            },
        }
    }
}

fn serialize_payload<T: serde::Serialize>(value: &T) -> serde_json::Value {
    match serde_json::to_value(value) {
        Ok(payload) => payload,
        Err(err) => serde_json::json!({ "serialization_error": err.to_string() }),
    }
}
