//! Policies and the event-dispatch engine.
//!
//! A policy is a process-lifetime service that reacts to domain events by
//! issuing follow-up commands, forming a directed command → event → command
//! chain. Listener bindings are established explicitly at startup: an
//! ordered map from event type to listener closures, each pairing a shared
//! policy instance with one of its methods.
//!
//! # Failure semantics
//!
//! Listeners for one event run in registration order. Dispatch aborts on the
//! first listener failure: remaining listeners for that event do not run and
//! the error propagates to the triggering invocation as
//! [`DispatchError::FanOut`](crate::invoker::DispatchError::FanOut). The
//! triggering command's own transaction has already committed at that point.

use scriptorium_core::event::{DomainEvent, EventEnvelope};
use scriptorium_core::record::RequestId;
use scriptorium_core::short_type_name;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::flow::PolicyCommandFlow;
use crate::invoker::{CommandInvoker, DispatchContext, DispatchError};

/// One declared event → command edge of a policy, for the flow map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PolicyFlow {
    /// The listened-to event type name.
    pub from_event: &'static str,
    /// The command the policy issues in response.
    pub to_command: &'static str,
}

impl PolicyFlow {
    /// Build a flow edge from concrete types.
    #[must_use]
    pub fn of<E: DomainEvent, C: scriptorium_core::command::Command>() -> Self {
        Self {
            from_event: short_type_name::<E>(),
            to_command: short_type_name::<C>(),
        }
    }
}

/// A component that reacts to events by issuing further commands.
///
/// Policies are stateless singletons owned behind `Arc` for the process
/// lifetime and invoked synchronously by the event-dispatch step. The
/// [`flows`](Policy::flows) declaration feeds the flow visualizer and is
/// never enforced at runtime.
pub trait Policy: Send + Sync + 'static {
    /// Display name used in audit origin chains and logs.
    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }

    /// Declared event → command edges, for documentation only.
    fn flows(&self) -> Vec<PolicyFlow> {
        Vec::new()
    }
}

type ListenerFn =
    Box<dyn Fn(&DispatchContext<'_>, &(dyn Any + Send + Sync)) -> anyhow::Result<()> + Send + Sync>;

struct ListenerBinding {
    policy_name: &'static str,
    listener: &'static str,
    call: ListenerFn,
}

/// Builds the event-type → listeners map at startup.
///
/// Register each policy once with [`policy`](PolicyBinder::policy) (collects
/// its flow declarations), then bind each of its listener methods with
/// [`listen`](PolicyBinder::listen). Binding order per event type is the
/// dispatch order.
///
/// ```ignore
/// let policy = Arc::new(AiProfileDefaultPolicy::new(db, invoker));
/// let engine = PolicyBinder::new()
///     .policy(&policy)
///     .listen(&policy, "select_newly_created_profile", AiProfileDefaultPolicy::select_newly_created_profile)
///     .listen(&policy, "reset_deleted_model_config", AiProfileDefaultPolicy::reset_deleted_model_config)
///     .build();
/// ```
#[derive(Default)]
pub struct PolicyBinder {
    bindings: HashMap<TypeId, Vec<ListenerBinding>>,
    flows: Vec<PolicyCommandFlow>,
}

impl PolicyBinder {
    /// Start with no bindings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a policy's declared flows in the flow map.
    #[must_use]
    pub fn policy<P: Policy>(mut self, policy: &Arc<P>) -> Self {
        for flow in policy.flows() {
            self.flows.push(PolicyCommandFlow {
                policy: policy.name(),
                from_event: flow.from_event,
                to_command: flow.to_command,
            });
        }
        self
    }

    /// Bind one listener method of `policy` to the exact event type `E`.
    ///
    /// No supertype matching: the listener runs only for events whose
    /// runtime type is exactly `E`.
    #[must_use]
    pub fn listen<E, P, F>(mut self, policy: &Arc<P>, listener: &'static str, f: F) -> Self
    where
        E: DomainEvent,
        P: Policy,
        F: Fn(&P, &DispatchContext<'_>, &E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let policy_name = policy.name();
        let bound = Arc::clone(policy);
        let call: ListenerFn = Box::new(move |ctx, event| {
            // Routed by TypeId, so the downcast holds by construction.
            match event.downcast_ref::<E>() {
                Some(event) => f(bound.as_ref(), ctx, event),
                None => Ok(()),
            }
        });
        self.bindings
            .entry(TypeId::of::<E>())
            .or_default()
            .push(ListenerBinding {
                policy_name,
                listener,
                call,
            });
        self
    }

    /// Finish construction. The engine is immutable afterward.
    #[must_use]
    pub fn build(self) -> PolicyEngine {
        PolicyEngine {
            bindings: self.bindings,
            flows: self.flows,
        }
    }
}

/// The immutable event-dispatch table: per event type, the ordered listener
/// closures to run.
pub struct PolicyEngine {
    bindings: HashMap<TypeId, Vec<ListenerBinding>>,
    flows: Vec<PolicyCommandFlow>,
}

impl PolicyEngine {
    /// An engine with no policies; events fan out to nobody.
    #[must_use]
    pub fn empty() -> Self {
        PolicyBinder::new().build()
    }

    /// Number of listeners bound for an event type id.
    #[must_use]
    pub fn listener_count(&self, type_id: TypeId) -> usize {
        self.bindings.get(&type_id).map_or(0, Vec::len)
    }

    /// Declared policy flow edges, in declaration order.
    #[must_use]
    pub fn flows(&self) -> &[PolicyCommandFlow] {
        &self.flows
    }

    /// Synchronously run every listener bound to the event's exact runtime
    /// type, in registration order, aborting on the first failure.
    pub(crate) fn dispatch(
        &self,
        invoker: &CommandInvoker,
        request_id: RequestId,
        depth: u32,
        envelope: &EventEnvelope,
    ) -> Result<(), DispatchError> {
        let Some(bindings) = self.bindings.get(&envelope.type_id()) else {
            tracing::debug!(event = envelope.event_type(), "no listeners bound");
            return Ok(());
        };

        for binding in bindings {
            tracing::debug!(
                event = envelope.event_type(),
                policy = binding.policy_name,
                listener = binding.listener,
                "dispatching event to listener"
            );
            let ctx = DispatchContext::new(
                invoker,
                request_id,
                depth,
                envelope.event_type(),
                binding.policy_name,
            );
            if let Err(source) = (binding.call)(&ctx, envelope.as_any()) {
                tracing::warn!(
                    event = envelope.event_type(),
                    policy = binding.policy_name,
                    listener = binding.listener,
                    error = %source,
                    "listener failed; aborting remaining listeners for this event"
                );
                return Err(DispatchError::FanOut {
                    event_type: envelope.event_type(),
                    policy: binding.policy_name,
                    listener: binding.listener,
                    source: source.into(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("event_types", &self.bindings.len())
            .field("flows", &self.flows)
            .finish()
    }
}
