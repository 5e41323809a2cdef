//! # Scriptorium Runtime
//!
//! The dispatch runtime: routes commands and queries to their single
//! registered handler, brackets execution in transactions, audits emitted
//! events, and fans events out to policies.
//!
//! ## Components
//!
//! - **`HandlerRegistry`**: immutable lookup table from concrete command or
//!   query type to its handler, built once at startup
//! - **`CommandInvoker`**: the read-write dispatch path — resolve, execute,
//!   commit, audit, fan out
//! - **`QueryInvoker`**: the read-only dispatch path — no events, no audit
//! - **`PolicyEngine`**: ordered event-type → listener bindings; listeners
//!   issue follow-up commands through their [`DispatchContext`]
//!
//! ## Dispatch flow
//!
//! ```text
//! ┌────────────┐  invoke   ┌─────────────────┐
//! │   Caller   │──────────►│ CommandInvoker  │
//! └────────────┘           └───────┬─────────┘
//!                                  │ resolve + begin tx
//!                                  ▼
//!                          ┌─────────────────┐
//!                          │ CommandHandler  │── appends ──► EventQueue
//!                          └───────┬─────────┘
//!                                  │ commit
//!                                  ▼
//!                          ┌─────────────────┐
//!                          │    EventLog     │◄── one record per event
//!                          └───────┬─────────┘
//!                                  │ fan-out (same call stack)
//!                                  ▼
//!                          ┌─────────────────┐
//!                          │  PolicyEngine   │── DispatchContext::invoke ──┐
//!                          └─────────────────┘                             │
//!                                  ▲                                       │
//!                                  └────────── recursion ◄─────────────────┘
//! ```
//!
//! All fan-out is synchronous and recursive on the caller's stack: every
//! policy-driven follow-up command caused by one event completes before the
//! next sibling event begins fan-out. A configurable depth guard
//! ([`DispatchConfig::with_max_dispatch_depth`]) bounds runaway policy
//! cycles.
//!
//! ## Example
//!
//! ```ignore
//! use scriptorium_runtime::{CommandInvoker, HandlerRegistry, PolicyBinder};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(
//!     HandlerRegistry::builder()
//!         .command::<CreateFolderCommand, _>(CreateFolderHandler::new(db.clone()))
//!         .query::<GetFoldersQuery, _>(GetFoldersHandler::new(db.clone()))
//!         .build()?,
//! );
//!
//! let policy = Arc::new(FolderIndexPolicy::new(db.clone()));
//! let policies = Arc::new(
//!     PolicyBinder::new()
//!         .policy(&policy)
//!         .listen(&policy, "index_created_folder", FolderIndexPolicy::index_created_folder)
//!         .build(),
//! );
//!
//! let invoker = CommandInvoker::new(registry, policies, event_log, Arc::new(db));
//! let folder_id = invoker.invoke(CreateFolderCommand { name: "inbox".into() })?;
//! ```

pub mod flow;
pub mod invoker;
pub mod policy;
pub mod registry;

pub use flow::{CommandEventFlow, FlowReport, PolicyCommandFlow};
pub use invoker::{
    CommandInvoker, CommandOrigin, DispatchConfig, DispatchContext, DispatchError, QueryInvoker,
};
pub use policy::{Policy, PolicyBinder, PolicyEngine, PolicyFlow};
pub use registry::{DuplicateHandlerError, HandlerKind, HandlerRegistry, RegistryBuilder};
