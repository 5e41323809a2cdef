//! AI-profile bounded context wired onto the Scriptorium mediator.
//!
//! The script-manager application keeps a set of AI profiles, each holding
//! model endpoint configs; the application points at one selected profile
//! and each profile points at one selected config. Selection upkeep is not
//! done inline by the CRUD handlers — it is reacted to by
//! [`AiProfileDefaultPolicy`], chaining follow-up commands off the emitted
//! events:
//!
//! ```text
//! CreateAiProfileCommand ──► AiProfileCreatedEvent
//!                                    │ (no profile selected yet)
//!                                    ▼
//!                        SelectDefaultAiProfileCommand ──► DefaultAiProfileSelectedEvent
//!
//! CreateModelConfigCommand ──► ModelConfigCreatedEvent
//!                                    │ (profile has no selected config)
//!                                    ▼
//!              SelectAiProfileDefaultModelConfigCommand
//!
//! DeleteModelConfigCommand ──► ModelConfigDeletedEvent
//!                                    │ (profile still exists)
//!                                    ▼
//!                   ResetModelConfigOfAiProfileCommand
//! ```
//!
//! [`build_app`] assembles the registry, policy bindings, in-memory store,
//! and event log into a ready-to-use pair of invokers.

pub mod commands;
pub mod domain;
pub mod events;
pub mod handlers;
pub mod policy;

pub use domain::{AiDb, AiError, AiProfile, AiState, ApplicationState, ModelConfig, ModelSource};
pub use policy::AiProfileDefaultPolicy;

use handlers::{
    CreateAiProfileHandler, CreateModelConfigHandler, DeleteAiProfileHandler,
    DeleteModelConfigHandler, GetAiProfilesHandler, GetModelConfigsHandler,
    GetSelectedAiProfileHandler, ResetModelConfigOfAiProfileHandler,
    SelectAiProfileDefaultModelConfigHandler, SelectDefaultAiProfileHandler,
    UpdateAiProfileHandler,
};
use scriptorium_runtime::{
    CommandInvoker, DuplicateHandlerError, HandlerRegistry, PolicyBinder, QueryInvoker,
};
use scriptorium_core::EventLog;
use scriptorium_testing::{InMemoryEventLog, MemoryDb};
use std::sync::Arc;

/// The assembled bounded context: both invokers plus handles onto the
/// store and audit log for inspection.
pub struct AiProfileApp {
    /// The write path.
    pub commands: CommandInvoker,
    /// The read path.
    pub queries: QueryInvoker,
    /// The shared store.
    pub db: AiDb,
    /// The audit log.
    pub event_log: Arc<InMemoryEventLog>,
}

/// Wire the full context over fresh in-memory stores.
///
/// # Errors
///
/// Returns [`DuplicateHandlerError`] if the registration table is
/// ambiguous; with the fixed registration below this only fires when a
/// refactor introduces a collision.
pub fn build_app() -> Result<AiProfileApp, DuplicateHandlerError> {
    let db: AiDb = MemoryDb::new(AiState::default());
    let event_log = Arc::new(InMemoryEventLog::new());

    let registry = Arc::new(
        HandlerRegistry::builder()
            .command::<commands::CreateAiProfileCommand, _>(CreateAiProfileHandler::new(
                db.clone(),
            ))
            .command::<commands::UpdateAiProfileCommand, _>(UpdateAiProfileHandler::new(
                db.clone(),
            ))
            .command::<commands::DeleteAiProfileCommand, _>(DeleteAiProfileHandler::new(
                db.clone(),
            ))
            .command::<commands::SelectDefaultAiProfileCommand, _>(
                SelectDefaultAiProfileHandler::new(db.clone()),
            )
            .command::<commands::CreateModelConfigCommand, _>(CreateModelConfigHandler::new(
                db.clone(),
            ))
            .command::<commands::DeleteModelConfigCommand, _>(DeleteModelConfigHandler::new(
                db.clone(),
            ))
            .command::<commands::ResetModelConfigOfAiProfileCommand, _>(
                ResetModelConfigOfAiProfileHandler::new(db.clone()),
            )
            .command::<commands::SelectAiProfileDefaultModelConfigCommand, _>(
                SelectAiProfileDefaultModelConfigHandler::new(db.clone()),
            )
            .query::<commands::GetAiProfilesQuery, _>(GetAiProfilesHandler::new(db.clone()))
            .query::<commands::GetSelectedAiProfileQuery, _>(GetSelectedAiProfileHandler::new(
                db.clone(),
            ))
            .query::<commands::GetModelConfigsQuery, _>(GetModelConfigsHandler::new(db.clone()))
            .build()?,
    );

    let policy = Arc::new(AiProfileDefaultPolicy::new(db.clone()));
    let policies = Arc::new(
        PolicyBinder::new()
            .policy(&policy)
            .listen(
                &policy,
                "select_newly_created_profile",
                AiProfileDefaultPolicy::select_newly_created_profile,
            )
            .listen(
                &policy,
                "reset_deleted_model_config",
                AiProfileDefaultPolicy::reset_deleted_model_config,
            )
            .listen(
                &policy,
                "select_newly_created_model_config",
                AiProfileDefaultPolicy::select_newly_created_model_config,
            )
            .build(),
    );

    let commands = CommandInvoker::new(
        Arc::clone(&registry),
        policies,
        Arc::clone(&event_log) as Arc<dyn EventLog>,
        Arc::new(db.clone()),
    );
    let queries = QueryInvoker::new(registry, Arc::new(db.clone()));

    Ok(AiProfileApp {
        commands,
        queries,
        db,
        event_log,
    })
}
