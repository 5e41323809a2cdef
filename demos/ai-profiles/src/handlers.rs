//! Command and query handlers of the AI bounded context.
//!
//! Handlers are stateless services holding a handle onto the shared store;
//! they run inside the transaction opened by the invoker, append the events
//! describing what happened, and return their result.

use crate::commands::{
    CreateAiProfileCommand, CreateModelConfigCommand, DeleteAiProfileCommand,
    DeleteModelConfigCommand, GetAiProfilesQuery, GetModelConfigsQuery,
    GetSelectedAiProfileQuery, ResetModelConfigOfAiProfileCommand,
    SelectAiProfileDefaultModelConfigCommand, SelectDefaultAiProfileCommand,
    UpdateAiProfileCommand,
};
use crate::domain::{AiDb, AiError, AiProfile, AiState, ModelConfig};
use crate::events::{
    AiProfileCreatedEvent, AiProfileDefaultModelConfigSelectedEvent, AiProfileDeletedEvent,
    AiProfileModelConfigResetEvent, AiProfileUpdatedEvent, DefaultAiProfileSelectedEvent,
    ModelConfigCreatedEvent, ModelConfigDeletedEvent,
};
use scriptorium_core::command::{CommandHandler, QueryHandler};
use scriptorium_core::event::{EventQueue, EventType};

/// Handles [`CreateAiProfileCommand`].
pub struct CreateAiProfileHandler {
    db: AiDb,
}

impl CreateAiProfileHandler {
    /// Bind the handler to the store.
    #[must_use]
    pub const fn new(db: AiDb) -> Self {
        Self { db }
    }
}

impl CommandHandler<CreateAiProfileCommand> for CreateAiProfileHandler {
    fn handle(
        &self,
        queue: &mut EventQueue,
        command: CreateAiProfileCommand,
    ) -> anyhow::Result<AiProfile> {
        let profile = self
            .db
            .write(|state| state.insert_profile(command.name, command.description));
        queue.append(AiProfileCreatedEvent {
            ai_profile: profile.clone(),
        });
        Ok(profile)
    }

    fn declared_events(&self) -> Vec<EventType> {
        vec![EventType::of::<AiProfileCreatedEvent>()]
    }
}

/// Handles [`UpdateAiProfileCommand`].
pub struct UpdateAiProfileHandler {
    db: AiDb,
}

impl UpdateAiProfileHandler {
    /// Bind the handler to the store.
    #[must_use]
    pub const fn new(db: AiDb) -> Self {
        Self { db }
    }
}

impl CommandHandler<UpdateAiProfileCommand> for UpdateAiProfileHandler {
    fn handle(
        &self,
        queue: &mut EventQueue,
        command: UpdateAiProfileCommand,
    ) -> anyhow::Result<AiProfile> {
        let updated = self.db.write(|state| {
            state.profile_mut(command.ai_profile_id).map(|profile| {
                profile.name = command.name.clone();
                profile.description = command.description.clone();
                profile.clone()
            })
        });
        let profile = updated.ok_or(AiError::ProfileNotFound(command.ai_profile_id))?;
        queue.append(AiProfileUpdatedEvent {
            ai_profile: profile.clone(),
        });
        Ok(profile)
    }

    fn declared_events(&self) -> Vec<EventType> {
        vec![EventType::of::<AiProfileUpdatedEvent>()]
    }
}

/// Handles [`DeleteAiProfileCommand`], cascading to attached configs.
pub struct DeleteAiProfileHandler {
    db: AiDb,
}

impl DeleteAiProfileHandler {
    /// Bind the handler to the store.
    #[must_use]
    pub const fn new(db: AiDb) -> Self {
        Self { db }
    }
}

impl CommandHandler<DeleteAiProfileCommand> for DeleteAiProfileHandler {
    fn handle(
        &self,
        queue: &mut EventQueue,
        command: DeleteAiProfileCommand,
    ) -> anyhow::Result<()> {
        let removed = self.db.write(|state| state.remove_profile(command.ai_profile_id));
        let (_profile, removed_config_ids) =
            removed.ok_or(AiError::ProfileNotFound(command.ai_profile_id))?;

        queue.append(AiProfileDeletedEvent {
            ai_profile_id: command.ai_profile_id,
        });
        // One event per cascaded deletion; each is an independent fact.
        for model_config_id in removed_config_ids {
            queue.append(ModelConfigDeletedEvent {
                model_config_id,
                ai_profile_id: command.ai_profile_id,
            });
        }
        Ok(())
    }

    fn declared_events(&self) -> Vec<EventType> {
        vec![
            EventType::of::<AiProfileDeletedEvent>(),
            EventType::of::<ModelConfigDeletedEvent>(),
        ]
    }
}

/// Handles [`SelectDefaultAiProfileCommand`].
pub struct SelectDefaultAiProfileHandler {
    db: AiDb,
}

impl SelectDefaultAiProfileHandler {
    /// Bind the handler to the store.
    #[must_use]
    pub const fn new(db: AiDb) -> Self {
        Self { db }
    }
}

impl CommandHandler<SelectDefaultAiProfileCommand> for SelectDefaultAiProfileHandler {
    fn handle(
        &self,
        queue: &mut EventQueue,
        command: SelectDefaultAiProfileCommand,
    ) -> anyhow::Result<()> {
        let selected = self.db.write(|state| {
            if state.profile(command.ai_profile_id).is_none() {
                return false;
            }
            state.application_state.selected_ai_profile = Some(command.ai_profile_id);
            true
        });
        anyhow::ensure!(selected, AiError::ProfileNotFound(command.ai_profile_id));
        queue.append(DefaultAiProfileSelectedEvent {
            ai_profile_id: command.ai_profile_id,
        });
        Ok(())
    }

    fn declared_events(&self) -> Vec<EventType> {
        vec![EventType::of::<DefaultAiProfileSelectedEvent>()]
    }
}

/// Handles [`CreateModelConfigCommand`].
pub struct CreateModelConfigHandler {
    db: AiDb,
}

impl CreateModelConfigHandler {
    /// Bind the handler to the store.
    #[must_use]
    pub const fn new(db: AiDb) -> Self {
        Self { db }
    }
}

impl CommandHandler<CreateModelConfigCommand> for CreateModelConfigHandler {
    fn handle(
        &self,
        queue: &mut EventQueue,
        command: CreateModelConfigCommand,
    ) -> anyhow::Result<ModelConfig> {
        let created = self.db.write(|state| {
            if state.profile(command.ai_profile_id).is_none() {
                return None;
            }
            Some(state.insert_model_config(command.name, command.source, command.ai_profile_id))
        });
        let config = created.ok_or(AiError::ProfileNotFound(command.ai_profile_id))?;
        queue.append(ModelConfigCreatedEvent {
            parent_ai_profile_id: config.ai_profile_id,
            model_config: config.clone(),
        });
        Ok(config)
    }

    fn declared_events(&self) -> Vec<EventType> {
        vec![EventType::of::<ModelConfigCreatedEvent>()]
    }
}

/// Handles [`DeleteModelConfigCommand`].
pub struct DeleteModelConfigHandler {
    db: AiDb,
}

impl DeleteModelConfigHandler {
    /// Bind the handler to the store.
    #[must_use]
    pub const fn new(db: AiDb) -> Self {
        Self { db }
    }
}

impl CommandHandler<DeleteModelConfigCommand> for DeleteModelConfigHandler {
    fn handle(
        &self,
        queue: &mut EventQueue,
        command: DeleteModelConfigCommand,
    ) -> anyhow::Result<()> {
        let removed = self
            .db
            .write(|state| state.remove_model_config(command.model_config_id));
        let config = removed.ok_or(AiError::ModelConfigNotFound(command.model_config_id))?;
        queue.append(ModelConfigDeletedEvent {
            model_config_id: config.id,
            ai_profile_id: config.ai_profile_id,
        });
        Ok(())
    }

    fn declared_events(&self) -> Vec<EventType> {
        vec![EventType::of::<ModelConfigDeletedEvent>()]
    }
}

/// Handles [`ResetModelConfigOfAiProfileCommand`].
pub struct ResetModelConfigOfAiProfileHandler {
    db: AiDb,
}

impl ResetModelConfigOfAiProfileHandler {
    /// Bind the handler to the store.
    #[must_use]
    pub const fn new(db: AiDb) -> Self {
        Self { db }
    }
}

impl CommandHandler<ResetModelConfigOfAiProfileCommand> for ResetModelConfigOfAiProfileHandler {
    fn handle(
        &self,
        queue: &mut EventQueue,
        command: ResetModelConfigOfAiProfileCommand,
    ) -> anyhow::Result<()> {
        let result = self.db.write(|state| {
            let new_selection = state
                .profile_mut(command.ai_profile_id)
                .map(AiProfile::reset_selected_model_config)?;
            Some(new_selection.and_then(|id| state.model_config(id).cloned()))
        });
        let new_selected_model_config =
            result.ok_or(AiError::ProfileNotFound(command.ai_profile_id))?;
        queue.append(AiProfileModelConfigResetEvent {
            ai_profile_id: command.ai_profile_id,
            new_selected_model_config,
        });
        Ok(())
    }

    fn declared_events(&self) -> Vec<EventType> {
        vec![EventType::of::<AiProfileModelConfigResetEvent>()]
    }
}

/// Handles [`SelectAiProfileDefaultModelConfigCommand`].
pub struct SelectAiProfileDefaultModelConfigHandler {
    db: AiDb,
}

impl SelectAiProfileDefaultModelConfigHandler {
    /// Bind the handler to the store.
    #[must_use]
    pub const fn new(db: AiDb) -> Self {
        Self { db }
    }
}

impl CommandHandler<SelectAiProfileDefaultModelConfigCommand>
    for SelectAiProfileDefaultModelConfigHandler
{
    fn handle(
        &self,
        queue: &mut EventQueue,
        command: SelectAiProfileDefaultModelConfigCommand,
    ) -> anyhow::Result<()> {
        let outcome = self.db.write(|state| {
            let attached = state
                .model_config(command.model_config_id)
                .map(|config| config.ai_profile_id == command.ai_profile_id);
            match attached {
                None => Err(AiError::ModelConfigNotFound(command.model_config_id)),
                Some(false) => Err(AiError::ModelConfigNotAttached {
                    model_config_id: command.model_config_id,
                    ai_profile_id: command.ai_profile_id,
                }),
                Some(true) => match state.profile_mut(command.ai_profile_id) {
                    None => Err(AiError::ProfileNotFound(command.ai_profile_id)),
                    Some(profile) => {
                        profile.selected_model_config = Some(command.model_config_id);
                        Ok(())
                    },
                },
            }
        });
        outcome?;
        queue.append(AiProfileDefaultModelConfigSelectedEvent {
            ai_profile_id: command.ai_profile_id,
            model_config_id: command.model_config_id,
        });
        Ok(())
    }

    fn declared_events(&self) -> Vec<EventType> {
        vec![EventType::of::<AiProfileDefaultModelConfigSelectedEvent>()]
    }
}

/// Handles [`GetAiProfilesQuery`].
pub struct GetAiProfilesHandler {
    db: AiDb,
}

impl GetAiProfilesHandler {
    /// Bind the handler to the store.
    #[must_use]
    pub const fn new(db: AiDb) -> Self {
        Self { db }
    }
}

impl QueryHandler<GetAiProfilesQuery> for GetAiProfilesHandler {
    fn handle(&self, _query: GetAiProfilesQuery) -> anyhow::Result<Vec<AiProfile>> {
        Ok(self.db.read(AiState::profiles_newest_first))
    }
}

/// Handles [`GetSelectedAiProfileQuery`].
pub struct GetSelectedAiProfileHandler {
    db: AiDb,
}

impl GetSelectedAiProfileHandler {
    /// Bind the handler to the store.
    #[must_use]
    pub const fn new(db: AiDb) -> Self {
        Self { db }
    }
}

impl QueryHandler<GetSelectedAiProfileQuery> for GetSelectedAiProfileHandler {
    fn handle(&self, _query: GetSelectedAiProfileQuery) -> anyhow::Result<Option<AiProfile>> {
        Ok(self.db.read(|state| {
            state
                .application_state
                .selected_ai_profile
                .and_then(|id| state.profile(id).cloned())
        }))
    }
}

/// Handles [`GetModelConfigsQuery`].
pub struct GetModelConfigsHandler {
    db: AiDb,
}

impl GetModelConfigsHandler {
    /// Bind the handler to the store.
    #[must_use]
    pub const fn new(db: AiDb) -> Self {
        Self { db }
    }
}

impl QueryHandler<GetModelConfigsQuery> for GetModelConfigsHandler {
    fn handle(&self, query: GetModelConfigsQuery) -> anyhow::Result<Vec<ModelConfig>> {
        Ok(self
            .db
            .read(|state| state.model_configs_of(query.ai_profile_id)))
    }
}
