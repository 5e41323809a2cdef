//! The default-selection policy of the AI bounded context.

use crate::commands::{
    ResetModelConfigOfAiProfileCommand, SelectAiProfileDefaultModelConfigCommand,
    SelectDefaultAiProfileCommand,
};
use crate::domain::{AiDb, AiError};
use crate::events::{AiProfileCreatedEvent, ModelConfigCreatedEvent, ModelConfigDeletedEvent};
use scriptorium_runtime::{DispatchContext, Policy, PolicyFlow};

/// Keeps the application's profile selection and each profile's config
/// selection coherent as profiles and configs come and go.
pub struct AiProfileDefaultPolicy {
    db: AiDb,
}

impl AiProfileDefaultPolicy {
    /// Bind the policy to the store.
    #[must_use]
    pub const fn new(db: AiDb) -> Self {
        Self { db }
    }

    /// The application should select a newly created profile when it has
    /// none selected yet.
    ///
    /// # Errors
    ///
    /// Propagates any failure of the follow-up command.
    pub fn select_newly_created_profile(
        &self,
        ctx: &DispatchContext<'_>,
        event: &AiProfileCreatedEvent,
    ) -> anyhow::Result<()> {
        let nothing_selected = self
            .db
            .read(|state| state.application_state.selected_ai_profile.is_none());
        if nothing_selected {
            ctx.invoke(SelectDefaultAiProfileCommand {
                ai_profile_id: event.ai_profile.id,
            })?;
        }
        Ok(())
    }

    /// A profile whose config was deleted re-picks its selection. Skipped
    /// when the profile itself is already gone (config deletion was part
    /// of a profile cascade).
    ///
    /// # Errors
    ///
    /// Propagates any failure of the follow-up command.
    pub fn reset_deleted_model_config(
        &self,
        ctx: &DispatchContext<'_>,
        event: &ModelConfigDeletedEvent,
    ) -> anyhow::Result<()> {
        let profile_exists = self
            .db
            .read(|state| state.profile(event.ai_profile_id).is_some());
        if profile_exists {
            ctx.invoke(ResetModelConfigOfAiProfileCommand {
                ai_profile_id: event.ai_profile_id,
            })?;
        }
        Ok(())
    }

    /// A profile with no selected config selects a newly attached one.
    ///
    /// # Errors
    ///
    /// Fails when the owning profile disappeared, and propagates any
    /// failure of the follow-up command.
    pub fn select_newly_created_model_config(
        &self,
        ctx: &DispatchContext<'_>,
        event: &ModelConfigCreatedEvent,
    ) -> anyhow::Result<()> {
        let selection = self.db.read(|state| {
            state
                .profile(event.parent_ai_profile_id)
                .map(|profile| profile.selected_model_config)
        });
        // Only assign a new default config when the profile has none yet.
        match selection {
            None => Err(AiError::ProfileNotFound(event.parent_ai_profile_id).into()),
            Some(Some(_)) => Ok(()),
            Some(None) => {
                ctx.invoke(SelectAiProfileDefaultModelConfigCommand {
                    ai_profile_id: event.parent_ai_profile_id,
                    model_config_id: event.model_config.id,
                })?;
                Ok(())
            },
        }
    }
}

impl Policy for AiProfileDefaultPolicy {
    fn flows(&self) -> Vec<PolicyFlow> {
        vec![
            PolicyFlow::of::<AiProfileCreatedEvent, SelectDefaultAiProfileCommand>(),
            PolicyFlow::of::<ModelConfigDeletedEvent, ResetModelConfigOfAiProfileCommand>(),
            PolicyFlow::of::<ModelConfigCreatedEvent, SelectAiProfileDefaultModelConfigCommand>(),
        ]
    }
}
