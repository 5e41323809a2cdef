//! Domain events of the AI bounded context.

use crate::domain::{AiProfile, ModelConfig};
use scriptorium_core::event::DomainEvent;
use serde::Serialize;

/// A profile was created.
#[derive(Debug, Serialize)]
pub struct AiProfileCreatedEvent {
    /// The created profile.
    pub ai_profile: AiProfile,
}

impl DomainEvent for AiProfileCreatedEvent {}

/// A profile's name or description changed.
#[derive(Debug, Serialize)]
pub struct AiProfileUpdatedEvent {
    /// The profile after the update.
    pub ai_profile: AiProfile,
}

impl DomainEvent for AiProfileUpdatedEvent {}

/// A profile was deleted.
#[derive(Debug, Serialize)]
pub struct AiProfileDeletedEvent {
    /// The deleted profile's id.
    pub ai_profile_id: i64,
}

impl DomainEvent for AiProfileDeletedEvent {}

/// The application now points at a profile.
#[derive(Debug, Serialize)]
pub struct DefaultAiProfileSelectedEvent {
    /// The selected profile.
    pub ai_profile_id: i64,
}

impl DomainEvent for DefaultAiProfileSelectedEvent {}

/// A config was attached to a profile.
#[derive(Debug, Serialize)]
pub struct ModelConfigCreatedEvent {
    /// The owning profile.
    pub parent_ai_profile_id: i64,
    /// The created config.
    pub model_config: ModelConfig,
}

impl DomainEvent for ModelConfigCreatedEvent {}

/// A config was deleted; emitted both for direct deletion and for profile
/// cascades.
#[derive(Debug, Serialize)]
pub struct ModelConfigDeletedEvent {
    /// The deleted config's id.
    pub model_config_id: i64,
    /// The profile it belonged to.
    pub ai_profile_id: i64,
}

impl DomainEvent for ModelConfigDeletedEvent {}

/// A profile's selection was re-picked after its config went away.
#[derive(Debug, Serialize)]
pub struct AiProfileModelConfigResetEvent {
    /// The reset profile.
    pub ai_profile_id: i64,
    /// The new selection, when any config remained.
    pub new_selected_model_config: Option<ModelConfig>,
}

impl DomainEvent for AiProfileModelConfigResetEvent {}

/// A profile selected one of its attached configs.
#[derive(Debug, Serialize)]
pub struct AiProfileDefaultModelConfigSelectedEvent {
    /// The owning profile.
    pub ai_profile_id: i64,
    /// The selected config.
    pub model_config_id: i64,
}

impl DomainEvent for AiProfileDefaultModelConfigSelectedEvent {}
