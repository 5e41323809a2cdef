//! Commands and queries of the AI bounded context.

use crate::domain::{AiProfile, ModelConfig, ModelSource};
use scriptorium_core::command::{Command, Query};
use serde::Serialize;

/// Create a new AI profile.
#[derive(Debug, Serialize)]
pub struct CreateAiProfileCommand {
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
}

impl Command for CreateAiProfileCommand {
    type Output = AiProfile;
}

/// Rename or re-describe an existing profile.
#[derive(Debug, Serialize)]
pub struct UpdateAiProfileCommand {
    /// The profile to update.
    pub ai_profile_id: i64,
    /// New display name.
    pub name: String,
    /// New description.
    pub description: String,
}

impl Command for UpdateAiProfileCommand {
    type Output = AiProfile;
}

/// Delete a profile and cascade to its attached model configs.
#[derive(Debug, Serialize)]
pub struct DeleteAiProfileCommand {
    /// The profile to delete.
    pub ai_profile_id: i64,
}

impl Command for DeleteAiProfileCommand {
    type Output = ();
}

/// Point the application at a profile.
#[derive(Debug, Serialize)]
pub struct SelectDefaultAiProfileCommand {
    /// The profile to select.
    pub ai_profile_id: i64,
}

impl Command for SelectDefaultAiProfileCommand {
    type Output = ();
}

/// Attach a new model config to a profile.
#[derive(Debug, Serialize)]
pub struct CreateModelConfigCommand {
    /// Display name.
    pub name: String,
    /// Endpoint kind.
    pub source: ModelSource,
    /// Owning profile.
    pub ai_profile_id: i64,
}

impl Command for CreateModelConfigCommand {
    type Output = ModelConfig;
}

/// Detach and delete one model config.
#[derive(Debug, Serialize)]
pub struct DeleteModelConfigCommand {
    /// The config to delete.
    pub model_config_id: i64,
}

impl Command for DeleteModelConfigCommand {
    type Output = ();
}

/// Re-pick a profile's selected config after its previous one went away.
#[derive(Debug, Serialize)]
pub struct ResetModelConfigOfAiProfileCommand {
    /// The profile to reset.
    pub ai_profile_id: i64,
}

impl Command for ResetModelConfigOfAiProfileCommand {
    type Output = ();
}

/// Make one attached config the profile's selection.
#[derive(Debug, Serialize)]
pub struct SelectAiProfileDefaultModelConfigCommand {
    /// The owning profile.
    pub ai_profile_id: i64,
    /// The config to select.
    pub model_config_id: i64,
}

impl Command for SelectAiProfileDefaultModelConfigCommand {
    type Output = ();
}

/// All profiles, newest first.
#[derive(Debug)]
pub struct GetAiProfilesQuery;

impl Query for GetAiProfilesQuery {
    type Output = Vec<AiProfile>;
}

/// The profile the application currently points at.
#[derive(Debug)]
pub struct GetSelectedAiProfileQuery;

impl Query for GetSelectedAiProfileQuery {
    type Output = Option<AiProfile>;
}

/// Configs attached to one profile, in attachment order.
#[derive(Debug)]
pub struct GetModelConfigsQuery {
    /// The owning profile.
    pub ai_profile_id: i64,
}

impl Query for GetModelConfigsQuery {
    type Output = Vec<ModelConfig>;
}
