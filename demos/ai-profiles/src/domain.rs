//! Entities and the in-memory store state for the AI bounded context.

use scriptorium_testing::MemoryDb;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Domain errors raised by AI handlers and policies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AiError {
    /// The referenced profile does not exist.
    #[error("AI Profile with id {0} not found")]
    ProfileNotFound(i64),

    /// The referenced model config does not exist.
    #[error("Model config with id {0} not found")]
    ModelConfigNotFound(i64),

    /// The config exists but belongs to a different profile.
    #[error("Model config {model_config_id} does not belong to AI Profile {ai_profile_id}")]
    ModelConfigNotAttached {
        /// The config that was referenced.
        model_config_id: i64,
        /// The profile it was expected to belong to.
        ai_profile_id: i64,
    },
}

/// Where a model config's completions come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelSource {
    /// Direct OpenAI API.
    OpenAi,
    /// Azure-hosted OpenAI deployment.
    AzureOpenAi,
}

/// A named collection of model configs and scripted-tool settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AiProfile {
    /// Storage id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// The config this profile currently completes with, if any.
    pub selected_model_config: Option<i64>,
    /// All configs attached to this profile, in attachment order.
    pub model_config_ids: Vec<i64>,
}

impl AiProfile {
    /// Drop the current selection and fall back to the first remaining
    /// attached config, if any. Returns the new selection.
    pub fn reset_selected_model_config(&mut self) -> Option<i64> {
        self.selected_model_config = self.model_config_ids.first().copied();
        self.selected_model_config
    }
}

/// One model endpoint configuration attached to a profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Storage id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Endpoint kind.
    pub source: ModelSource,
    /// Owning profile.
    pub ai_profile_id: i64,
}

/// Singleton application-level selection state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationState {
    /// The profile the application currently works with.
    pub selected_ai_profile: Option<i64>,
}

/// The whole bounded context's store state.
#[derive(Clone, Debug, Default)]
pub struct AiState {
    next_profile_id: i64,
    next_config_id: i64,
    profiles: BTreeMap<i64, AiProfile>,
    model_configs: BTreeMap<i64, ModelConfig>,
    /// Application-level selection.
    pub application_state: ApplicationState,
}

impl AiState {
    /// Create and store a profile, assigning the next id.
    pub fn insert_profile(&mut self, name: String, description: String) -> AiProfile {
        self.next_profile_id += 1;
        let profile = AiProfile {
            id: self.next_profile_id,
            name,
            description,
            selected_model_config: None,
            model_config_ids: Vec::new(),
        };
        self.profiles.insert(profile.id, profile.clone());
        profile
    }

    /// Create a config attached to `ai_profile_id`, assigning the next id.
    /// The caller has already checked the profile exists.
    pub fn insert_model_config(
        &mut self,
        name: String,
        source: ModelSource,
        ai_profile_id: i64,
    ) -> ModelConfig {
        self.next_config_id += 1;
        let config = ModelConfig {
            id: self.next_config_id,
            name,
            source,
            ai_profile_id,
        };
        self.model_configs.insert(config.id, config.clone());
        if let Some(profile) = self.profiles.get_mut(&ai_profile_id) {
            profile.model_config_ids.push(config.id);
        }
        config
    }

    /// Look up a profile.
    #[must_use]
    pub fn profile(&self, id: i64) -> Option<&AiProfile> {
        self.profiles.get(&id)
    }

    /// Look up a profile for mutation.
    pub fn profile_mut(&mut self, id: i64) -> Option<&mut AiProfile> {
        self.profiles.get_mut(&id)
    }

    /// All profiles, newest first.
    #[must_use]
    pub fn profiles_newest_first(&self) -> Vec<AiProfile> {
        self.profiles.values().rev().cloned().collect()
    }

    /// Look up a config.
    #[must_use]
    pub fn model_config(&self, id: i64) -> Option<&ModelConfig> {
        self.model_configs.get(&id)
    }

    /// Configs attached to one profile, in attachment order.
    #[must_use]
    pub fn model_configs_of(&self, ai_profile_id: i64) -> Vec<ModelConfig> {
        self.profiles
            .get(&ai_profile_id)
            .map(|profile| {
                profile
                    .model_config_ids
                    .iter()
                    .filter_map(|id| self.model_configs.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove a profile and cascade to its attached configs. Returns the
    /// removed profile and the ids of the configs removed with it.
    pub fn remove_profile(&mut self, id: i64) -> Option<(AiProfile, Vec<i64>)> {
        let profile = self.profiles.remove(&id)?;
        let removed: Vec<i64> = profile.model_config_ids.clone();
        for config_id in &removed {
            self.model_configs.remove(config_id);
        }
        Some((profile, removed))
    }

    /// Remove a single config, detaching it from its profile. The
    /// profile's selection is left to the reset policy.
    pub fn remove_model_config(&mut self, id: i64) -> Option<ModelConfig> {
        let config = self.model_configs.remove(&id)?;
        if let Some(profile) = self.profiles.get_mut(&config.ai_profile_id) {
            profile.model_config_ids.retain(|attached| *attached != id);
            if profile.selected_model_config == Some(id) {
                profile.selected_model_config = None;
            }
        }
        Some(config)
    }
}

/// The shared transactional store for this context.
pub type AiDb = MemoryDb<AiState>;
