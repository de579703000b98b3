//! Model catalogue operations.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use tracing::debug;

use crate::client::StateManager;
use crate::error::{Error, Result};
use crate::protocol::ModelsCommand;
use crate::state::{keys, structural_eq};

// ============================================================================
// ModelOps
// ============================================================================

/// Model operations bound to a [`StateManager`].
///
/// Obtained via [`StateManager::models`].
#[derive(Debug, Clone, Copy)]
pub struct ModelOps<'a> {
    manager: &'a StateManager,
}

impl<'a> ModelOps<'a> {
    /// Creates the facade.
    #[inline]
    #[must_use]
    pub fn new(manager: &'a StateManager) -> Self {
        Self { manager }
    }

    /// Lists every model. Resolves to `{ models: [...] }`.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn list(&self) -> Result<Value> {
        self.manager.send(ModelsCommand::List).await
    }

    /// Fetches one model record.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn get(&self, model_id: &str) -> Result<Value> {
        self.manager
            .send(ModelsCommand::Get {
                model_id: model_id.to_string(),
            })
            .await
    }

    /// Creates a model record.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn create(&self, model: Value) -> Result<Value> {
        self.manager.send(ModelsCommand::Create { model }).await
    }

    /// Patches a model record.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn update(&self, model_id: &str, updates: Value) -> Result<Value> {
        self.manager
            .send(ModelsCommand::Update {
                model_id: model_id.to_string(),
                updates,
            })
            .await
    }

    /// Deletes a model record.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn delete(&self, model_id: &str) -> Result<Value> {
        self.manager
            .send(ModelsCommand::Delete {
                model_id: model_id.to_string(),
            })
            .await
    }

    /// Loads a model into the router by name.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn load(&self, model_name: &str) -> Result<Value> {
        self.manager
            .send(ModelsCommand::Load {
                model_name: model_name.to_string(),
            })
            .await
    }

    /// Unloads a model from the router by name.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn unload(&self, model_name: &str) -> Result<Value> {
        self.manager
            .send(ModelsCommand::Unload {
                model_name: model_name.to_string(),
            })
            .await
    }

    /// Loads the model with id `model_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelNotFound`] if the id is not in the `models`
    /// state, otherwise propagates request errors.
    pub async fn start(&self, model_id: &str) -> Result<Value> {
        let name = self.resolve_name(model_id)?;
        debug!(model_id, %name, "Starting model");
        self.load(&name).await
    }

    /// Unloads the model with id `model_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelNotFound`] if the id is not in the `models`
    /// state, otherwise propagates request errors.
    pub async fn stop(&self, model_id: &str) -> Result<Value> {
        let name = self.resolve_name(model_id)?;
        debug!(model_id, %name, "Stopping model");
        self.unload(&name).await
    }

    /// Rescans the models directory.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn scan(&self) -> Result<Value> {
        self.manager.send(ModelsCommand::Scan).await
    }

    /// Removes records whose files no longer exist.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn cleanup(&self) -> Result<Value> {
        self.manager.send(ModelsCommand::Cleanup).await
    }

    /// Lists models and writes them to the `models` state key.
    ///
    /// # Errors
    ///
    /// Propagates request errors; the store is left unchanged on error.
    pub async fn refresh(&self) -> Result<Value> {
        let data = self.list().await?;
        let models = match data.get("models") {
            Some(Value::Array(models)) => Value::Array(models.clone()),
            _ => Value::Array(Vec::new()),
        };

        self.manager.set(keys::MODELS, models.clone());
        Ok(models)
    }

    /// Finds the router name of a model from the `models` state.
    ///
    /// Models without a `name` are addressed by their id.
    fn resolve_name(&self, model_id: &str) -> Result<String> {
        let id = Value::String(model_id.to_string());
        let models = self.manager.get(keys::MODELS);

        let model = models
            .as_ref()
            .and_then(Value::as_array)
            .and_then(|models| {
                models
                    .iter()
                    .find(|m| m.get("id").is_some_and(|own| structural_eq(own, &id)))
            })
            .ok_or_else(|| Error::model_not_found(model_id))?;

        Ok(model
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(model_id)
            .to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
