use std::any::TypeId;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::backends::Record;
use crate::context::Context;
use crate::event_error::EventError;
use crate::model::Model;

/// Lifecycle points at which observers are invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelEvent {
    Retrieved,
    Creating,
    Created,
    Updating,
    Updated,
    Saving,
    Saved,
    Deleting,
    Deleted,
    ForceDeleting,
    ForceDeleted,
}

impl ModelEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ModelEvent::Retrieved => "retrieved",
            ModelEvent::Creating => "creating",
            ModelEvent::Created => "created",
            ModelEvent::Updating => "updating",
            ModelEvent::Updated => "updated",
            ModelEvent::Saving => "saving",
            ModelEvent::Saved => "saved",
            ModelEvent::Deleting => "deleting",
            ModelEvent::Deleted => "deleted",
            ModelEvent::ForceDeleting => "force_deleting",
            ModelEvent::ForceDeleted => "force_deleted",
        }
    }

    /// Hooks that run before the database write and may still abort it
    pub fn is_before(&self) -> bool {
        matches!(
            self,
            ModelEvent::Creating
                | ModelEvent::Updating
                | ModelEvent::Saving
                | ModelEvent::Deleting
                | ModelEvent::ForceDeleting
        )
    }
}

impl fmt::Display for ModelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runtime identity of a model type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelType {
    pub id: TypeId,
    pub name: &'static str,
}

impl ModelType {
    pub fn of<M: Model>() -> Self {
        Self {
            id: TypeId::of::<M>(),
            name: std::any::type_name::<M>(),
        }
    }
}

/// What an observer hook receives: the model's attributes and the context of
/// the operation that triggered it. Attribute changes made in a "before" hook
/// are what gets persisted.
#[derive(Debug, Clone)]
pub struct Event {
    model: ModelType,
    attributes: Record,
    ctx: Context,
}

impl Event {
    pub fn new(model: ModelType, attributes: Record, ctx: Context) -> Self {
        Self {
            model,
            attributes,
            ctx,
        }
    }

    pub fn get_attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Into<Value>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    pub fn attributes(&self) -> &Record {
        &self.attributes
    }

    pub fn into_attributes(self) -> Record {
        self.attributes
    }

    /// Context of the operation that fired this event
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn model(&self) -> ModelType {
        self.model
    }
}

/// Model lifecycle observer. Every hook defaults to a no-op; an error from any
/// hook aborts the operation and is returned to the caller as-is.
#[async_trait]
pub trait Observer: Send + Sync {
    async fn retrieved(&self, _event: &mut Event) -> Result<(), EventError> {
        Ok(())
    }

    async fn creating(&self, _event: &mut Event) -> Result<(), EventError> {
        Ok(())
    }

    async fn created(&self, _event: &mut Event) -> Result<(), EventError> {
        Ok(())
    }

    async fn updating(&self, _event: &mut Event) -> Result<(), EventError> {
        Ok(())
    }

    async fn updated(&self, _event: &mut Event) -> Result<(), EventError> {
        Ok(())
    }

    async fn saving(&self, _event: &mut Event) -> Result<(), EventError> {
        Ok(())
    }

    async fn saved(&self, _event: &mut Event) -> Result<(), EventError> {
        Ok(())
    }

    async fn deleting(&self, _event: &mut Event) -> Result<(), EventError> {
        Ok(())
    }

    async fn deleted(&self, _event: &mut Event) -> Result<(), EventError> {
        Ok(())
    }

    async fn force_deleting(&self, _event: &mut Event) -> Result<(), EventError> {
        Ok(())
    }

    async fn force_deleted(&self, _event: &mut Event) -> Result<(), EventError> {
        Ok(())
    }
}
