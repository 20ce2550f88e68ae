use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::event_error::EventError;
use crate::events::{Event, ModelEvent, ModelType, Observer};
use crate::model::Model;

/// One registration: an observer bound to a model type
#[derive(Clone)]
pub struct ObserverEntry {
    pub model: ModelType,
    pub observer: Arc<dyn Observer>,
}

impl std::fmt::Debug for ObserverEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverEntry")
            .field("model", &self.model.name)
            .finish_non_exhaustive()
    }
}

/// Ordered observer registrations shared by every query of an ORM instance.
///
/// Registering the same observer twice keeps both entries, so it fires twice.
#[derive(Debug, Default)]
pub struct ObserverRegistry {
    entries: RwLock<Vec<ObserverEntry>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M: Model>(&self, observer: impl Observer + 'static) {
        self.register_arc::<M>(Arc::new(observer));
    }

    pub fn register_arc<M: Model>(&self, observer: Arc<dyn Observer>) {
        let model = ModelType::of::<M>();
        debug!(model = model.name, "registering observer");
        self.entries.write().push(ObserverEntry { model, observer });
    }

    /// Observers for `model` in registration order
    pub fn observers_for(&self, model: ModelType) -> Vec<Arc<dyn Observer>> {
        self.entries
            .read()
            .iter()
            .filter(|entry| entry.model == model)
            .map(|entry| entry.observer.clone())
            .collect()
    }

    pub fn has_observers_for<M: Model>(&self) -> bool {
        let model = ModelType::of::<M>();
        self.entries.read().iter().any(|entry| entry.model == model)
    }

    pub fn entries(&self) -> Vec<ObserverEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Run `kind` on every observer of the event's model, stopping at the first error
    pub async fn dispatch(&self, kind: ModelEvent, event: &mut Event) -> Result<(), EventError> {
        // Snapshot so the lock is not held across hook awaits
        let observers = self.observers_for(event.model());
        if observers.is_empty() {
            return Ok(());
        }

        debug!(
            event = kind.name(),
            model = event.model().name,
            observers = observers.len(),
            "dispatching model event"
        );

        for observer in observers {
            invoke(observer.as_ref(), kind, event).await?;
        }
        Ok(())
    }
}

async fn invoke(observer: &dyn Observer, kind: ModelEvent, event: &mut Event) -> Result<(), EventError> {
    match kind {
        ModelEvent::Retrieved => observer.retrieved(event).await,
        ModelEvent::Creating => observer.creating(event).await,
        ModelEvent::Created => observer.created(event).await,
        ModelEvent::Updating => observer.updating(event).await,
        ModelEvent::Updated => observer.updated(event).await,
        ModelEvent::Saving => observer.saving(event).await,
        ModelEvent::Saved => observer.saved(event).await,
        ModelEvent::Deleting => observer.deleting(event).await,
        ModelEvent::Deleted => observer.deleted(event).await,
        ModelEvent::ForceDeleting => observer.force_deleting(event).await,
        ModelEvent::ForceDeleted => observer.force_deleted(event).await,
    }
}
