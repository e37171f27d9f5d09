//! # Lifecycle Events
//!
//! Named hook points around mutations. Handlers are registered explicitly per
//! repository; a handler or the event bus returning `Some(false)` vetoes the
//! operation the caller is about to perform.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Hook points a concrete repository may fire around its mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Creating,
    Created,
    Updating,
    Updated,
    Deleting,
    Deleted,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 6] = [
        LifecycleEvent::Creating,
        LifecycleEvent::Created,
        LifecycleEvent::Updating,
        LifecycleEvent::Updated,
        LifecycleEvent::Deleting,
        LifecycleEvent::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::Creating => "creating",
            LifecycleEvent::Created => "created",
            LifecycleEvent::Updating => "updating",
            LifecycleEvent::Updated => "updated",
            LifecycleEvent::Deleting => "deleting",
            LifecycleEvent::Deleted => "deleted",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a handler and the bus receive when an event fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryEvent {
    pub kind: LifecycleEvent,
    /// Concrete repository type that fired the event.
    pub repository: String,
    pub table: String,
}

/// Per-repository reaction to a lifecycle event.
///
/// `Some(false)` vetoes; `Some(true)` and `None` let the operation proceed.
pub trait LifecycleHandler: Send + Sync {
    fn handle(&self, event: &RepositoryEvent) -> Option<bool>;
}

impl<F> LifecycleHandler for F
where
    F: Fn(&RepositoryEvent) -> Option<bool> + Send + Sync,
{
    fn handle(&self, event: &RepositoryEvent) -> Option<bool> {
        self(event)
    }
}

/// Application-wide publisher for lifecycle events.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: &RepositoryEvent) -> Option<bool>;
}

/// Lifecycle name to handler mapping, fixed at construction.
#[derive(Clone, Default)]
pub struct EventRegistry {
    handlers: HashMap<LifecycleEvent, Arc<dyn LifecycleHandler>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: LifecycleEvent, handler: Arc<dyn LifecycleHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn get(&self, kind: LifecycleEvent) -> Option<&Arc<dyn LifecycleHandler>> {
        self.handlers.get(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

/// Run the registered handler for `event`, then the bus.
///
/// Returns `false` when either vetoes.
pub fn dispatch(
    registry: &EventRegistry,
    bus: Option<&dyn EventBus>,
    event: &RepositoryEvent,
) -> bool {
    let Some(handler) = registry.get(event.kind) else {
        return true;
    };

    if handler.handle(event) == Some(false) {
        tracing::warn!(
            event = %event.kind,
            repository = %event.repository,
            "Lifecycle handler vetoed operation"
        );
        return false;
    }

    match bus {
        Some(bus) if bus.publish(event) == Some(false) => {
            tracing::warn!(
                event = %event.kind,
                repository = %event.repository,
                "Event bus vetoed operation"
            );
            false
        }
        _ => true,
    }
}
