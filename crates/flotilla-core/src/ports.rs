//! Port definitions (trait abstractions) for external systems.
//!
//! The supervisor never talks to a UI or IPC transport directly; it hands
//! every event to an `EventSink`. Adapters implement the sink for their
//! transport (broadcast channel, Tauri emitter, stdio, SSE).

use std::sync::Arc;

use crate::events::SupervisorEvent;

/// Trait for publishing supervisor events.
///
/// Implementations must not block: events are emitted from the tasks that
/// read process output.
pub trait EventSink: Send + Sync {
    /// Publish an event.
    fn emit(&self, event: SupervisorEvent);
}

/// A no-op sink for tests and contexts without listeners.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: SupervisorEvent) {}
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: SupervisorEvent) {
        (**self).emit(event);
    }
}
