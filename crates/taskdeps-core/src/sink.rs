//! Delivery of dependency events to the outside world.

use std::sync::{Mutex, PoisonError};

use crate::model::DependencyEvent;

/// Receives blocked/unblocked events as the engine produces them.
///
/// Delivery happens while the engine's write lock is held, so
/// implementations should hand events off rather than block.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, event: &DependencyEvent);
}

impl<N: NotificationSink + ?Sized> NotificationSink for std::sync::Arc<N> {
    fn deliver(&self, event: &DependencyEvent) {
        (**self).deliver(event);
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl NotificationSink for NoopSink {
    fn deliver(&self, _event: &DependencyEvent) {}
}

/// Buffers events in memory until taken.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<DependencyEvent>>,
}

impl CollectingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain buffered events in delivery order.
    pub fn take(&self) -> Vec<DependencyEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl NotificationSink for CollectingSink {
    fn deliver(&self, event: &DependencyEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Emits each event as a structured `tracing` record at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn deliver(&self, event: &DependencyEvent) {
        match event {
            DependencyEvent::Blocked {
                task_id,
                blocking_task_id,
                blocking_task_ids,
            } => tracing::info!(
                task = %task_id,
                blocking = %blocking_task_id,
                blockers = blocking_task_ids.len(),
                "task blocked"
            ),
            DependencyEvent::Unblocked {
                task_id,
                resolved_task_id,
            } => tracing::info!(task = %task_id, resolved = %resolved_task_id, "task unblocked"),
        }
    }
}
