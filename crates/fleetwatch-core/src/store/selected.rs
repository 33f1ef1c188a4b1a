// ── Selected-container detail ──
//
// Singleton, independent of the container list. Each detail message
// replaces the held value wholesale; nothing is merged.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::debug;

use crate::model::{ContainerDetail, EntityId};

pub struct SelectedContainer {
    selection: Mutex<Selection>,
    detail: watch::Sender<Option<Arc<ContainerDetail>>>,
}

#[derive(Default)]
struct Selection {
    id: Option<EntityId>,
    /// Set once the live topic delivered a detail for `id`.
    streamed: bool,
}

impl SelectedContainer {
    pub fn new() -> Self {
        let (detail, _) = watch::channel(None);
        Self {
            selection: Mutex::new(Selection::default()),
            detail,
        }
    }

    /// Start tracking `id`. Any detail held for a previous selection is
    /// dropped.
    pub fn select(&self, id: EntityId) {
        let mut selection = self.lock();
        if selection.id.as_ref() != Some(&id) {
            self.detail.send_replace(None);
            selection.streamed = false;
        }
        selection.id = Some(id);
    }

    /// Replace the held detail with one from the live topic. Ignored
    /// (returns `false`) if nothing is selected or the detail belongs to
    /// another container.
    pub fn replace(&self, detail: ContainerDetail) -> bool {
        let mut selection = self.lock();
        if selection.id.as_ref() != Some(detail.id()) {
            debug!(container = %detail.id(), "ignoring detail for unselected container");
            return false;
        }
        selection.streamed = true;
        self.detail.send_replace(Some(Arc::new(detail)));
        true
    }

    /// Install a REST-loaded detail unless the live topic already delivered
    /// one for the same selection.
    pub fn fill(&self, detail: ContainerDetail) -> bool {
        let selection = self.lock();
        if selection.id.as_ref() != Some(detail.id()) {
            debug!(container = %detail.id(), "ignoring detail for unselected container");
            return false;
        }
        if selection.streamed {
            debug!(container = %detail.id(), "live detail is newer; dropping REST detail");
            return false;
        }
        self.detail.send_replace(Some(Arc::new(detail)));
        true
    }

    /// Deselect and drop the held detail.
    pub fn clear(&self) {
        let mut selection = self.lock();
        *selection = Selection::default();
        self.detail.send_replace(None);
    }

    pub fn current(&self) -> Option<Arc<ContainerDetail>> {
        self.detail.borrow().clone()
    }

    pub fn selected_id(&self) -> Option<EntityId> {
        self.lock().id.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<ContainerDetail>>> {
        self.detail.subscribe()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Selection> {
        self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SelectedContainer {
    fn default() -> Self {
        Self::new()
    }
}
