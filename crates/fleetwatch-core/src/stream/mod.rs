// ── Store subscriptions ──
//
// Readers of a domain store get an `EntityStream`: the visible list at
// subscribe time plus change notification. For the container store the
// visible list is the frozen copy while paused.

mod filter;

use std::sync::Arc;

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

pub use filter::{AgentFilter, ContainerFilter};

/// One published state of a store, in insertion order.
pub type Snapshot<T> = Arc<Vec<Arc<T>>>;

pub struct EntityStream<T: Clone + Send + Sync + 'static> {
    current: Snapshot<T>,
    receiver: watch::Receiver<Snapshot<T>>,
}

impl<T: Clone + Send + Sync + 'static> EntityStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot<T>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot as of subscribe, or as of the last `changed()`/`wait_for()`.
    pub fn current(&self) -> &Snapshot<T> {
        &self.current
    }

    /// What the store shows right now, without marking it seen.
    pub fn latest(&self) -> Snapshot<T> {
        self.receiver.borrow().clone()
    }

    /// Next visible change. `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Snapshot<T>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    /// Resolve with the first visible snapshot (the current one included)
    /// that satisfies `pred`. `None` once the store is gone.
    pub async fn wait_for(&mut self, pred: impl FnMut(&Snapshot<T>) -> bool) -> Option<Snapshot<T>> {
        let snap = self.receiver.wait_for(pred).await.ok()?.clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    /// Every visible snapshot as a `Stream`, starting with the current one.
    pub fn into_stream(self) -> impl Stream<Item = Snapshot<T>> + Unpin {
        WatchStream::new(self.receiver)
    }
}
