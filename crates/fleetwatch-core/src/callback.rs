// ── Callback slots ──
//
// A slot owns one consumer callback. Invocation holds the slot's lock for
// the duration of the call; `close()` flips the closed flag and then takes
// the same lock, so once it returns no invocation is running or will start.
//
// A callback may close its own slot (or invoke paths that would) from
// inside the call. The thread-local ACTIVE list detects that case: closing
// an active slot only sets the flag, and nested invocation of an active
// slot is skipped instead of deadlocking.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

type Handler<E> = Box<dyn FnMut(&E) + Send>;

thread_local! {
    static ACTIVE: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Pops the slot address off ACTIVE even if the callback panics.
struct ActiveGuard(usize);

impl ActiveGuard {
    fn enter(addr: usize) -> Self {
        ACTIVE.with(|active| active.borrow_mut().push(addr));
        Self(addr)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(pos) = active.iter().rposition(|a| *a == self.0) {
                active.remove(pos);
            }
        });
    }
}

pub(crate) struct CallbackSlot<E> {
    closed: AtomicBool,
    handler: Mutex<Option<Handler<E>>>,
}

impl<E> CallbackSlot<E> {
    pub(crate) fn new(handler: impl FnMut(&E) + Send + 'static) -> Self {
        Self {
            closed: AtomicBool::new(false),
            handler: Mutex::new(Some(Box::new(handler))),
        }
    }

    fn addr(&self) -> usize {
        std::ptr::from_ref(self).addr()
    }

    fn is_active_here(&self) -> bool {
        let addr = self.addr();
        ACTIVE.with(|active| active.borrow().contains(&addr))
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Run the callback unless the slot is closed. Returns whether it ran.
    pub(crate) fn invoke(&self, event: &E) -> bool {
        if self.is_closed() || self.is_active_here() {
            return false;
        }

        let _active = ActiveGuard::enter(self.addr());
        let mut handler = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        // Re-check under the lock: close() may have won the race.
        if self.is_closed() {
            return false;
        }
        match handler.as_mut() {
            Some(f) => {
                f(event);
                true
            }
            None => false,
        }
    }

    /// Close the slot, waiting for an in-flight invocation on another thread.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if self.is_active_here() {
            // Called from inside our own callback; the lock is ours.
            return;
        }
        let mut handler = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        handler.take();
    }
}

impl<E> std::fmt::Debug for CallbackSlot<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSlot")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
