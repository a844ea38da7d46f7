//! Reentrancy protection for PAC document loading.
//!
//! Some network stacks ask for a proxy whenever *any* connection is opened,
//! including the connection that fetches the PAC document. Without a guard the
//! fetch would trigger a resolution, which would trigger a fetch, and so on.

use std::cell::Cell;

thread_local! {
    static THREAD_GUARD: ReentrancyGuard = const { ReentrancyGuard::new() };
}

/// Per-worker "currently loading the PAC document" flag.
///
/// Not `Sync`: each worker (or thread) owns its own guard. Two workers may
/// load at the same time; one worker may not load inside its own load.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    loading: Cell<bool>,
}

impl ReentrancyGuard {
    pub const fn new() -> Self {
        Self {
            loading: Cell::new(false),
        }
    }

    /// Runs `f` with the calling thread's default guard.
    pub fn with_current<R>(f: impl FnOnce(&ReentrancyGuard) -> R) -> R {
        THREAD_GUARD.with(|guard| f(guard))
    }

    pub fn is_loading(&self) -> bool {
        self.loading.get()
    }

    /// Marks the worker as loading. Returns `false` if it already was.
    pub fn try_begin_load(&self) -> bool {
        !self.loading.replace(true)
    }

    pub fn finish_load(&self) {
        self.loading.set(false);
    }
}
