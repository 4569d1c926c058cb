//! Process-wide, write-once state.
//!
//! All first-time initializations go through one process-wide reentrant
//! guard, so an initializer may itself initialize another global (the JNI
//! layer acquires the runtime host and then populates the reference cache).
//! Once a value is set, reads never take the guard.

use std::sync::{LazyLock, OnceLock};

use parking_lot::ReentrantMutex;

static GLOBAL_GUARD: LazyLock<ReentrantMutex<()>> = LazyLock::new(|| ReentrantMutex::new(()));

/// A value set at most once per process, by the first successful initializer.
pub struct ProcessGlobal<T> {
    cell: OnceLock<T>,
}

impl<T> ProcessGlobal<T> {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// The value, if some initializer already succeeded.
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    /// Returns the value, running `init` under the global guard if unset.
    ///
    /// A failing `init` leaves the global unset; the next caller retries.
    pub fn get_or_try_init<E>(&self, init: impl FnOnce() -> Result<T, E>) -> Result<&T, E> {
        if let Some(value) = self.cell.get() {
            return Ok(value);
        }

        let _guard = GLOBAL_GUARD.lock();
        if let Some(value) = self.cell.get() {
            return Ok(value);
        }
        let value = init()?;
        Ok(self.cell.get_or_init(|| value))
    }
}

impl<T> Default for ProcessGlobal<T> {
    fn default() -> Self {
        Self::new()
    }
}
