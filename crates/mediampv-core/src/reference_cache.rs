//! Process-wide table of resolved cross-runtime call targets.
//!
//! The key set is fixed at compile time ([`CallKey::ALL`]). The table is
//! resolved as a whole by the first successful registration and never
//! refreshed afterwards; pump threads read it without locking.
//!
//! ## Limitations
//!
//! First registration wins. Handles whose observers implement a different
//! managed type than the first one registered are not supported: they would
//! be dispatched through the first type's call targets.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::global::ProcessGlobal;

/// A call target identifier: one (class, method signature) pair.
pub trait CallKey: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Every key resolved when the cache is populated.
    const ALL: &'static [Self];
}

/// Write-once mapping from [`CallKey`] to a resolved target.
pub struct ReferenceCache<K: CallKey, T> {
    table: ProcessGlobal<HashMap<K, T>>,
}

impl<K: CallKey, T> ReferenceCache<K, T> {
    pub const fn new() -> Self {
        Self {
            table: ProcessGlobal::new(),
        }
    }

    /// Resolves every key unless the cache is already populated.
    ///
    /// Idempotent: once populated, `resolve` is never called again. If any
    /// key fails to resolve the cache stays empty and the error is returned.
    pub fn populate<E>(&self, mut resolve: impl FnMut(K) -> Result<T, E>) -> Result<(), E> {
        self.table.get_or_try_init(|| {
            let mut table = HashMap::with_capacity(K::ALL.len());
            for &key in K::ALL {
                table.insert(key, resolve(key)?);
            }
            tracing::debug!("reference cache populated with {} call targets", table.len());
            Ok(table)
        })?;
        Ok(())
    }

    /// The resolved target for `key`, if populated.
    pub fn get(&self, key: K) -> Option<&T> {
        self.table.get().and_then(|table| table.get(&key))
    }

    pub fn is_populated(&self) -> bool {
        self.table.get().is_some()
    }
}

impl<K: CallKey, T> Default for ReferenceCache<K, T> {
    fn default() -> Self {
        Self::new()
    }
}
