//! Lazily populated per-scope state owned by a strategy instance

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Concurrent get-or-create map from scope to shared state.
///
/// Entries live until evicted or until the owning strategy is dropped. Two
/// strategy instances never share entries.
pub(crate) struct ScopeMap<T> {
    entries: RwLock<HashMap<String, Arc<T>>>,
}

impl<T> ScopeMap<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Existing entry for `scope`, or a new one built by `init`.
    ///
    /// `init` runs under the write lock, so at most one entry is ever
    /// created per scope.
    pub(crate) fn get_or_insert_with<F>(&self, scope: &str, init: F) -> Arc<T>
    where
        F: FnOnce() -> T,
    {
        if let Some(entry) = self.get(scope) {
            return entry;
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            entries
                .entry(scope.to_string())
                .or_insert_with(|| Arc::new(init())),
        )
    }

    pub(crate) fn get(&self, scope: &str) -> Option<Arc<T>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(scope).map(Arc::clone)
    }

    pub(crate) fn remove(&self, scope: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(scope).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.len()
    }
}

impl<T> fmt::Debug for ScopeMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeMap")
            .field("scopes", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_get_or_insert_creates_once() {
        let map = ScopeMap::new();
        let created = AtomicUsize::new(0);

        let first = map.get_or_insert_with("a", || {
            created.fetch_add(1, Ordering::SeqCst);
            1u32
        });
        let second = map.get_or_insert_with("a", || {
            created.fetch_add(1, Ordering::SeqCst);
            2u32
        });

        assert_eq!(*first, 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_get_or_insert_yields_one_entry() {
        let map = ScopeMap::new();
        let created = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        map.get_or_insert_with("shared", || {
                            created.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                });
            }
        });

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_remove() {
        let map = ScopeMap::new();
        map.get_or_insert_with("a", || 0u8);

        assert!(map.remove("a"));
        assert!(!map.remove("a"));
        assert!(map.get("a").is_none());
    }
}
