//! Stable identities for label sets.
//!
//! Each component may assign its own local [`SeriesRef`] to the series it forwards.
//! The label store gives every distinct label set a _global_ reference, shared by all the
//! components of the process, so that downstream stages can compare and aggregate series
//! without comparing their labels.

use std::sync::{PoisonError, RwLock};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::dataplane::{Labels, SeriesRef};

use super::Service;

/// Name under which the label store is usually registered.
pub const SERVICE_NAME: &str = "labelstore";

/// Label-set-to-identity resolution.
pub trait LabelStore: Send + Sync {
    /// Returns the global reference of `labels`, creating it if needed.
    fn get_or_add_global_ref(&self, labels: &Labels) -> SeriesRef;

    /// Finds the labels associated with a global reference.
    fn labels(&self, global: SeriesRef) -> Option<Labels>;

    /// Remembers that the series `local` of `component` is the global series `global`.
    fn add_local_link(&self, component: &str, global: SeriesRef, local: SeriesRef);

    /// Finds the global reference of the series `local` of `component`.
    fn global_ref_for(&self, component: &str, local: SeriesRef) -> Option<SeriesRef>;

    /// Marks (or unmarks) a global series as stale.
    fn mark_stale(&self, global: SeriesRef, stale: bool);

    fn is_stale(&self, global: SeriesRef) -> bool;
}

/// In-memory implementation of [`LabelStore`].
#[derive(Default)]
pub struct MemoryLabelStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    refs_by_labels: FxHashMap<Labels, SeriesRef>,
    labels_by_ref: FxHashMap<SeriesRef, Labels>,
    local_links: FxHashMap<String, FxHashMap<SeriesRef, SeriesRef>>,
    stale: FxHashSet<SeriesRef>,
}

impl MemoryLabelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of distinct label sets in the store.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).labels_by_ref.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Inner {
    /// Generates a new reference and inserts it in the store.
    ///
    /// NOTE: the caller must ensure that `labels` is not in the store yet.
    fn register_new(&mut self, labels: &Labels) -> SeriesRef {
        // references start at 1, 0 means "no reference"
        let id = SeriesRef(self.labels_by_ref.len() as u64 + 1);

        let prev = self.refs_by_labels.insert(labels.clone(), id);
        debug_assert!(prev.is_none(), "duplicate label set {labels}");

        let prev = self.labels_by_ref.insert(id, labels.clone());
        debug_assert!(prev.is_none(), "duplicate series ref {}", id.0);

        id
    }
}

impl LabelStore for MemoryLabelStore {
    fn get_or_add_global_ref(&self, labels: &Labels) -> SeriesRef {
        // fast path: the labels are already known
        {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(id) = inner.refs_by_labels.get(labels) {
                return *id;
            }
        }
        // slow path: check again with the write lock, another thread may have registered the labels
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match inner.refs_by_labels.get(labels) {
            Some(id) => *id,
            None => inner.register_new(labels),
        }
    }

    fn labels(&self, global: SeriesRef) -> Option<Labels> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.labels_by_ref.get(&global).cloned()
    }

    fn add_local_link(&self, component: &str, global: SeriesRef, local: SeriesRef) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match inner.local_links.get_mut(component) {
            Some(links) => {
                links.insert(local, global);
            }
            None => {
                let mut links = FxHashMap::default();
                links.insert(local, global);
                inner.local_links.insert(component.to_owned(), links);
            }
        }
    }

    fn global_ref_for(&self, component: &str, local: SeriesRef) -> Option<SeriesRef> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.local_links.get(component).and_then(|links| links.get(&local)).copied()
    }

    fn mark_stale(&self, global: SeriesRef, stale: bool) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if stale {
            inner.stale.insert(global);
        } else {
            inner.stale.remove(&global);
        }
    }

    fn is_stale(&self, global: SeriesRef) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.stale.contains(&global)
    }
}

impl Service for MemoryLabelStore {}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{LabelStore, MemoryLabelStore};
    use crate::dataplane::{Labels, SeriesRef};

    #[test]
    fn stable_identity() {
        let store = MemoryLabelStore::new();
        assert!(store.is_empty());

        let a = Labels::from_pairs([("job", "node"), ("instance", "host-1")]);
        let a_reordered = Labels::from_pairs([("instance", "host-1"), ("job", "node")]);
        let b = Labels::from_pairs([("job", "node"), ("instance", "host-2")]);

        let ref_a = store.get_or_add_global_ref(&a);
        let ref_b = store.get_or_add_global_ref(&b);
        assert_ne!(ref_a, ref_b);
        assert_eq!(store.get_or_add_global_ref(&a_reordered), ref_a);
        assert_eq!(store.len(), 2);
        assert_eq!(store.labels(ref_b), Some(b));
        assert_eq!(store.labels(SeriesRef(999)), None);
    }

    #[test]
    fn local_links_and_staleness() {
        let store = MemoryLabelStore::new();
        let global = store.get_or_add_global_ref(&Labels::from_pairs([("a", "1")]));
        store.add_local_link("metrics.relabel.x", global, SeriesRef(12));
        assert_eq!(store.global_ref_for("metrics.relabel.x", SeriesRef(12)), Some(global));
        assert_eq!(store.global_ref_for("metrics.relabel.y", SeriesRef(12)), None);

        assert!(!store.is_stale(global));
        store.mark_stale(global, true);
        assert!(store.is_stale(global));
        store.mark_stale(global, false);
        assert!(!store.is_stale(global));
    }

    #[test]
    fn concurrent_registration() {
        let store = Arc::new(MemoryLabelStore::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|i| store.get_or_add_global_ref(&Labels::from_pairs([("i", i.to_string())])))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<Vec<SeriesRef>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(store.len(), 100);
        for r in &results[1..] {
            assert_eq!(r, &results[0], "every thread must observe the same identities");
        }
    }
}
