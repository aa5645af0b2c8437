//! Publication of component exports.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::value::Value;

/// Stable identifier of a node, which does not change when the graph is reloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(pub(crate) u64);

/// The latest exports of a node.
#[derive(Debug, Default)]
pub(crate) struct ExportCell {
    value: Mutex<Option<Value>>,
    /// Set when new exports are published, cleared by the controller when it schedules the dependents.
    dirty: AtomicBool,
    version: AtomicU64,
}

/// Publishes the exports of a component.
///
/// Obtained from the [`BuildContext`](crate::component::BuildContext), it can be cloned and
/// moved to the task of the component.
#[derive(Debug, Clone)]
pub struct ExportPublisher {
    cell: Arc<ExportCell>,
    key: NodeKey,
    notify: Option<mpsc::UnboundedSender<NodeKey>>,
}

impl ExportCell {
    /// Returns a copy of the current exports, `None` if nothing has been published yet.
    pub fn snapshot(&self) -> Option<Value> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Clears the dirty flag and returns its previous state.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Number of changes since the creation of the cell.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

impl ExportPublisher {
    pub(crate) fn new(cell: Arc<ExportCell>, key: NodeKey, notify: mpsc::UnboundedSender<NodeKey>) -> Self {
        Self {
            cell,
            key,
            notify: Some(notify),
        }
    }

    /// Creates a publisher that is not connected to any controller.
    ///
    /// Useful to test a component outside of a graph: the exports can be read with
    /// [`current`](Self::current).
    pub fn detached() -> Self {
        Self {
            cell: Arc::new(ExportCell::default()),
            key: NodeKey(0),
            notify: None,
        }
    }

    /// Replaces the exports of the component.
    ///
    /// If the new exports are equal to the current ones, nothing happens.
    /// Otherwise, the dependents of the component are re-evaluated by the controller.
    /// Multiple publications in a short time are coalesced: the dependents only see the latest exports.
    pub fn publish(&self, exports: Value) {
        {
            let mut current = self.cell.value.lock().unwrap_or_else(PoisonError::into_inner);
            if current.as_ref() == Some(&exports) {
                return;
            }
            *current = Some(exports);
            self.cell.version.fetch_add(1, Ordering::AcqRel);
        }
        let already_notified = self.cell.dirty.swap(true, Ordering::AcqRel);
        if !already_notified {
            if let Some(tx) = &self.notify {
                // the controller is gone when shutting down, nothing to propagate
                let _ = tx.send(self.key);
            }
        }
    }

    /// Returns a copy of the current exports.
    pub fn current(&self) -> Option<Value> {
        self.cell.snapshot()
    }
}
