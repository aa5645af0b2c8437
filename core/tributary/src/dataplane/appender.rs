use std::fmt;
use std::sync::Arc;

use crate::component::ComponentPath;

use super::fanout::FanoutError;
use super::record::{Labels, SeriesRef, Timestamp};

/// Something that accepts samples.
pub trait Appendable: Send + Sync {
    /// Opens a new batch.
    fn appender(&self) -> Box<dyn Appender>;
}

/// A batch of samples.
///
/// Exactly one of [`commit`](Appender::commit) and [`rollback`](Appender::rollback) must be
/// called to close the batch. Both take the appender by value, so that it cannot be used
/// after the batch has been closed.
///
/// An appender is not shared between callers: each call site opens its own batch.
pub trait Appender: Send {
    /// Adds a sample to the batch.
    ///
    /// Returns a reference to the series, which the caller may keep to identify it later.
    fn append(&mut self, labels: &Labels, timestamp: Timestamp, value: f64) -> Result<SeriesRef, AppendError>;

    /// Makes the batch visible downstream.
    fn commit(self: Box<Self>) -> Result<(), AppendError>;

    /// Discards the batch.
    fn rollback(self: Box<Self>) -> Result<(), AppendError>;
}

/// Error which can occur when appending, committing or rolling back samples.
#[derive(Debug, thiserror::Error)]
pub enum AppendError {
    /// The receiver is no longer accepting samples, for instance because its component has been removed.
    #[error("the receiver is closed")]
    Closed,
    /// The sample is invalid for this receiver.
    #[error("sample rejected: {0}")]
    Rejected(String),
    /// Some targets of a fanout have failed.
    #[error(transparent)]
    Fanout(#[from] FanoutError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Handle to the [`Appendable`] of a component, as exported to other components.
///
/// The handle remembers which component it belongs to, so that errors can name it.
#[derive(Clone)]
pub struct MetricsReceiver {
    owner: ComponentPath,
    inner: Arc<dyn Appendable>,
}

impl MetricsReceiver {
    pub fn new(owner: ComponentPath, appendable: Arc<dyn Appendable>) -> Self {
        Self {
            owner,
            inner: appendable,
        }
    }

    /// The component that exported this receiver.
    pub fn owner(&self) -> &ComponentPath {
        &self.owner
    }
}

impl Appendable for MetricsReceiver {
    fn appender(&self) -> Box<dyn Appender> {
        self.inner.appender()
    }
}

impl fmt::Debug for MetricsReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MetricsReceiver({})", self.owner)
    }
}

#[cfg(test)]
mod tests {
    use super::{Appender, MetricsReceiver};

    #[test]
    fn type_constraints() {
        crate::assert_send::<Box<dyn Appender>>();
        crate::assert_send::<MetricsReceiver>();
        crate::assert_sync::<MetricsReceiver>();
    }
}
