//! Replication of records to several downstream receivers.

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::component::ComponentPath;
use crate::service::labelstore::LabelStore;

use super::appender::{AppendError, Appendable, Appender, MetricsReceiver};
use super::receiver::LogsReceiver;
use super::record::{is_stale_marker, Labels, LogEntry, SeriesRef, Timestamp};

/// Sends every sample to a list of [`MetricsReceiver`]s.
///
/// The list can be replaced with [`Fanout::update_targets`] while appenders are in use:
/// an appender keeps the targets that existed when it was opened.
pub struct Fanout {
    owner: ComponentPath,
    targets: RwLock<Arc<[MetricsReceiver]>>,
    label_store: Option<Arc<dyn LabelStore>>,
}

/// Sends every log entry to a list of [`LogsReceiver`]s.
pub struct LogsFanout {
    targets: RwLock<Arc<[LogsReceiver]>>,
}

/// Error returned when some targets of a fanout fail.
///
/// The other targets have still received the record.
#[derive(Debug, thiserror::Error)]
#[error("{} fanout target(s) failed{}", .failures.len(), render_failures(.failures))]
pub struct FanoutError {
    pub failures: Vec<FanoutFailure>,
}

/// The failure of one target.
#[derive(Debug)]
pub struct FanoutFailure {
    pub target: ComponentPath,
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

impl Fanout {
    /// Creates a fanout for the component `owner`.
    ///
    /// If a label store is given, each appended series is assigned a global reference
    /// in the store, and stale markers are recorded there.
    pub fn new(
        owner: ComponentPath,
        targets: Vec<MetricsReceiver>,
        label_store: Option<Arc<dyn LabelStore>>,
    ) -> Self {
        Self {
            owner,
            targets: RwLock::new(targets.into()),
            label_store,
        }
    }

    /// Replaces the targets. Appenders that are already open are not affected.
    pub fn update_targets(&self, targets: Vec<MetricsReceiver>) {
        let mut guard = self.targets.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = targets.into();
    }

    /// Returns the current targets.
    pub fn targets(&self) -> Arc<[MetricsReceiver]> {
        self.targets
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Appendable for Fanout {
    fn appender(&self) -> Box<dyn Appender> {
        let targets = self.targets();
        let children = targets
            .iter()
            .map(|t| (t.owner().clone(), t.appender()))
            .collect();
        Box::new(FanoutAppender {
            component: self.owner.to_string(),
            children,
            label_store: self.label_store.clone(),
        })
    }
}

impl fmt::Debug for Fanout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fanout")
            .field("owner", &self.owner)
            .field("targets", &self.targets())
            .finish()
    }
}

struct FanoutAppender {
    component: String,
    children: Vec<(ComponentPath, Box<dyn Appender>)>,
    label_store: Option<Arc<dyn LabelStore>>,
}

impl Appender for FanoutAppender {
    fn append(&mut self, labels: &Labels, timestamp: Timestamp, value: f64) -> Result<SeriesRef, AppendError> {
        let mut series = SeriesRef::default();
        if let Some(store) = &self.label_store {
            series = store.get_or_add_global_ref(labels);
            if is_stale_marker(value) {
                store.mark_stale(series, true);
            } else if store.is_stale(series) {
                store.mark_stale(series, false);
            }
        }

        let mut failures = Vec::new();
        for (target, child) in self.children.iter_mut() {
            if let Err(e) = child.append(labels, timestamp, value) {
                failures.push(FanoutFailure::new(target.clone(), e));
            }
        }
        FanoutError::check(failures)?;
        Ok(series)
    }

    fn commit(self: Box<Self>) -> Result<(), AppendError> {
        let mut failures = Vec::new();
        for (target, child) in self.children {
            if let Err(e) = child.commit() {
                failures.push(FanoutFailure::new(target, e));
            }
        }
        FanoutError::check(failures)?;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), AppendError> {
        let mut failures = Vec::new();
        for (target, child) in self.children {
            if let Err(e) = child.rollback() {
                failures.push(FanoutFailure::new(target, e));
            }
        }
        if !failures.is_empty() {
            log::debug!("rollback of {} failed for {} target(s)", self.component, failures.len());
        }
        FanoutError::check(failures)?;
        Ok(())
    }
}

impl LogsFanout {
    pub fn new(targets: Vec<LogsReceiver>) -> Self {
        Self {
            targets: RwLock::new(targets.into()),
        }
    }

    pub fn update_targets(&self, targets: Vec<LogsReceiver>) {
        let mut guard = self.targets.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = targets.into();
    }

    pub fn targets(&self) -> Arc<[LogsReceiver]> {
        self.targets
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Sends the entry to every target, in order.
    ///
    /// Waits for each target that applies back-pressure. A failing target does not
    /// prevent the next ones from receiving the entry.
    pub async fn send(&self, entry: LogEntry) -> Result<(), FanoutError> {
        let targets = self.targets();
        let mut failures = Vec::new();
        for target in targets.iter() {
            if let Err(e) = target.send(entry.clone()).await {
                failures.push(FanoutFailure::new(target.owner().clone(), e));
            }
        }
        FanoutError::check(failures)
    }
}

impl fmt::Debug for LogsFanout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogsFanout").field("targets", &self.targets()).finish()
    }
}

impl FanoutFailure {
    fn new(target: ComponentPath, error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            target,
            error: Box::new(error),
        }
    }
}

impl FanoutError {
    fn check(failures: Vec<FanoutFailure>) -> Result<(), FanoutError> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(FanoutError { failures })
        }
    }

    /// The targets that failed.
    pub fn failed_targets(&self) -> impl Iterator<Item = &ComponentPath> {
        self.failures.iter().map(|f| &f.target)
    }
}

/// One line per failure: `\n- <target>: <error>`.
fn render_failures(failures: &[FanoutFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("\n- {}: {}", failure.target, failure.error))
        .collect()
}
