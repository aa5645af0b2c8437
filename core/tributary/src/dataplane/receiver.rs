use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::component::ComponentPath;

use super::record::LogEntry;

/// What a [`LogsReceiver`] does when its buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DropPolicy {
    /// The sender waits until there is room in the buffer.
    #[default]
    Block,
    /// The new entry is dropped, and counted in [`LogsReceiver::dropped`].
    DropNewest,
}

/// Sending side of a bounded logs channel, exported by the components that consume logs.
#[derive(Clone)]
pub struct LogsReceiver {
    owner: ComponentPath,
    tx: mpsc::Sender<LogEntry>,
    policy: DropPolicy,
    dropped: Arc<AtomicU64>,
}

/// Receiving side of a logs channel, kept by the component that consumes the logs.
pub struct LogsStream {
    rx: mpsc::Receiver<LogEntry>,
    dropped: Arc<AtomicU64>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReceiveError {
    /// The receiving side has been dropped.
    #[error("the logs receiver of {0} is closed")]
    Closed(ComponentPath),
}

impl LogsReceiver {
    /// Creates a new channel that blocks the senders when `capacity` entries are waiting.
    pub fn channel(owner: ComponentPath, capacity: usize) -> (LogsReceiver, LogsStream) {
        Self::with_policy(owner, capacity, DropPolicy::Block)
    }

    /// Creates a new channel with the given policy.
    pub fn with_policy(owner: ComponentPath, capacity: usize, policy: DropPolicy) -> (LogsReceiver, LogsStream) {
        let (tx, rx) = mpsc::channel(capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        let receiver = LogsReceiver {
            owner,
            tx,
            policy,
            dropped: dropped.clone(),
        };
        (receiver, LogsStream { rx, dropped })
    }

    /// Sends an entry to the receiver.
    ///
    /// With [`DropPolicy::Block`], waits until there is room in the buffer.
    /// With [`DropPolicy::DropNewest`], never waits.
    pub async fn send(&self, entry: LogEntry) -> Result<(), ReceiveError> {
        match self.policy {
            DropPolicy::Block => self
                .tx
                .send(entry)
                .await
                .map_err(|_| ReceiveError::Closed(self.owner.clone())),
            DropPolicy::DropNewest => match self.tx.try_send(entry) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(ReceiveError::Closed(self.owner.clone())),
            },
        }
    }

    /// The component that exported this receiver.
    pub fn owner(&self) -> &ComponentPath {
        &self.owner
    }

    pub fn policy(&self) -> DropPolicy {
        self.policy
    }

    /// The number of entries dropped because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for LogsReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogsReceiver({}, {:?})", self.owner, self.policy)
    }
}

impl LogsStream {
    /// Receives the next entry, or `None` if every [`LogsReceiver`] has been dropped.
    pub async fn recv(&mut self) -> Option<LogEntry> {
        self.rx.recv().await
    }

    /// Receives an entry if one is immediately available.
    pub fn try_recv(&mut self) -> Option<LogEntry> {
        self.rx.try_recv().ok()
    }

    /// The number of entries dropped because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
