//! Streaming primitives that move telemetry records between running components.
//!
//! Two kinds of records flow through the graph:
//! - [`Sample`]s (metrics), pushed in batches through an [`Appender`] obtained from an
//!   [`Appendable`]. A batch is made visible with [`Appender::commit`] or discarded with
//!   [`Appender::rollback`].
//! - [`LogEntry`]s, sent to a [`LogsReceiver`], which exerts back-pressure on the sender.
//!
//! Components that consume records export a handle (a [`MetricsReceiver`] or a
//! [`LogsReceiver`]) wrapped in a [`Capsule`](crate::value::Capsule).
//! Components that produce records accept a list of such handles (usually in a
//! `forward_to` argument) and replicate each record to all of them with a [`Fanout`]
//! or a [`LogsFanout`].

mod appender;
mod fanout;
mod receiver;
mod record;

pub use appender::{AppendError, Appendable, Appender, MetricsReceiver};
pub use fanout::{FanoutError, FanoutFailure, Fanout, LogsFanout};
pub use receiver::{DropPolicy, LogsReceiver, LogsStream, ReceiveError};
pub use record::{is_stale_marker, stale_marker, Labels, LogEntry, Sample, SeriesRef, Timestamp};
