use std::time::Duration;

use thiserror::Error;

use crate::component::{BuildError, ComponentPath};
use crate::graph::LoadError;

/// A failure that concerns a single node. The rest of the graph is not affected.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NodeError {
    #[error("failed to build {path}: {source}")]
    Build {
        path: ComponentPath,
        #[source]
        source: BuildError,
    },
    #[error("failed to update {path}: {source:#}")]
    Update {
        path: ComponentPath,
        #[source]
        source: anyhow::Error,
    },
    /// The task of the node has returned an error, or has panicked.
    #[error("{path} has failed: {source:#}")]
    Run {
        path: ComponentPath,
        #[source]
        source: anyhow::Error,
    },
    /// The task of the node has returned without being asked to.
    #[error("{path} has stopped unexpectedly")]
    Exited { path: ComponentPath },
    #[error("{path} did not stop within {}, its task has been aborted", format_duration(.grace))]
    ShutdownTimeout { path: ComponentPath, grace: Duration },
}

/// Error returned by the controller task when it stops.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("some components did not stop in time: {}", join_paths(.0))]
    ShutdownTimeout(Vec<ComponentPath>),
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DispatchError {
    /// The controller was not available.
    /// This happens when the graph is shut down before dispatching the request.
    #[error("dispatch failed: controller not available")]
    NotAvailable,
    /// The deadline has expired.
    #[error("dispatch failed: timeout expired")]
    Timeout,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SendWaitError {
    /// The controller was not available.
    /// This happens when the graph is shut down before processing the request.
    #[error("send_wait failed: controller not available")]
    NotAvailable,
    /// The deadline has expired.
    #[error("send_wait failed: timeout expired")]
    Timeout,
    /// The configuration has been rejected, the live graph has not been modified.
    #[error("send_wait failed: the configuration has been rejected")]
    Load(#[source] LoadError),
}

impl NodeError {
    /// The node that failed.
    pub fn path(&self) -> &ComponentPath {
        match self {
            NodeError::Build { path, .. }
            | NodeError::Update { path, .. }
            | NodeError::Run { path, .. }
            | NodeError::Exited { path }
            | NodeError::ShutdownTimeout { path, .. } => path,
        }
    }

    /// Returns the build error, if the node failed to build.
    pub fn build_error(&self) -> Option<&BuildError> {
        match self {
            NodeError::Build { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn format_duration(d: &Duration) -> humantime_serde::re::humantime::FormattedDuration {
    humantime_serde::re::humantime::format_duration(*d)
}

fn join_paths(paths: &[ComponentPath]) -> String {
    paths.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
