use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::component::{Component, ComponentPath};
use crate::value::Value;

use super::error::NodeError;
use super::exports::{ExportCell, NodeKey};

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Not built yet, usually because a dependency has not published its exports.
    Unbuilt,
    Building,
    Running,
    Updating,
    /// The last build or update has failed, or the task has stopped on its own.
    Failed,
    Terminating,
    Terminated,
}

/// Information about a node of the live graph.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub path: ComponentPath,
    pub state: NodeState,
    /// The arguments that have been successfully applied, if any.
    pub arguments: Option<Value>,
    /// The latest exports, if any.
    pub exports: Option<Value>,
    /// The last failure of the node, cleared by a successful build or update.
    pub error: Option<Arc<NodeError>>,
    /// Paths of the nodes that this node depends on.
    pub dependencies: Vec<ComponentPath>,
    /// Number of successful builds.
    pub builds: u64,
    /// Number of successful updates.
    pub updates: u64,
}

/// Runtime state of a node, owned by the scheduler.
pub(crate) struct Node {
    pub key: NodeKey,
    pub path: ComponentPath,
    pub state: NodeState,
    pub arguments: Option<Value>,
    pub exports: Arc<ExportCell>,
    pub component: Option<Arc<dyn Component>>,
    pub task: Option<NodeTask>,
    pub error: Option<Arc<NodeError>>,
    pub builds: u64,
    pub updates: u64,
}

/// The task that runs a component.
pub(crate) struct NodeTask {
    pub token: CancellationToken,
    pub handle: JoinHandle<()>,
}

impl Node {
    pub fn new(key: NodeKey, path: ComponentPath) -> Self {
        Self {
            key,
            path,
            state: NodeState::Unbuilt,
            arguments: None,
            exports: Arc::new(ExportCell::default()),
            component: None,
            task: None,
            error: None,
            builds: 0,
            updates: 0,
        }
    }

    /// Records a failure.
    pub fn fail(&mut self, error: NodeError) -> Arc<NodeError> {
        log::error!("{error}");
        let error = Arc::new(error);
        self.state = NodeState::Failed;
        self.error = Some(error.clone());
        error
    }

    pub fn info(&self, dependencies: Vec<ComponentPath>) -> NodeInfo {
        NodeInfo {
            path: self.path.clone(),
            state: self.state,
            arguments: self.arguments.clone(),
            exports: self.exports.snapshot(),
            error: self.error.clone(),
            dependencies,
            builds: self.builds,
            updates: self.updates,
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Unbuilt => "unbuilt",
            NodeState::Building => "building",
            NodeState::Running => "running",
            NodeState::Updating => "updating",
            NodeState::Failed => "failed",
            NodeState::Terminating => "terminating",
            NodeState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}
