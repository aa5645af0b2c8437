use tokio::sync::{mpsc, oneshot};

use crate::component::ComponentPath;
use crate::graph::{ComponentDecl, LoadError};

use super::node::NodeInfo;
use super::scheduler::LoadReport;

pub(crate) type Receiver = mpsc::Receiver<ControlRequest>;
pub(crate) type Sender = mpsc::Sender<ControlRequest>;

pub(crate) type ResponseSender<R> = oneshot::Sender<R>;

#[derive(Debug)]
pub(crate) enum ControlRequest {
    /// Replaces the configuration.
    Load(RequestMessage<Vec<ComponentDecl>, Result<LoadReport, LoadError>>),
    /// Lists every node, in topological order.
    List(RequestMessage<(), Vec<NodeInfo>>),
    /// Describes one node.
    Node(RequestMessage<ComponentPath, Option<NodeInfo>>),
}

#[derive(Debug)]
pub(crate) struct RequestMessage<Body, Response> {
    pub response_tx: Option<ResponseSender<Response>>,
    pub body: Body,
}

/// Sent by the task of a node when it finishes.
pub(crate) struct TaskExit {
    pub key: super::exports::NodeKey,
    pub path: ComponentPath,
    pub result: anyhow::Result<()>,
}
