use std::time::Duration;

use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::component::ComponentPath;
use crate::graph::ComponentDecl;

use super::error::{DispatchError, SendWaitError};
use super::messages::{self, ControlRequest, RequestMessage};
use super::node::NodeInfo;
use super::scheduler::LoadReport;

/// A handle to the controller of a running graph.
///
/// It can be cloned and sent to other tasks. Every request is processed by the controller task,
/// in the order in which it has been received.
#[derive(Clone)]
pub struct ControlHandle {
    pub(super) tx: messages::Sender,
    pub(super) shutdown_token: CancellationToken,
}

impl ControlHandle {
    /// Shuts the graph down.
    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
    }

    /// Loads a new configuration, and waits for the new graph to be evaluated.
    ///
    /// # Errors
    /// If the configuration is rejected, returns a [`SendWaitError::Load`] error that
    /// contains every structural error, and the live graph is left unchanged.
    /// Failures of individual nodes are not errors: they are listed in the [`LoadReport`].
    pub async fn load(
        &self,
        decls: Vec<ComponentDecl>,
        timeout: impl Into<Option<Duration>>,
    ) -> Result<LoadReport, SendWaitError> {
        let res = self
            .send_wait(
                |response_tx| {
                    ControlRequest::Load(RequestMessage {
                        response_tx,
                        body: decls,
                    })
                },
                timeout.into(),
            )
            .await?;
        res.map_err(SendWaitError::Load)
    }

    /// Loads a new configuration, without waiting for it to be processed.
    ///
    /// Errors are logged by the controller.
    pub async fn dispatch_load(
        &self,
        decls: Vec<ComponentDecl>,
        timeout: impl Into<Option<Duration>>,
    ) -> Result<(), DispatchError> {
        let msg = ControlRequest::Load(RequestMessage {
            response_tx: None,
            body: decls,
        });
        match timeout.into() {
            Some(timeout) => self.tx.send_timeout(msg, timeout).await.map_err(|e| match e {
                SendTimeoutError::Timeout(_) => DispatchError::Timeout,
                SendTimeoutError::Closed(_) => DispatchError::NotAvailable,
            }),
            None => self.tx.send(msg).await.map_err(|_| DispatchError::NotAvailable),
        }
    }

    /// Lists the nodes of the live graph, in topological order.
    pub async fn list(&self, timeout: impl Into<Option<Duration>>) -> Result<Vec<NodeInfo>, SendWaitError> {
        self.send_wait(
            |response_tx| ControlRequest::List(RequestMessage { response_tx, body: () }),
            timeout.into(),
        )
        .await
    }

    /// Describes a node of the live graph, if it exists.
    pub async fn node(
        &self,
        path: ComponentPath,
        timeout: impl Into<Option<Duration>>,
    ) -> Result<Option<NodeInfo>, SendWaitError> {
        self.send_wait(
            |response_tx| ControlRequest::Node(RequestMessage { response_tx, body: path }),
            timeout.into(),
        )
        .await
    }

    async fn send_wait<R>(
        &self,
        request: impl FnOnce(Option<oneshot::Sender<R>>) -> ControlRequest,
        timeout: Option<Duration>,
    ) -> Result<R, SendWaitError> {
        // open a channel to allow the controller to send us a response
        let (tx, rx) = oneshot::channel();
        let msg = request(Some(tx));
        match timeout {
            Some(timeout) => self.tx.send_timeout(msg, timeout).await.map_err(|e| match e {
                SendTimeoutError::Timeout(_) => SendWaitError::Timeout,
                SendTimeoutError::Closed(_) => SendWaitError::NotAvailable,
            }),
            None => self.tx.send(msg).await.map_err(|_| SendWaitError::NotAvailable),
        }?;
        // wait for the response
        rx.await.map_err(|_| SendWaitError::NotAvailable)
    }
}
