use std::sync::Arc;

use tokio::runtime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::component::registry::Registry;
use crate::config::RuntimeConfig;
use crate::service::Services;

use super::error::ControllerError;
use super::exports::NodeKey;
use super::handle::ControlHandle;
use super::messages::{self, ControlRequest, RequestMessage, TaskExit};
use super::scheduler::{Scheduler, SchedulerSettings};

/// The controller of a graph, before it is started.
pub struct Controller {
    scheduler: Scheduler,
    notifications: mpsc::UnboundedReceiver<NodeKey>,
    exits: mpsc::UnboundedReceiver<TaskExit>,
    channel_size: usize,
}

impl Controller {
    pub fn new(registry: Arc<Registry>, services: Arc<Services>, config: &RuntimeConfig) -> Self {
        let (notify_tx, notifications) = mpsc::unbounded_channel();
        let (exit_tx, exits) = mpsc::unbounded_channel();
        let settings = SchedulerSettings {
            min_stability: config.min_stability,
            grace_period: config.shutdown_grace_period,
            data_path: config.data_path.clone(),
        };
        Self {
            scheduler: Scheduler::new(registry, services, settings, notify_tx, exit_tx),
            notifications,
            exits,
            channel_size: config.control_channel_size.max(1),
        }
    }

    /// Spawns the controller task on the given runtime.
    ///
    /// The graph is empty until a configuration is loaded with [`ControlHandle::load`].
    /// Cancelling `shutdown` tears the whole graph down and stops the controller.
    pub fn start(
        self,
        shutdown: CancellationToken,
        on: &runtime::Handle,
    ) -> (ControlHandle, JoinHandle<Result<(), ControllerError>>) {
        let (tx, rx) = mpsc::channel(self.channel_size);
        let task = self.run(shutdown.clone(), rx);
        let handle = ControlHandle {
            tx,
            shutdown_token: shutdown,
        };
        let task_handle = on.spawn(task);
        (handle, task_handle)
    }

    async fn handle_request(&mut self, request: ControlRequest) {
        /// Responds to a request. The sender may not care about the response.
        fn send_response<R>(result: R, response_tx: Option<messages::ResponseSender<R>>) {
            if let Some(tx) = response_tx {
                if tx.send(result).is_err() {
                    log::debug!("control response dropped: the requester is gone");
                }
            }
        }

        match request {
            ControlRequest::Load(RequestMessage { response_tx, body }) => {
                let result = self.scheduler.load(body, &mut self.notifications).await;
                match &result {
                    Ok(report) if report.is_success() => log::info!("Configuration loaded."),
                    Ok(report) => log::warn!(
                        "Configuration loaded with {} failed component(s).",
                        report.failures.len() + report.shutdown_timeouts.len()
                    ),
                    Err(e) => log::error!("{e}"),
                }
                send_response(result, response_tx);
            }
            ControlRequest::List(RequestMessage { response_tx, body: () }) => {
                send_response(self.scheduler.list(), response_tx);
            }
            ControlRequest::Node(RequestMessage { response_tx, body }) => {
                send_response(self.scheduler.node(&body), response_tx);
            }
        }
    }

    /// Main control loop.
    ///
    /// The role of this function is to "oversee" the graph by:
    /// - checking if the graph should be shut down
    /// - receiving control requests and processing them
    /// - propagating the exports published by the components to their dependents
    /// - detecting the components whose task stops on its own
    ///
    /// All the structural modifications of the graph happen here, one at a time.
    async fn run(mut self, shutdown: CancellationToken, mut rx: messages::Receiver) -> Result<(), ControllerError> {
        let mut requests_open = true;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    break;
                },
                _ = tokio::signal::ctrl_c() => {
                    // Tokio's ctrl_c() also handles Ctrl+C on Windows.
                    log::info!("Ctrl+C received, shutting down...");
                    shutdown.cancel();
                },
                request = rx.recv(), if requests_open => {
                    match request {
                        Some(request) => {
                            log::trace!("handling {request:?}");
                            self.handle_request(request).await;
                        },
                        None => {
                            // every handle has been dropped, the graph runs until it is shut down
                            requests_open = false;
                        },
                    }
                },
                Some(key) = self.notifications.recv() => {
                    self.scheduler.propagate(key, &mut self.notifications);
                },
                Some(exit) = self.exits.recv() => {
                    self.scheduler.task_exited(exit);
                },
            }
        }
        log::debug!("Controller shutting down...");

        let timeouts = self.scheduler.shutdown().await;
        // the tasks have been stopped, log their results
        while let Ok(exit) = self.exits.try_recv() {
            self.scheduler.task_exited(exit);
        }
        if timeouts.is_empty() {
            Ok(())
        } else {
            Err(ControllerError::ShutdownTimeout(timeouts))
        }
    }
}
