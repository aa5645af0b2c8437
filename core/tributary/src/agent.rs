//! Runs a component graph on its own Tokio runtime.
//!
//! The [`Builder`] gathers the registry, the services and the [`RuntimeConfig`], then
//! [`build_and_start`](Builder::build_and_start) creates the runtime and starts the
//! [controller](crate::controller). The graph is empty until a configuration is loaded.
//!
//! The methods of [`RunningAgent`] are blocking: they must not be called from an async context.
//! From an async context, use the [`ControlHandle`] returned by [`RunningAgent::handle`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::component::registry::Registry;
use crate::config::RuntimeConfig;
use crate::controller::{ControlHandle, Controller, ControllerError, LoadReport, NodeInfo, SendWaitError};
use crate::graph::ComponentDecl;
use crate::service::{Service, Services};

/// Agent builder.
pub struct Builder {
    registry: Arc<Registry>,
    services: Services,
    config: RuntimeConfig,
    worker_threads: Option<usize>,
}

/// An agent that has been started.
pub struct RunningAgent {
    rt: Runtime,
    handle: ControlHandle,
    controller_task: JoinHandle<Result<(), ControllerError>>,
}

impl Builder {
    /// Creates a new agent builder with the default [`RuntimeConfig`] and no service.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            services: Services::new(),
            config: RuntimeConfig::default(),
            worker_threads: None,
        }
    }

    /// Replaces the set of services.
    pub fn services(mut self, services: Services) -> Self {
        self.services = services;
        self
    }

    /// Adds a service.
    pub fn with_service<S: Service>(mut self, name: impl Into<String>, service: Arc<S>) -> Self {
        self.services.add(name, service);
        self
    }

    pub fn runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the number of worker threads of the Tokio runtime.
    ///
    /// By default, Tokio uses one thread per CPU core.
    pub fn worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = Some(n);
        self
    }

    /// Builds the Tokio runtime and starts the controller.
    pub fn build_and_start(self) -> anyhow::Result<RunningAgent> {
        let mut rt_builder = tokio::runtime::Builder::new_multi_thread();
        rt_builder.enable_all().thread_name("tributary-worker");
        if let Some(n) = self.worker_threads {
            rt_builder.worker_threads(n);
        }
        let rt = rt_builder.build().context("could not build the multithreaded Runtime")?;

        log::info!(
            "Starting the controller ({} component kinds, min stability: {})...",
            self.registry.len(),
            self.config.min_stability
        );
        let controller = Controller::new(self.registry, Arc::new(self.services), &self.config);
        let (handle, controller_task) = controller.start(CancellationToken::new(), rt.handle());
        log::info!("Agent is ready.");

        Ok(RunningAgent {
            rt,
            handle,
            controller_task,
        })
    }
}

impl RunningAgent {
    /// Returns a handle to the controller, which can be used from async code.
    pub fn handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    /// Returns a handle to the Tokio runtime of the agent.
    pub fn async_runtime(&self) -> &tokio::runtime::Handle {
        self.rt.handle()
    }

    /// Loads a configuration and waits for the new graph to be evaluated.
    ///
    /// See [`ControlHandle::load`].
    pub fn load_blocking(&self, config: impl Into<Vec<ComponentDecl>>) -> Result<LoadReport, SendWaitError> {
        self.rt.block_on(self.handle.load(config.into(), None))
    }

    /// Lists the nodes of the live graph.
    pub fn list_blocking(&self) -> Result<Vec<NodeInfo>, SendWaitError> {
        self.rt.block_on(self.handle.list(None))
    }

    /// Shuts the graph down and waits for every component to stop.
    pub fn shutdown_and_wait(self) -> anyhow::Result<()> {
        self.handle.shutdown();
        self.wait_for_shutdown(Duration::MAX)
    }

    /// Waits until the graph is shut down, by Ctrl+C or through the [`ControlHandle`].
    pub fn wait_for_shutdown(self, timeout: Duration) -> anyhow::Result<()> {
        // Tokio replaces durations that are too large by its own maximum, Duration::MAX disables the timeout
        let timeout = Some(timeout).filter(|d| *d != Duration::MAX);
        let task = self.controller_task;
        let res = match timeout {
            Some(duration) => self
                .rt
                .block_on(async { tokio::time::timeout(duration, task).await })
                .map_err(|_| anyhow!("timeout of {duration:?} expired while waiting for the graph to shut down"))?,
            None => self.rt.block_on(task),
        };
        res.context("the controller task failed to execute to completion")?
            .context("the graph did not shut down properly")?;
        log::info!("All components have stopped.");
        Ok(())
        // the Runtime is dropped
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::component::registry::RegistryBuilder;
    use crate::config::ComponentsConfig;
    use crate::controller::SendWaitError;
    use crate::graph::GraphError;

    use super::Builder;

    #[test]
    fn empty_graph() {
        let agent = Builder::new(RegistryBuilder::new().seal())
            .worker_threads(1)
            .build_and_start()
            .unwrap();
        let report = agent.load_blocking(ComponentsConfig::default()).unwrap();
        assert!(report.is_success());
        assert!(agent.list_blocking().unwrap().is_empty());
        agent.shutdown_and_wait().unwrap();
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let agent = Builder::new(RegistryBuilder::new().seal()).build_and_start().unwrap();
        let config = ComponentsConfig::parse_str("[[component]]\nkind = \"nope\"\nlabel = \"x\"").unwrap();
        let err = agent.load_blocking(config).unwrap_err();
        match err {
            SendWaitError::Load(e) => {
                assert!(matches!(&e.errors[..], [GraphError::UnknownKind { .. }]));
            }
            other => panic!("unexpected error {other:?}"),
        }
        agent.handle().shutdown();
        agent.wait_for_shutdown(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn types() {
        crate::assert_send::<super::RunningAgent>();
    }
}
