//! Component kinds shared by the integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tributary::agent::{self, RunningAgent};
use tributary::component::registry::{Registry, RegistryBuilder};
use tributary::component::{BuildContext, BuildError, Component, ComponentDefinition, ComponentPath, Shape, Stability};
use tributary::config::{ComponentsConfig, RuntimeConfig};
use tributary::controller::exports::ExportPublisher;
use tributary::controller::{NodeInfo, NodeState};
use tributary::service::Service;
use tributary::value::{Value, ValueKind};

/// Something that happened to a test component.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Built(String, Value),
    Updated(String, Value),
    Stopped(String),
}

/// Records the events of every test component.
#[derive(Debug, Clone, Default)]
pub struct Probe(Arc<Mutex<Vec<Event>>>);

impl Probe {
    fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    /// Returns the events recorded so far, and forgets them.
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// Publishes its `value` argument as its `value` export.
struct Echo {
    path: String,
    exports: ExportPublisher,
    probe: Probe,
    /// Rejects the updates to `"bad"`.
    picky: bool,
}

impl Component for Echo {
    fn run(self: Arc<Self>, token: CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            token.cancelled().await;
            self.probe.push(Event::Stopped(self.path.clone()));
            Ok(())
        })
    }

    fn update(&self, arguments: Value) -> anyhow::Result<()> {
        let value = arguments.get("value").cloned().unwrap_or_default();
        if self.picky && value == Value::from("bad") {
            return Err(anyhow!("rejected"));
        }
        self.probe.push(Event::Updated(self.path.clone(), value.clone()));
        self.exports.publish(Value::object([("value", value)]));
        Ok(())
    }
}

/// Publishes its `value` argument after `delay`, from its task.
struct Delayed {
    value: Value,
    delay: Duration,
    exports: ExportPublisher,
}

impl Component for Delayed {
    fn run(self: Arc<Self>, token: CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.delay) => {
                    self.exports.publish(Value::object([("value", self.value.clone())]));
                }
            }
            token.cancelled().await;
            Ok(())
        })
    }

    fn update(&self, _arguments: Value) -> anyhow::Result<()> {
        Err(anyhow!("test.delayed cannot be updated"))
    }
}

/// Ignores the cancellation.
struct Stubborn;

impl Component for Stubborn {
    fn run(self: Arc<Self>, _token: CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(std::future::pending())
    }

    fn update(&self, _arguments: Value) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Stops with an error as soon as it starts.
struct Crash;

impl Component for Crash {
    fn run(self: Arc<Self>, _token: CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async { Err(anyhow!("boom")) })
    }

    fn update(&self, _arguments: Value) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A service that counts the components that use it.
#[derive(Default)]
pub struct CounterService {
    pub users: Mutex<Vec<String>>,
}

impl Service for CounterService {}

pub const COUNTER_SERVICE: &str = "counter";

struct Nothing;

impl Component for Nothing {
    fn update(&self, _arguments: Value) -> anyhow::Result<()> {
        Ok(())
    }
}

fn echo_definition(name: &str, stability: Stability, picky: bool, probe: Probe) -> ComponentDefinition {
    ComponentDefinition::new(
        name,
        stability,
        Shape::new().required("value", ValueKind::Any),
        Shape::new().required("value", ValueKind::Any),
        move |ctx: BuildContext, arguments: Value| -> Result<Arc<dyn Component>, BuildError> {
            let path = ctx.id().to_string();
            let value = arguments.get("value").cloned().unwrap_or_default();
            probe.push(Event::Built(path.clone(), value.clone()));
            ctx.publish_exports(Value::object([("value", value)]));
            Ok(Arc::new(Echo {
                path,
                exports: ctx.export_publisher(),
                probe: probe.clone(),
                picky,
            }))
        },
    )
}

/// Returns a registry with the test kinds:
/// - `test.echo`: publishes its `value` argument
/// - `test.echo_beta`: same as `test.echo`, at the beta stability level
/// - `test.picky`: same as `test.echo`, but refuses to be updated to `"bad"`
/// - `test.delayed`: publishes its `value` argument after `delay_ms`
/// - `test.fail`: fails to build
/// - `test.env`: fails to build because of the environment
/// - `test.stubborn`: does not stop when asked to
/// - `test.crash`: stops with an error
/// - `test.service`: requires the [`CounterService`]
pub fn registry(probe: &Probe) -> Arc<Registry> {
    let mut builder = RegistryBuilder::new();
    let definitions = vec![
        echo_definition("test.echo", Stability::Stable, false, probe.clone()),
        echo_definition("test.echo_beta", Stability::Beta, false, probe.clone()),
        echo_definition("test.picky", Stability::Stable, true, probe.clone()),
        ComponentDefinition::new(
            "test.delayed",
            Stability::Stable,
            Shape::new()
                .required("value", ValueKind::Any)
                .required("delay_ms", ValueKind::Int),
            Shape::new().required("value", ValueKind::Any),
            |ctx: BuildContext, arguments: Value| -> Result<Arc<dyn Component>, BuildError> {
                let delay_ms: i64 = arguments.decode("delay_ms")?;
                Ok(Arc::new(Delayed {
                    value: arguments.get("value").cloned().unwrap_or_default(),
                    delay: Duration::from_millis(delay_ms.unsigned_abs()),
                    exports: ctx.export_publisher(),
                }))
            },
        ),
        ComponentDefinition::new(
            "test.fail",
            Stability::Stable,
            Shape::open(),
            Shape::new().required("value", ValueKind::Any),
            |_: BuildContext, _: Value| -> Result<Arc<dyn Component>, BuildError> {
                Err(BuildError::invalid(anyhow!("this component always fails")))
            },
        ),
        ComponentDefinition::new(
            "test.env",
            Stability::Stable,
            Shape::open(),
            Shape::new(),
            |_: BuildContext, _: Value| -> Result<Arc<dyn Component>, BuildError> {
                Err(BuildError::environment(anyhow!("missing certificate /etc/test/cert.pem")))
            },
        ),
        ComponentDefinition::new(
            "test.stubborn",
            Stability::Stable,
            Shape::new(),
            Shape::new(),
            |_: BuildContext, _: Value| -> Result<Arc<dyn Component>, BuildError> { Ok(Arc::new(Stubborn)) },
        ),
        ComponentDefinition::new(
            "test.crash",
            Stability::Stable,
            Shape::new(),
            Shape::new(),
            |_: BuildContext, _: Value| -> Result<Arc<dyn Component>, BuildError> { Ok(Arc::new(Crash)) },
        ),
        ComponentDefinition::new(
            "test.service",
            Stability::Stable,
            Shape::new(),
            Shape::new(),
            |ctx: BuildContext, _: Value| -> Result<Arc<dyn Component>, BuildError> {
                let service = ctx.service::<CounterService>(COUNTER_SERVICE)?;
                service.users.lock().unwrap().push(ctx.id().to_string());
                Ok(Arc::new(Nothing))
            },
        ),
    ];
    for definition in definitions {
        builder.register(definition).unwrap();
    }
    builder.seal()
}

/// Starts an agent with the test kinds.
pub fn start(probe: &Probe) -> RunningAgent {
    start_with(probe, RuntimeConfig::default())
}

/// Starts an agent with the test kinds and a custom runtime config.
pub fn start_with(probe: &Probe, config: RuntimeConfig) -> RunningAgent {
    let _ = env_logger::builder().is_test(true).try_init();
    agent::Builder::new(registry(probe))
        .runtime_config(config)
        .build_and_start()
        .unwrap()
}

pub fn parse(config: &str) -> ComponentsConfig {
    ComponentsConfig::parse_str(config).unwrap()
}

pub fn path(kind: &str, label: &str) -> ComponentPath {
    ComponentPath::new(kind, label).unwrap()
}

/// Returns the node `path`, it must exist.
pub fn node(agent: &RunningAgent, path: &ComponentPath) -> NodeInfo {
    agent
        .list_blocking()
        .unwrap()
        .into_iter()
        .find(|n| &n.path == path)
        .unwrap_or_else(|| panic!("{path} should exist"))
}

/// Waits until the node `path` reaches `state`, panics after 2 seconds.
pub fn wait_for_state(agent: &RunningAgent, path: &ComponentPath, state: NodeState) -> NodeInfo {
    for _ in 0..200 {
        let info = node(agent, path);
        if info.state == state {
            return info;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("{path} did not reach the state {state:?}");
}
