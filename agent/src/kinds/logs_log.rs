//! `logs.log`: writes the received log entries to the log of the agent.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tributary::component::{BuildContext, BuildError, Component, ComponentDefinition, ComponentPath, Shape, Stability};
use tributary::dataplane::{DropPolicy, LogsReceiver, LogsStream};
use tributary::value::{Capsule, Value, ValueError, ValueKind};

pub const KIND: &str = "logs.log";

const DEFAULT_CAPACITY: i64 = 1024;

pub fn definition() -> ComponentDefinition {
    ComponentDefinition::new(
        KIND,
        Stability::Beta,
        Shape::new()
            .optional("capacity", ValueKind::Int)
            .optional("drop_when_full", ValueKind::Bool),
        Shape::new().required("receiver", ValueKind::Capsule),
        build,
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Settings {
    capacity: usize,
    policy: DropPolicy,
}

struct LogsLog {
    path: ComponentPath,
    settings: Settings,
    stream: Mutex<Option<LogsStream>>,
}

fn decode(arguments: &Value) -> Result<Settings, ValueError> {
    let capacity = arguments.decode_optional("capacity")?.unwrap_or(DEFAULT_CAPACITY);
    let capacity = usize::try_from(capacity)
        .ok()
        .filter(|c| *c > 0)
        .ok_or_else(|| ValueError::Invalid {
            field: String::from("capacity"),
            message: format!("the capacity must be positive, got {capacity}"),
        })?;
    let policy = if arguments.decode_optional("drop_when_full")?.unwrap_or(false) {
        DropPolicy::DropNewest
    } else {
        DropPolicy::Block
    };
    Ok(Settings { capacity, policy })
}

fn build(ctx: BuildContext, arguments: Value) -> Result<Arc<dyn Component>, BuildError> {
    let settings = decode(&arguments)?;
    let (receiver, stream) = LogsReceiver::with_policy(ctx.id().clone(), settings.capacity, settings.policy);
    ctx.publish_exports(Value::object([("receiver", Value::Capsule(Capsule::new(receiver)))]));
    Ok(Arc::new(LogsLog {
        path: ctx.id().clone(),
        settings,
        stream: Mutex::new(Some(stream)),
    }))
}

impl Component for LogsLog {
    fn run(self: Arc<Self>, token: CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            let mut stream = self
                .stream
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .ok_or_else(|| anyhow!("the log stream has already been consumed"))?;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    entry = stream.recv() => {
                        let Some(entry) = entry else {
                            // every sender is gone
                            break;
                        };
                        log::info!("{}: {} {}", self.path, entry.labels, entry.line_lossy());
                    }
                }
            }
            let dropped = stream.dropped();
            if dropped > 0 {
                log::warn!("{}: {dropped} entries were dropped because the buffer was full", self.path);
            }
            Ok(())
        })
    }

    fn update(&self, arguments: Value) -> anyhow::Result<()> {
        let settings = decode(&arguments)?;
        if settings != self.settings {
            return Err(anyhow!(
                "the buffer of {} cannot be changed while it is running, restart the agent to apply it",
                self.path
            ));
        }
        Ok(())
    }
}
