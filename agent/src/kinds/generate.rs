//! `metrics.generate`: produces a synthetic counter at a fixed interval.
//!
//! Every `interval`, the counter is incremented by `increment` and appended, with the labels
//! `__name__ = name` plus the optional `labels`, to every receiver of `forward_to`.
//! When the component stops, a stale marker is sent for the series.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tributary::component::{BuildContext, BuildError, Component, ComponentDefinition, Shape, Stability};
use tributary::dataplane::{stale_marker, Appendable, Fanout, Labels, MetricsReceiver, Timestamp};
use tributary::service::labelstore::{self, LabelStore, MemoryLabelStore};
use tributary::value::{Value, ValueError, ValueKind};

pub const KIND: &str = "metrics.generate";

const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

pub fn definition() -> ComponentDefinition {
    ComponentDefinition::new(
        KIND,
        Stability::Beta,
        Shape::new()
            .required("name", ValueKind::String)
            .required("forward_to", ValueKind::Array)
            .optional("interval", ValueKind::String)
            .optional("increment", ValueKind::Float)
            .optional("labels", ValueKind::Object),
        Shape::new(),
        build,
    )
}

struct Generate {
    fanout: Fanout,
    settings: Mutex<Settings>,
}

#[derive(Debug, Clone, PartialEq)]
struct Settings {
    labels: Labels,
    interval: Duration,
    increment: f64,
}

struct Arguments {
    settings: Settings,
    forward_to: Vec<MetricsReceiver>,
}

impl Arguments {
    fn decode(arguments: &Value) -> Result<Self, ValueError> {
        let name: String = arguments.decode("name")?;
        let extra: IndexMap<String, String> = arguments.decode_optional("labels")?.unwrap_or_default();
        let mut labels = Labels::from_pairs(extra);
        labels.insert(String::from("__name__"), name);

        let interval = arguments.decode_optional("interval")?.unwrap_or(DEFAULT_INTERVAL);
        if interval.is_zero() {
            return Err(ValueError::Invalid {
                field: String::from("interval"),
                message: String::from("the interval must be positive"),
            });
        }
        Ok(Self {
            settings: Settings {
                labels,
                interval,
                increment: arguments.decode_optional("increment")?.unwrap_or(1.0),
            },
            forward_to: arguments.decode_capsule_list("forward_to")?,
        })
    }
}

fn build(ctx: BuildContext, arguments: Value) -> Result<Arc<dyn Component>, BuildError> {
    let Arguments { settings, forward_to } = Arguments::decode(&arguments)?;
    // the label store is optional, series simply have no global reference without it
    let label_store = match ctx.service::<MemoryLabelStore>(labelstore::SERVICE_NAME) {
        Ok(store) => Some(store as Arc<dyn LabelStore>),
        Err(e) => {
            log::debug!("{}: {e}", ctx.id());
            None
        }
    };
    Ok(Arc::new(Generate {
        fanout: Fanout::new(ctx.id().clone(), forward_to, label_store),
        settings: Mutex::new(settings),
    }))
}

impl Generate {
    fn settings(&self) -> Settings {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn send(&self, labels: &Labels, value: f64) {
        let mut appender = self.fanout.appender();
        // a failed target does not prevent the others from receiving the sample
        if let Err(e) = appender.append(labels, Timestamp::now(), value) {
            log::warn!("could not forward {labels}: {e:#}");
        }
        if let Err(e) = appender.commit() {
            log::warn!("could not commit {labels}: {e:#}");
        }
    }
}

impl Component for Generate {
    fn run(self: Arc<Self>, token: CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            let mut counter = 0.0;
            let mut last_labels = None;
            loop {
                let settings = self.settings();
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(settings.interval) => {
                        if let Some(previous) = last_labels.replace(settings.labels.clone()) {
                            if previous != settings.labels {
                                // the series has been renamed, the old one will never be updated again
                                self.send(&previous, stale_marker());
                                counter = 0.0;
                            }
                        }
                        counter += settings.increment;
                        self.send(&settings.labels, counter);
                    }
                }
            }
            if let Some(labels) = last_labels {
                self.send(&labels, stale_marker());
            }
            Ok(())
        })
    }

    fn update(&self, arguments: Value) -> anyhow::Result<()> {
        let Arguments { settings, forward_to } = Arguments::decode(&arguments)?;
        self.fanout.update_targets(forward_to);
        *self.settings.lock().unwrap_or_else(PoisonError::into_inner) = settings;
        Ok(())
    }
}
