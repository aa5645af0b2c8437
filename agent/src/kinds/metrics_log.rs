//! `metrics.log`: writes the committed samples to the log.

use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use tributary::component::{BuildContext, BuildError, Component, ComponentDefinition, ComponentPath, Shape, Stability};
use tributary::dataplane::{
    is_stale_marker, AppendError, Appendable, Appender, Labels, MetricsReceiver, Sample, SeriesRef, Timestamp,
};
use tributary::value::{Capsule, Value, ValueError, ValueKind};

pub const KIND: &str = "metrics.log";

pub fn definition() -> ComponentDefinition {
    ComponentDefinition::new(
        KIND,
        Stability::Stable,
        Shape::new().optional("level", ValueKind::String),
        Shape::new().required("receiver", ValueKind::Capsule),
        build,
    )
}

struct MetricsLog {
    inner: Arc<Inner>,
}

struct Inner {
    path: ComponentPath,
    level: RwLock<log::Level>,
}

struct LogAppender {
    path: ComponentPath,
    level: log::Level,
    pending: Vec<Sample>,
}

fn decode_level(arguments: &Value) -> Result<log::Level, ValueError> {
    let level: Option<String> = arguments.decode_optional("level")?;
    match level {
        None => Ok(log::Level::Info),
        Some(s) => log::Level::from_str(&s).map_err(|_| ValueError::Invalid {
            field: String::from("level"),
            message: format!("unknown log level `{s}`"),
        }),
    }
}

fn build(ctx: BuildContext, arguments: Value) -> Result<Arc<dyn Component>, BuildError> {
    let inner = Arc::new(Inner {
        path: ctx.id().clone(),
        level: RwLock::new(decode_level(&arguments)?),
    });
    let receiver = MetricsReceiver::new(ctx.id().clone(), inner.clone());
    ctx.publish_exports(Value::object([("receiver", Value::Capsule(Capsule::new(receiver)))]));
    Ok(Arc::new(MetricsLog { inner }))
}

impl Component for MetricsLog {
    fn update(&self, arguments: Value) -> anyhow::Result<()> {
        let level = decode_level(&arguments)?;
        *self.inner.level.write().unwrap_or_else(PoisonError::into_inner) = level;
        Ok(())
    }
}

impl Appendable for Inner {
    fn appender(&self) -> Box<dyn Appender> {
        Box::new(LogAppender {
            path: self.path.clone(),
            level: *self.level.read().unwrap_or_else(PoisonError::into_inner),
            pending: Vec::new(),
        })
    }
}

impl Appender for LogAppender {
    fn append(&mut self, labels: &Labels, timestamp: Timestamp, value: f64) -> Result<SeriesRef, AppendError> {
        self.pending.push(Sample::new(labels.clone(), timestamp, value));
        Ok(SeriesRef::default())
    }

    fn commit(self: Box<Self>) -> Result<(), AppendError> {
        for sample in &self.pending {
            if is_stale_marker(sample.value) {
                log::log!(self.level, "{}: {} is stale", self.path, sample.labels);
            } else {
                log::log!(
                    self.level,
                    "{}: {} = {} @ {}",
                    self.path,
                    sample.labels,
                    sample.value,
                    sample.timestamp.to_unix_millis()
                );
            }
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), AppendError> {
        Ok(())
    }
}
