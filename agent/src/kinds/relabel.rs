//! `metrics.relabel`: sets a label on every sample, then forwards it.
//!
//! Exports a `receiver` that other components can forward their samples to.

use std::sync::{Arc, PoisonError, RwLock};

use tributary::component::{BuildContext, BuildError, Component, ComponentDefinition, Shape, Stability};
use tributary::dataplane::{
    AppendError, Appendable, Appender, Fanout, Labels, MetricsReceiver, SeriesRef, Timestamp,
};
use tributary::value::{Capsule, Value, ValueError, ValueKind};

pub const KIND: &str = "metrics.relabel";

pub fn definition() -> ComponentDefinition {
    ComponentDefinition::new(
        KIND,
        Stability::Stable,
        Shape::new()
            .required("forward_to", ValueKind::Array)
            .required("label", ValueKind::String)
            .required("value", ValueKind::String),
        Shape::new().required("receiver", ValueKind::Capsule),
        build,
    )
}

struct Relabel {
    inner: Arc<Inner>,
}

/// The part of the component that is reachable from the exported receiver.
///
/// The lock of `rule` is held while the targets of `fanout` are read or replaced,
/// so that an appender never mixes the rule of one update with the targets of another.
struct Inner {
    fanout: Fanout,
    rule: RwLock<Rule>,
}

#[derive(Debug, Clone)]
struct Rule {
    label: String,
    value: String,
}

struct RelabelAppender {
    rule: Rule,
    next: Box<dyn Appender>,
}

fn decode(arguments: &Value) -> Result<(Rule, Vec<MetricsReceiver>), ValueError> {
    let rule = Rule {
        label: arguments.decode("label")?,
        value: arguments.decode("value")?,
    };
    if rule.label.is_empty() {
        return Err(ValueError::Invalid {
            field: String::from("label"),
            message: String::from("the label name cannot be empty"),
        });
    }
    Ok((rule, arguments.decode_capsule_list("forward_to")?))
}

fn build(ctx: BuildContext, arguments: Value) -> Result<Arc<dyn Component>, BuildError> {
    let (rule, forward_to) = decode(&arguments)?;
    let inner = Arc::new(Inner {
        fanout: Fanout::new(ctx.id().clone(), forward_to, None),
        rule: RwLock::new(rule),
    });
    // the receiver never changes, the dependents are only evaluated once
    let receiver = MetricsReceiver::new(ctx.id().clone(), inner.clone());
    ctx.publish_exports(Value::object([("receiver", Value::Capsule(Capsule::new(receiver)))]));
    Ok(Arc::new(Relabel { inner }))
}

impl Component for Relabel {
    fn update(&self, arguments: Value) -> anyhow::Result<()> {
        let (rule, forward_to) = decode(&arguments)?;
        let mut current = self.inner.rule.write().unwrap_or_else(PoisonError::into_inner);
        self.inner.fanout.update_targets(forward_to);
        *current = rule;
        Ok(())
    }
}

impl Appendable for Inner {
    fn appender(&self) -> Box<dyn Appender> {
        let rule = self.rule.read().unwrap_or_else(PoisonError::into_inner);
        Box::new(RelabelAppender {
            rule: rule.clone(),
            next: self.fanout.appender(),
        })
    }
}

impl Appender for RelabelAppender {
    fn append(&mut self, labels: &Labels, timestamp: Timestamp, value: f64) -> Result<SeriesRef, AppendError> {
        let labels = labels.with(self.rule.label.as_str(), self.rule.value.as_str());
        self.next.append(&labels, timestamp, value)
    }

    fn commit(self: Box<Self>) -> Result<(), AppendError> {
        self.next.commit()
    }

    fn rollback(self: Box<Self>) -> Result<(), AppendError> {
        self.next.rollback()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;
    use tributary::component::ComponentPath;
    use tributary::dataplane::{
        AppendError, Appendable, Appender, Labels, MetricsReceiver, SeriesRef, Timestamp,
    };
    use tributary::test::TestBuild;
    use tributary::value::{Capsule, Value};

    #[derive(Default)]
    struct Sink {
        committed: Arc<Mutex<Vec<Labels>>>,
    }

    struct SinkAppender {
        committed: Arc<Mutex<Vec<Labels>>>,
        pending: Vec<Labels>,
    }

    impl Appendable for Sink {
        fn appender(&self) -> Box<dyn Appender> {
            Box::new(SinkAppender {
                committed: self.committed.clone(),
                pending: Vec::new(),
            })
        }
    }

    impl Appender for SinkAppender {
        fn append(&mut self, labels: &Labels, _t: Timestamp, _v: f64) -> Result<SeriesRef, AppendError> {
            self.pending.push(labels.clone());
            Ok(SeriesRef::default())
        }

        fn commit(self: Box<Self>) -> Result<(), AppendError> {
            self.committed.lock().unwrap().extend(self.pending);
            Ok(())
        }

        fn rollback(self: Box<Self>) -> Result<(), AppendError> {
            Ok(())
        }
    }

    fn arguments(sink: &Value, value: &str) -> Value {
        Value::object([
            ("forward_to", Value::Array(vec![sink.clone()])),
            ("label", Value::from("env")),
            ("value", Value::from(value)),
        ])
    }

    #[test]
    fn relabel_and_forward() {
        let sink = Arc::new(Sink::default());
        let sink_receiver = MetricsReceiver::new(
            ComponentPath::from_str_unchecked("test.sink", "a"),
            sink.clone(),
        );
        let sink_value = Value::Capsule(Capsule::new(sink_receiver));

        let built = TestBuild::new(ComponentPath::from_str_unchecked("metrics.relabel", "env"))
            .build(&super::definition(), arguments(&sink_value, "prod"))
            .unwrap();
        let exports = built.exports().unwrap();
        let receiver: MetricsReceiver = exports.decode_capsule("receiver").unwrap();

        let series = Labels::from_pairs([("__name__", "up")]);
        let mut appender = receiver.appender();
        appender.append(&series, Timestamp::now(), 1.0).unwrap();
        appender.commit().unwrap();

        built.component.update(arguments(&sink_value, "dev")).unwrap();
        let mut appender = receiver.appender();
        appender.append(&series, Timestamp::now(), 1.0).unwrap();
        appender.rollback().unwrap();
        let mut appender = receiver.appender();
        appender.append(&series, Timestamp::now(), 1.0).unwrap();
        appender.commit().unwrap();

        let committed = sink.committed.lock().unwrap().clone();
        assert_eq!(
            committed,
            vec![
                Labels::from_pairs([("__name__", "up"), ("env", "prod")]),
                Labels::from_pairs([("__name__", "up"), ("env", "dev")]),
            ]
        );
        // the exports do not change on update
        assert_eq!(built.exports().unwrap(), exports);
    }

    #[test]
    fn rule_and_targets_change_together() {
        let sinks = [Arc::new(Sink::default()), Arc::new(Sink::default())];
        let sink_values: Vec<Value> = sinks
            .iter()
            .enumerate()
            .map(|(i, sink)| {
                let path = ComponentPath::from_str_unchecked("test.sink", &format!("s{i}"));
                Value::Capsule(Capsule::new(MetricsReceiver::new(path, sink.clone())))
            })
            .collect();
        let built = TestBuild::new(ComponentPath::from_str_unchecked("metrics.relabel", "env"))
            .build(&super::definition(), arguments(&sink_values[0], "s0"))
            .unwrap();
        let receiver: MetricsReceiver = built.exports().unwrap().decode_capsule("receiver").unwrap();

        let writer = std::thread::spawn(move || {
            let series = Labels::from_pairs([("__name__", "up")]);
            for _ in 0..2000 {
                let mut appender = receiver.appender();
                appender.append(&series, Timestamp::now(), 1.0).unwrap();
                appender.commit().unwrap();
            }
        });
        for i in 0..200 {
            let target = i % 2;
            let update = arguments(&sink_values[target], &format!("s{target}"));
            built.component.update(update).unwrap();
        }
        writer.join().unwrap();

        // each sink only receives the label value that was set together with it
        for (i, sink) in sinks.iter().enumerate() {
            let expected = Labels::from_pairs([("__name__", "up"), ("env", format!("s{i}").as_str())]);
            let committed = sink.committed.lock().unwrap();
            assert!(committed.iter().all(|labels| labels == &expected), "sink {i}: {committed:?}");
        }
    }

    #[test]
    fn empty_label_is_rejected() {
        let res = TestBuild::new(ComponentPath::from_str_unchecked("metrics.relabel", "bad")).build(
            &super::definition(),
            Value::object([
                ("forward_to", Value::Array(Vec::new())),
                ("label", Value::from("")),
                ("value", Value::from("x")),
            ]),
        );
        assert!(res.is_err());
    }
}
