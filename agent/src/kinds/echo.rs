//! `echo`: exports its arguments.
//!
//! Mostly useful to name a value once and reference it from several components.

use std::sync::Arc;

use tributary::component::{BuildContext, BuildError, Component, ComponentDefinition, Shape, Stability};
use tributary::controller::exports::ExportPublisher;
use tributary::value::{Value, ValueKind};

pub const KIND: &str = "echo";

pub fn definition() -> ComponentDefinition {
    ComponentDefinition::new(
        KIND,
        Stability::Stable,
        Shape::new().required("value", ValueKind::Any),
        Shape::new().required("value", ValueKind::Any),
        build,
    )
}

struct Echo {
    exports: ExportPublisher,
}

fn build(ctx: BuildContext, arguments: Value) -> Result<Arc<dyn Component>, BuildError> {
    let echo = Echo {
        exports: ctx.export_publisher(),
    };
    echo.publish(&arguments)?;
    Ok(Arc::new(echo))
}

impl Echo {
    fn publish(&self, arguments: &Value) -> Result<(), tributary::value::ValueError> {
        let value: Value = arguments.decode("value")?;
        self.exports.publish(Value::object([("value", value)]));
        Ok(())
    }
}

impl Component for Echo {
    fn update(&self, arguments: Value) -> anyhow::Result<()> {
        self.publish(&arguments)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tributary::component::ComponentPath;
    use tributary::test::TestBuild;
    use tributary::value::Value;

    #[test]
    fn exports_follow_arguments() {
        let built = TestBuild::new(ComponentPath::from_str_unchecked("echo", "a"))
            .build(&super::definition(), Value::object([("value", Value::from("x"))]))
            .unwrap();
        assert_eq!(built.exports(), Some(Value::object([("value", Value::from("x"))])));

        built
            .component
            .update(Value::object([("value", Value::from(vec![1i64, 2]))]))
            .unwrap();
        assert_eq!(
            built.exports(),
            Some(Value::object([("value", Value::from(vec![1i64, 2]))]))
        );
    }

    #[test]
    fn missing_value() {
        let built = TestBuild::new(ComponentPath::from_str_unchecked("echo", "a"))
            .build(&super::definition(), Value::object([("value", Value::Null)]))
            .unwrap();
        assert!(built.component.update(Value::object::<&str>([])).is_err());
        assert_eq!(built.exports(), Some(Value::object([("value", Value::Null)])));
    }
}
