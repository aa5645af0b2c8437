use indexmap::IndexMap;

use crate::component::naming::InvalidPathError;
use crate::component::ComponentPath;
use crate::value::{Value, ValueKind};

/// A component instance, as declared in the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDecl {
    pub path: ComponentPath,
    /// Argument expressions, by argument name.
    pub arguments: IndexMap<String, Expr>,
}

/// An argument expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// The value of an export field of another component.
    Ref(ExportRef),
    Array(Vec<Expr>),
    Object(IndexMap<String, Expr>),
}

/// Reference to an export field of a component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExportRef {
    pub component: ComponentPath,
    pub export: String,
}

impl ComponentDecl {
    pub fn new(path: ComponentPath) -> Self {
        Self {
            path,
            arguments: IndexMap::new(),
        }
    }

    /// Adds an argument, builder-style.
    pub fn with_argument(mut self, name: impl Into<String>, expr: impl Into<Expr>) -> Self {
        self.arguments.insert(name.into(), expr.into());
        self
    }

    /// Iterates on every reference that appears in the arguments.
    pub fn references(&self) -> impl Iterator<Item = &ExportRef> {
        let mut refs = Vec::new();
        for expr in self.arguments.values() {
            expr.collect_references(&mut refs);
        }
        refs.into_iter()
    }

    /// Evaluates the arguments into a [`Value::Object`].
    ///
    /// `resolve` returns the current value of an export field, or `None` if the referenced
    /// component has not published its exports yet. In that case, the evaluation is
    /// incomplete and `None` is returned.
    pub fn evaluate(&self, resolve: &mut impl FnMut(&ExportRef) -> Option<Value>) -> Option<Value> {
        let mut res = IndexMap::with_capacity(self.arguments.len());
        for (name, expr) in &self.arguments {
            res.insert(name.clone(), expr.evaluate(resolve)?);
        }
        Some(Value::Object(res))
    }
}

impl Expr {
    /// Creates a reference expression.
    pub fn reference(component: ComponentPath, export: impl Into<String>) -> Self {
        Expr::Ref(ExportRef {
            component,
            export: export.into(),
        })
    }

    /// Converts a TOML value into an expression.
    ///
    /// An inline table with exactly the keys `ref` (a component path) and `export`
    /// (a field name), both strings, is a reference. Everything else is a literal,
    /// possibly containing nested references.
    pub fn from_toml(value: toml::Value) -> Result<Expr, InvalidPathError> {
        match value {
            toml::Value::Array(items) => {
                let exprs = items.into_iter().map(Expr::from_toml).collect::<Result<_, _>>()?;
                Ok(Expr::Array(exprs))
            }
            toml::Value::Table(table) => {
                if let Some(r) = as_reference(&table) {
                    let (component, export) = r;
                    return Ok(Expr::reference(component.parse()?, export));
                }
                let mut fields = IndexMap::with_capacity(table.len());
                for (k, v) in table {
                    fields.insert(k, Expr::from_toml(v)?);
                }
                Ok(Expr::Object(fields))
            }
            scalar => Ok(Expr::Literal(Value::from(scalar))),
        }
    }

    /// Evaluates the expression, see [`ComponentDecl::evaluate`].
    pub fn evaluate(&self, resolve: &mut impl FnMut(&ExportRef) -> Option<Value>) -> Option<Value> {
        match self {
            Expr::Literal(v) => Some(v.clone()),
            Expr::Ref(r) => resolve(r),
            Expr::Array(items) => {
                let values = items.iter().map(|e| e.evaluate(resolve)).collect::<Option<_>>()?;
                Some(Value::Array(values))
            }
            Expr::Object(fields) => {
                let mut res = IndexMap::with_capacity(fields.len());
                for (k, e) in fields {
                    res.insert(k.clone(), e.evaluate(resolve)?);
                }
                Some(Value::Object(res))
            }
        }
    }

    /// The kind of the value, if it is known before evaluation.
    pub fn static_kind(&self) -> Option<ValueKind> {
        match self {
            Expr::Literal(v) => Some(v.kind()),
            Expr::Ref(_) => None,
            Expr::Array(_) => Some(ValueKind::Array),
            Expr::Object(_) => Some(ValueKind::Object),
        }
    }

    fn collect_references<'a>(&'a self, refs: &mut Vec<&'a ExportRef>) {
        match self {
            Expr::Literal(_) => (),
            Expr::Ref(r) => refs.push(r),
            Expr::Array(items) => items.iter().for_each(|e| e.collect_references(refs)),
            Expr::Object(fields) => fields.values().for_each(|e| e.collect_references(refs)),
        }
    }
}

fn as_reference(table: &toml::Table) -> Option<(&str, &str)> {
    if table.len() != 2 {
        return None;
    }
    let component = table.get("ref")?.as_str()?;
    let export = table.get("export")?.as_str()?;
    Some((component, export))
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::Literal(Value::from(value))
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Literal(Value::Int(value))
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::Literal(Value::Bool(value))
    }
}

impl From<ExportRef> for Expr {
    fn from(value: ExportRef) -> Self {
        Expr::Ref(value)
    }
}
