//! Dynamic values used for component arguments and exports.
//!
//! Each component kind declares the [shape](crate::component::Shape) of its arguments and
//! exports, but the runtime moves them around as [`Value`]s. A value is either plain data
//! (booleans, numbers, strings, arrays, objects) or a [`Capsule`]: an opaque handle to a
//! shared object, such as the [`Appendable`](crate::dataplane::Appendable) exported by a
//! metrics receiver.
//!
//! Values are immutable snapshots: updating the arguments or the exports of an instance
//! replaces the whole value.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;

/// A dynamic value.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
    Capsule(Capsule),
}

/// The kind of a [`Value`], without its content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Any kind is accepted (only meaningful in shapes).
    Any,
    Null,
    Bool,
    Int,
    Float,
    String,
    Array,
    Object,
    Capsule,
}

/// An opaque, shared handle carried by a [`Value`].
///
/// Two capsules are equal if and only if they point to the same object.
#[derive(Clone)]
pub struct Capsule {
    type_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

/// Error which can occur when reading a [`Value`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("missing field `{0}`")]
    MissingField(String),
    #[error("invalid value for `{field}`: expected {expected}, got {actual}")]
    WrongKind {
        field: String,
        expected: ValueKind,
        actual: ValueKind,
    },
    #[error("invalid value for `{field}`: expected a capsule of type {expected}, got {actual}")]
    WrongCapsule {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("invalid value for `{field}`: {message}")]
    Invalid { field: String, message: String },
}

impl Value {
    /// Creates an object value from key-value pairs.
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
            Value::Capsule(_) => ValueKind::Capsule,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the field `key` if this value is an object that contains it.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a float. Integers are converted.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_capsule(&self) -> Option<&Capsule> {
        match self {
            Value::Capsule(c) => Some(c),
            _ => None,
        }
    }

    /// Decodes the required field `name` of this object.
    pub fn decode<T: FromValue>(&self, name: &str) -> Result<T, ValueError> {
        let field = self.get(name).ok_or_else(|| ValueError::MissingField(name.to_owned()))?;
        T::from_value(field, name)
    }

    /// Decodes the optional field `name` of this object.
    ///
    /// A field set to [`Value::Null`] is treated as absent.
    pub fn decode_optional<T: FromValue>(&self, name: &str) -> Result<Option<T>, ValueError> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(field) => T::from_value(field, name).map(Some),
        }
    }

    /// Returns the object of type `T` held by the capsule field `name`.
    pub fn decode_capsule<T: Any + Send + Sync + Clone>(&self, name: &str) -> Result<T, ValueError> {
        let field = self.get(name).ok_or_else(|| ValueError::MissingField(name.to_owned()))?;
        capsule_content(field, name)
    }

    /// Returns the objects of type `T` held by the array of capsules `name`.
    ///
    /// A missing field is an empty list.
    pub fn decode_capsule_list<T: Any + Send + Sync + Clone>(&self, name: &str) -> Result<Vec<T>, ValueError> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| capsule_content(item, &format!("{name}[{i}]")))
                .collect(),
            Some(other) => Err(ValueError::WrongKind {
                field: name.to_owned(),
                expected: ValueKind::Array,
                actual: other.kind(),
            }),
        }
    }
}

fn capsule_content<T: Any + Send + Sync + Clone>(value: &Value, field: &str) -> Result<T, ValueError> {
    match value {
        Value::Capsule(c) => c.downcast_ref::<T>().cloned().ok_or_else(|| ValueError::WrongCapsule {
            field: field.to_owned(),
            expected: std::any::type_name::<T>(),
            actual: c.type_name(),
        }),
        other => Err(ValueError::WrongKind {
            field: field.to_owned(),
            expected: ValueKind::Capsule,
            actual: other.kind(),
        }),
    }
}

impl ValueKind {
    /// Checks whether a value of kind `actual` is acceptable where `self` is expected.
    pub fn accepts(self, actual: ValueKind) -> bool {
        match (self, actual) {
            (ValueKind::Any, _) => true,
            (ValueKind::Float, ValueKind::Int) => true,
            (expected, actual) => expected == actual,
        }
    }
}

impl Capsule {
    /// Wraps `object` in a new capsule.
    pub fn new<T: Any + Send + Sync>(object: T) -> Self {
        Self::from_arc(Arc::new(object))
    }

    /// Wraps an already shared object in a new capsule.
    pub fn from_arc<T: Any + Send + Sync>(object: Arc<T>) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            inner: object,
        }
    }

    /// Name of the type of the object held by the capsule.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl PartialEq for Capsule {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }
}

impl fmt::Debug for Capsule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "capsule({})", self.type_name)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Any => "any",
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "integer",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
            ValueKind::Capsule => "capsule",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Object(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k} = {v}")?;
                }
                f.write_str("}")
            }
            Value::Capsule(c) => write!(f, "{c:?}"),
        }
    }
}

// ===== Conversions into Value

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Capsule> for Value {
    fn from(value: Capsule) -> Self {
        Value::Capsule(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl From<toml::Value> for Value {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Int(i),
            toml::Value::Float(f) => Value::Float(f),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(d) => Value::String(d.to_string()),
            toml::Value::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
            toml::Value::Table(t) => Value::Object(t.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}

// ===== Decoding

/// Types that can be decoded from a field of a [`Value`].
pub trait FromValue: Sized {
    /// Decodes `value`, which is the content of the field `field` (used in errors).
    fn from_value(value: &Value, field: &str) -> Result<Self, ValueError>;
}

fn wrong_kind(field: &str, expected: ValueKind, value: &Value) -> ValueError {
    ValueError::WrongKind {
        field: field.to_owned(),
        expected,
        actual: value.kind(),
    }
}

impl FromValue for Value {
    fn from_value(value: &Value, _field: &str) -> Result<Self, ValueError> {
        Ok(value.clone())
    }
}

impl FromValue for String {
    fn from_value(value: &Value, field: &str) -> Result<Self, ValueError> {
        value
            .as_str()
            .map(ToOwned::to_owned)
            .ok_or_else(|| wrong_kind(field, ValueKind::String, value))
    }
}

impl FromValue for bool {
    fn from_value(value: &Value, field: &str) -> Result<Self, ValueError> {
        value.as_bool().ok_or_else(|| wrong_kind(field, ValueKind::Bool, value))
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value, field: &str) -> Result<Self, ValueError> {
        value.as_int().ok_or_else(|| wrong_kind(field, ValueKind::Int, value))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value, field: &str) -> Result<Self, ValueError> {
        value.as_float().ok_or_else(|| wrong_kind(field, ValueKind::Float, value))
    }
}

/// Durations are written as human-readable strings, for instance `"1s"` or `"250ms"`.
impl FromValue for Duration {
    fn from_value(value: &Value, field: &str) -> Result<Self, ValueError> {
        let s = value.as_str().ok_or_else(|| wrong_kind(field, ValueKind::String, value))?;
        humantime_serde::re::humantime::parse_duration(s).map_err(|e| ValueError::Invalid {
            field: field.to_owned(),
            message: e.to_string(),
        })
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value, field: &str) -> Result<Self, ValueError> {
        let items = value.as_array().ok_or_else(|| wrong_kind(field, ValueKind::Array, value))?;
        items
            .iter()
            .enumerate()
            .map(|(i, item)| T::from_value(item, &format!("{field}[{i}]")))
            .collect()
    }
}

impl<T: FromValue> FromValue for IndexMap<String, T> {
    fn from_value(value: &Value, field: &str) -> Result<Self, ValueError> {
        let map = value.as_object().ok_or_else(|| wrong_kind(field, ValueKind::Object, value))?;
        map.iter()
            .map(|(k, v)| Ok((k.clone(), T::from_value(v, &format!("{field}.{k}"))?)))
            .collect()
    }
}
