use std::fmt;
use std::str::FromStr;

/// The full name of a component instance: `<kind>.<label>`.
///
/// The kind may contain dots (`metrics.relabel`), the label may not.
///
/// # Example
/// ```
/// use tributary::component::ComponentPath;
///
/// let path: ComponentPath = "metrics.relabel.default".parse().unwrap();
/// assert_eq!(path.kind, "metrics.relabel");
/// assert_eq!(path.label, "default");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentPath {
    /// Name of the component kind.
    pub kind: String,
    /// Label given to the instance in the configuration.
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPathError {
    #[error("invalid component path `{0}`: expected <kind>.<label>")]
    Syntax(String),
    #[error("invalid label `{0}`: only ASCII letters, digits, '_' and '-' are allowed")]
    Label(String),
    #[error("invalid kind `{0}`: kinds are made of non-empty, dot-separated identifiers")]
    Kind(String),
}

impl ComponentPath {
    /// Creates a path after checking the validity of the kind and the label.
    pub fn new(kind: impl Into<String>, label: impl Into<String>) -> Result<Self, InvalidPathError> {
        let kind = kind.into();
        let label = label.into();
        if kind.is_empty() || kind.split('.').any(|part| !is_identifier(part)) {
            return Err(InvalidPathError::Kind(kind));
        }
        if !is_identifier(&label) {
            return Err(InvalidPathError::Label(label));
        }
        Ok(Self { kind, label })
    }

    /// Creates a path without checking it. Prefer [`ComponentPath::new`] with untrusted input.
    pub fn from_str_unchecked(kind: &str, label: &str) -> Self {
        Self {
            kind: kind.to_owned(),
            label: label.to_owned(),
        }
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl FromStr for ComponentPath {
    type Err = InvalidPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, label) = s.rsplit_once('.').ok_or_else(|| InvalidPathError::Syntax(s.to_owned()))?;
        Self::new(kind, label)
    }
}

impl fmt::Display for ComponentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.label)
    }
}
