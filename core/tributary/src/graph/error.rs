use std::fmt;

use crate::component::naming::InvalidPathError;
use crate::component::{ComponentPath, Stability};
use crate::value::ValueKind;

/// The configuration is malformed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Parse(String),
    #[error("invalid component declaration: {0}")]
    InvalidDeclaration(String),
    #[error(transparent)]
    InvalidPath(#[from] InvalidPathError),
    #[error("component {0} is declared more than once")]
    DuplicatePath(ComponentPath),
    #[error("{path}: unknown argument `{argument}`")]
    UnknownArgument { path: ComponentPath, argument: String },
    #[error("{path}: missing required argument `{argument}`")]
    MissingArgument { path: ComponentPath, argument: String },
    #[error("{path}: invalid value for argument `{argument}`: expected {expected}, got {actual}")]
    ArgumentKind {
        path: ComponentPath,
        argument: String,
        expected: ValueKind,
        actual: ValueKind,
    },
    #[error("{path}: reference to undeclared component {target}")]
    UnknownReference { path: ComponentPath, target: ComponentPath },
    #[error("{path}: component {target} has no export named `{export}`")]
    UnknownExport {
        path: ComponentPath,
        target: ComponentPath,
        export: String,
    },
}

/// A structural error that prevents the graph from being built.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum GraphError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{path}: unknown component kind `{}`", path.kind)]
    UnknownKind { path: ComponentPath },
    #[error("{path}: component kind `{}` is {stability}, but the minimum stability level is {min}", path.kind)]
    Stability {
        path: ComponentPath,
        stability: Stability,
        min: Stability,
    },
    #[error(transparent)]
    Cycle(#[from] CycleError),
}

/// Some components depend on each other.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct CycleError {
    /// The members of one cycle, starting from the first declared one.
    /// Each member is a dependency of the next, the last one is a dependency of the first.
    pub paths: Vec<ComponentPath>,
}

/// Error returned when a configuration cannot be loaded.
///
/// Contains every structural error that has been found, not only the first one.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub struct LoadError {
    pub errors: Vec<GraphError>,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dependency cycle between ")?;
        for (i, path) in self.paths.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{path}")?;
        }
        Ok(())
    }
}

impl LoadError {
    pub fn single(error: impl Into<GraphError>) -> Self {
        Self {
            errors: vec![error.into()],
        }
    }

    /// Returns the cycles that have been detected.
    pub fn cycles(&self) -> impl Iterator<Item = &CycleError> {
        self.errors.iter().filter_map(|e| match e {
            GraphError::Cycle(c) => Some(c),
            _ => None,
        })
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to load the configuration ({} error(s))", self.errors.len())?;
        for e in &self.errors {
            write!(f, "\n- {e}")?;
        }
        Ok(())
    }
}

impl From<ConfigError> for LoadError {
    fn from(value: ConfigError) -> Self {
        Self::single(value)
    }
}
