use std::fmt;

use crate::service::ServiceUnavailableError;
use crate::value::ValueError;

/// Error returned by a component build function.
#[derive(Debug)]
pub struct BuildError {
    kind: BuildErrorKind,
    error: anyhow::Error,
}

/// Classification of a [`BuildError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildErrorKind {
    /// The arguments are invalid, or the component failed for an internal reason.
    Invalid,
    /// The component depends on something that the current environment does not provide:
    /// missing credentials or certificates, unreachable endpoint, etc.
    ///
    /// When validating a configuration on a machine that is not the deployment target,
    /// such errors are expected and can be tolerated.
    Environment,
    /// A service requested by the component is not available.
    ServiceUnavailable,
}

impl BuildError {
    pub fn new(kind: BuildErrorKind, error: impl Into<anyhow::Error>) -> Self {
        Self {
            kind,
            error: error.into(),
        }
    }

    /// Creates an error of kind [`BuildErrorKind::Invalid`].
    pub fn invalid(error: impl Into<anyhow::Error>) -> Self {
        Self::new(BuildErrorKind::Invalid, error)
    }

    /// Creates an error of kind [`BuildErrorKind::Environment`].
    pub fn environment(error: impl Into<anyhow::Error>) -> Self {
        Self::new(BuildErrorKind::Environment, error)
    }

    pub fn kind(&self) -> BuildErrorKind {
        self.kind
    }

    /// Returns true if the failure depends on the environment, see [`BuildErrorKind::Environment`].
    pub fn is_environment(&self) -> bool {
        self.kind == BuildErrorKind::Environment
    }
}

impl fmt::Display for BuildErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildErrorKind::Invalid => "invalid component",
            BuildErrorKind::Environment => "environment not suitable",
            BuildErrorKind::ServiceUnavailable => "service unavailable",
        };
        f.write_str(s)
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.kind, self.error)
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

impl From<anyhow::Error> for BuildError {
    fn from(value: anyhow::Error) -> Self {
        Self::invalid(value)
    }
}

impl From<ValueError> for BuildError {
    fn from(value: ValueError) -> Self {
        Self::invalid(value)
    }
}

impl From<ServiceUnavailableError> for BuildError {
    fn from(value: ServiceUnavailableError) -> Self {
        Self::new(BuildErrorKind::ServiceUnavailable, value)
    }
}
