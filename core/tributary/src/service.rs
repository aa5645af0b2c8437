//! Process-wide services injected into components.
//!
//! Services are long-lived objects that live outside of the component graph, for instance
//! the [label store](labelstore) or the [cluster](cluster) handle. They are supplied to the
//! runtime at startup, and components look them up by name at build time with
//! [`BuildContext::service`](crate::component::BuildContext::service).
//!
//! The runtime only mediates the lookup: it never starts, stops or modifies a service.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

pub mod cluster;
pub mod labelstore;

/// A process-wide service.
pub trait Service: Any + Send + Sync {
    /// Returns false while the service is still initializing.
    fn is_ready(&self) -> bool {
        true
    }
}

/// The set of services available to the components.
#[derive(Default)]
pub struct Services {
    entries: FxHashMap<String, ServiceEntry>,
}

struct ServiceEntry {
    service: Arc<dyn Service>,
    any: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

/// Error returned when a service cannot be obtained.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("service `{name}` is unavailable: {reason}")]
pub struct ServiceUnavailableError {
    pub name: String,
    pub reason: UnavailableReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    /// The service has not been supplied to the runtime.
    Missing,
    /// The service exists but has not finished its initialization.
    NotReady,
    /// The service exists but is not of the requested type.
    WrongType { expected: &'static str, actual: &'static str },
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a service under the given name, replacing any previous service with that name.
    pub fn add<S: Service>(&mut self, name: impl Into<String>, service: Arc<S>) {
        let entry = ServiceEntry {
            service: service.clone(),
            any: service,
            type_name: std::any::type_name::<S>(),
        };
        self.entries.insert(name.into(), entry);
    }

    /// Adds a service, builder-style.
    pub fn with<S: Service>(mut self, name: impl Into<String>, service: Arc<S>) -> Self {
        self.add(name, service);
        self
    }

    /// Looks up the service registered under `name`.
    pub fn get<S: Service>(&self, name: &str) -> Result<Arc<S>, ServiceUnavailableError> {
        let unavailable = |reason| ServiceUnavailableError {
            name: name.to_owned(),
            reason,
        };
        let entry = self.entries.get(name).ok_or_else(|| unavailable(UnavailableReason::Missing))?;
        if !entry.service.is_ready() {
            return Err(unavailable(UnavailableReason::NotReady));
        }
        entry.any.clone().downcast::<S>().map_err(|_| {
            unavailable(UnavailableReason::WrongType {
                expected: std::any::type_name::<S>(),
                actual: entry.type_name,
            })
        })
    }

    /// Names of the available services.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::Missing => f.write_str("not supplied to the runtime"),
            UnavailableReason::NotReady => f.write_str("not ready yet"),
            UnavailableReason::WrongType { expected, actual } => {
                write!(f, "expected a service of type {expected}, but it is {actual}")
            }
        }
    }
}
