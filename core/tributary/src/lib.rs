//! Tributary: a component graph runtime for telemetry pipelines.
//!
//! A telemetry agent is described by a declarative configuration: a list of component
//! instances (receivers, transforms, exporters) whose arguments may reference the exports
//! of other instances. This crate turns such a configuration into a live graph and keeps it
//! running.
//!
//! # This crate
//! It provides:
//! 1. A [registry](component::registry) of component kinds, with their argument and export
//!    [shapes](component::Shape) and their [stability](component::Stability).
//! 2. A [graph builder](graph) that derives dependency edges from argument references,
//!    rejects cycles and computes a deterministic evaluation order.
//! 3. A [controller](controller) that builds, updates and tears down instances on a single
//!    serialized task, and propagates export changes to the dependent instances.
//! 4. The [data plane](dataplane) used by running instances to move samples and log entries
//!    to each other (appenders, receivers, fanouts).
//! 5. [Services](service) injected into the instances at build time.
//!
//! The runtime is backed by asynchronous **Tokio** tasks: one per running instance,
//! plus the controller task.
//!
//! # Running a graph
//! Most users want to go through the [`agent`] module, which owns the Tokio runtime:
//! ```no_run
//! use tributary::{agent, component::registry::RegistryBuilder, config::ComponentsConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let registry = RegistryBuilder::new().seal();
//! let agent = agent::Builder::new(registry).build_and_start()?;
//! let config = ComponentsConfig::parse_str("")?;
//! agent.load_blocking(config)?;
//! agent.shutdown_and_wait()?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod component;
pub mod config;
pub mod controller;
pub mod convert;
pub mod dataplane;
pub mod graph;
pub mod service;
pub mod value;

#[cfg(feature = "test")]
pub mod test;

/// Check (at compile-time) that `T` is [`Send`].
#[cfg(test)]
pub(crate) fn assert_send<T: Send>() {}

/// Check (at compile-time) that `T` is [`Sync`].
#[cfg(test)]
pub(crate) fn assert_sync<T: Sync>() {}
