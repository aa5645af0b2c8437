//! Support for the converters that translate foreign configuration formats into
//! tributary configurations.
//!
//! A converter is a function `(input, extra_args) -> (output, diagnostics)`, see [`Converter`].
//! The [`Diagnostics`] it returns describe everything that could not be converted exactly.
//!
//! [`validate_generated`] checks that the output of a converter is a configuration that the
//! runtime accepts.

use std::path::PathBuf;
use std::sync::Arc;

use crate::agent;
use crate::component::registry::Registry;
use crate::component::Stability;
use crate::config::{ComponentsConfig, RuntimeConfig};
use crate::controller::{LoadReport, NodeError, SendWaitError};
use crate::graph::LoadError;
use crate::service::cluster::{self, Cluster, ClusterOptions};
use crate::service::labelstore::{self, MemoryLabelStore};

mod diag;

pub use diag::{Diagnostic, Diagnostics, Severity};

/// Converts a foreign configuration into a tributary configuration.
pub type Converter = fn(&[u8], &[String]) -> (Vec<u8>, Diagnostics);

/// Settings of [`validate_generated`].
#[derive(Debug, Clone)]
pub struct ValidateOptions {
    /// The kinds that the generated configuration may use.
    pub registry: Arc<Registry>,
    pub min_stability: Stability,
    /// Root of the data directories of the components.
    pub data_path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ValidateError {
    #[error("the generated configuration is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("the generated configuration could not be parsed")]
    Parse(#[source] LoadError),
    #[error("the runtime could not be started")]
    Runtime(#[source] anyhow::Error),
    #[error("the generated configuration could not be loaded")]
    Load(#[source] SendWaitError),
    #[error("{} component(s) failed to build:\n{}", .0.len(), render_failures(.0))]
    Components(Vec<Arc<NodeError>>),
}

impl ValidateOptions {
    pub fn new(registry: Arc<Registry>, data_path: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            min_stability: Stability::Experimental,
            data_path: data_path.into(),
        }
    }
}

/// Loads a generated configuration in a fresh runtime, to check that every component can be built.
///
/// The runtime is given the services that the components usually need: a label store and a
/// disabled cluster. Build failures caused by the environment (such as a missing certificate
/// file) are logged and ignored. Any other error fails the validation.
///
/// This function blocks until the runtime is shut down: do not call it from an async context.
pub fn validate_generated(generated: &[u8], options: &ValidateOptions) -> Result<LoadReport, ValidateError> {
    let content = std::str::from_utf8(generated)?;
    let config = ComponentsConfig::parse_str(content).map_err(ValidateError::Parse)?;

    let cluster = Cluster::new(ClusterOptions {
        enabled: false,
        node_name: String::from("validation-node"),
        advertise_address: String::from("127.0.0.1:80"),
    })
    .map_err(|e| ValidateError::Runtime(e.into()))?;
    let runtime_config = RuntimeConfig {
        min_stability: options.min_stability,
        data_path: options.data_path.clone(),
        ..Default::default()
    };
    let agent = agent::Builder::new(options.registry.clone())
        .runtime_config(runtime_config)
        .with_service(labelstore::SERVICE_NAME, Arc::new(MemoryLabelStore::new()))
        .with_service(cluster::SERVICE_NAME, Arc::new(cluster))
        .build_and_start()
        .map_err(ValidateError::Runtime)?;

    let loaded = agent.load_blocking(config);
    if let Err(e) = agent.shutdown_and_wait() {
        log::warn!("validation runtime did not shut down properly: {e:#}");
    }
    let report = loaded.map_err(ValidateError::Load)?;

    let mut fatal = Vec::new();
    for failure in &report.failures {
        match failure.build_error() {
            Some(e) if e.is_environment() => log::info!("ignoring error: {failure}"),
            _ => fatal.push(failure.clone()),
        }
    }
    if fatal.is_empty() {
        Ok(report)
    } else {
        Err(ValidateError::Components(fatal))
    }
}

fn render_failures(failures: &[Arc<NodeError>]) -> String {
    failures
        .iter()
        .map(|e| format!("- {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}
