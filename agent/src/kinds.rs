//! Component kinds shipped with the agent.

use tributary::component::registry::{RegistryBuilder, RegistryError};
use tributary::component::ComponentDefinition;

pub mod echo;
pub mod generate;
pub mod logs_log;
pub mod metrics_log;
pub mod relabel;

/// Returns the definitions of every built-in kind.
pub fn definitions() -> Vec<ComponentDefinition> {
    vec![
        echo::definition(),
        generate::definition(),
        relabel::definition(),
        metrics_log::definition(),
        logs_log::definition(),
    ]
}

/// Registers every built-in kind.
pub fn register_all(registry: &mut RegistryBuilder) -> Result<(), RegistryError> {
    for definition in definitions() {
        registry.register(definition)?;
    }
    Ok(())
}
