//! The tributary agent: the built-in component kinds and the helpers of the binary.

use std::sync::Arc;

use env_logger::Env;
use tributary::component::registry::{Registry, RegistryBuilder, RegistryError};

pub mod kinds;

/// Initializes the global logger.
///
/// The default level is `info`, use the `RUST_LOG` environment variable to change it.
///
/// # Example
///
/// ```
/// use tributary_agent::init_logger;
///
/// fn main() {
///     init_logger();
///     log::info!("I can log now!");
/// }
/// ```
pub fn init_logger() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // Print a warning if we are running in debug mode.
    #[cfg(debug_assertions)]
    {
        log::warn!("DEBUG assertions are enabled, this build of the agent is fine for debugging, but not for production.");
    }
}

/// Returns a sealed registry that contains the built-in kinds.
pub fn builtin_registry() -> Result<Arc<Registry>, RegistryError> {
    let mut builder = RegistryBuilder::new();
    kinds::register_all(&mut builder)?;
    Ok(builder.seal())
}
