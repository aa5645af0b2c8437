//! Configuration of the runtime and of the component graph.
//!
//! A configuration file is a TOML document with two parts:
//! - the `[runtime]` table, deserialized into a [`RuntimeConfig`];
//! - the `[[component]]` array of tables, turned into a [`ComponentsConfig`].
//!
//! ```toml
//! [runtime]
//! min_stability = "beta"
//! shutdown_grace_period = "5s"
//!
//! [[component]]
//! kind = "echo"
//! label = "a"
//! [component.arguments]
//! value = "x"
//!
//! [[component]]
//! kind = "echo"
//! label = "b"
//! [component.arguments]
//! value = { ref = "echo.a", export = "value" }
//! ```
//!
//! Use a [`Loader`] to read the file, with environment variable substitution and overrides.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::component::{ComponentPath, Stability};
use crate::graph::{ComponentDecl, ConfigError, Expr, GraphError, LoadError};

mod loader;

pub use loader::{
    merge_override, substitute_env, ConfigFileError, ConfigFileErrorCause, InvalidSubstitutionError, Loader,
};

/// Key of the runtime settings.
pub const RUNTIME_KEY: &str = "runtime";
/// Key of the array of component declarations.
pub const COMPONENT_KEY: &str = "component";

/// Settings of the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Component kinds below this level are rejected.
    pub min_stability: Stability,
    /// How long a component can take to stop before its task is aborted.
    #[serde(with = "humantime_serde")]
    pub shutdown_grace_period: Duration,
    /// Capacity of the channel that carries the control requests.
    pub control_channel_size: usize,
    /// Root of the directories given to the components, see
    /// [`BuildContext::data_path`](crate::component::BuildContext::data_path).
    pub data_path: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            min_stability: Stability::Stable,
            shutdown_grace_period: Duration::from_secs(5),
            control_channel_size: 256,
            data_path: PathBuf::from("data"),
        }
    }
}

impl RuntimeConfig {
    /// Reads the `[runtime]` table of a configuration, if there is one.
    pub fn from_table(table: &toml::Table) -> Result<Self, ConfigError> {
        match table.get(RUNTIME_KEY) {
            None => Ok(Self::default()),
            Some(value) => value
                .clone()
                .try_into()
                .map_err(|e: toml::de::Error| ConfigError::Parse(format!("[{RUNTIME_KEY}]: {}", e.message()))),
        }
    }
}

/// The component instances declared in a configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentsConfig {
    components: Vec<ComponentDecl>,
}

impl ComponentsConfig {
    pub fn new(components: Vec<ComponentDecl>) -> Self {
        Self { components }
    }

    /// Parses a TOML document and extracts its component declarations.
    ///
    /// Other top-level keys are ignored.
    pub fn parse_str(content: &str) -> Result<Self, LoadError> {
        let table: toml::Table = content
            .parse()
            .map_err(|e: toml::de::Error| ConfigError::Parse(e.message().to_owned()))?;
        Self::from_table(&table)
    }

    /// Extracts the component declarations of a TOML table.
    ///
    /// # Errors
    /// Every malformed declaration is reported, not only the first one.
    pub fn from_table(table: &toml::Table) -> Result<Self, LoadError> {
        let items = match table.get(COMPONENT_KEY) {
            None => return Ok(Self::default()),
            Some(toml::Value::Array(items)) => items,
            Some(other) => {
                let msg = format!("`{COMPONENT_KEY}` must be an array of tables, not a {}", other.type_str());
                return Err(ConfigError::InvalidDeclaration(msg).into());
            }
        };

        let mut components = Vec::with_capacity(items.len());
        let mut errors = Vec::new();
        for (i, item) in items.iter().enumerate() {
            match parse_declaration(item) {
                Ok(decl) => components.push(decl),
                Err(e) => {
                    log::debug!("invalid component #{i}: {e}");
                    errors.push(GraphError::Config(e));
                }
            }
        }
        if errors.is_empty() {
            Ok(Self { components })
        } else {
            Err(LoadError { errors })
        }
    }

    pub fn components(&self) -> &[ComponentDecl] {
        &self.components
    }

    pub fn into_components(self) -> Vec<ComponentDecl> {
        self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl From<ComponentsConfig> for Vec<ComponentDecl> {
    fn from(value: ComponentsConfig) -> Self {
        value.components
    }
}

impl FromIterator<ComponentDecl> for ComponentsConfig {
    fn from_iter<T: IntoIterator<Item = ComponentDecl>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

fn parse_declaration(item: &toml::Value) -> Result<ComponentDecl, ConfigError> {
    let toml::Value::Table(table) = item else {
        return Err(ConfigError::InvalidDeclaration(format!(
            "expected a table, got a {}",
            item.type_str()
        )));
    };
    let string_key = |key: &str| match table.get(key) {
        Some(toml::Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(ConfigError::InvalidDeclaration(format!(
            "`{key}` must be a string, not a {}",
            other.type_str()
        ))),
        None => Err(ConfigError::InvalidDeclaration(format!("missing key `{key}`"))),
    };
    let kind = string_key("kind")?;
    let label = string_key("label")?;
    let path = ComponentPath::new(kind, label)?;

    if let Some(unknown) = table.keys().find(|k| !matches!(k.as_str(), "kind" | "label" | "arguments")) {
        return Err(ConfigError::InvalidDeclaration(format!("{path}: unknown key `{unknown}`")));
    }

    let mut decl = ComponentDecl::new(path);
    match table.get("arguments") {
        None => (),
        Some(toml::Value::Table(arguments)) => {
            for (name, value) in arguments {
                let expr = Expr::from_toml(value.clone())?;
                decl.arguments.insert(name.clone(), expr);
            }
        }
        Some(other) => {
            return Err(ConfigError::InvalidDeclaration(format!(
                "{}: `arguments` must be a table, not a {}",
                decl.path,
                other.type_str()
            )));
        }
    }
    Ok(decl)
}
