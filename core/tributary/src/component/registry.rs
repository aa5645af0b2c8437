//! Registry of component kinds.
//!
//! Kinds are registered during an explicit initialization phase, with a [`RegistryBuilder`].
//! [`RegistryBuilder::seal`] then produces the immutable [`Registry`] used by the graph builder.
//! Since a sealed registry is never modified, looking up a kind requires no lock.
//!
//! A process-wide registry is also available through [`register_global`], [`seal_global`]
//! and [`global`], for applications that prefer to register their kinds from separate modules.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use indexmap::IndexMap;

use super::ComponentDefinition;

/// Collects component definitions before the registry is sealed.
#[derive(Default)]
pub struct RegistryBuilder {
    definitions: IndexMap<String, Arc<ComponentDefinition>>,
}

/// A sealed, read-only registry of component kinds.
#[derive(Debug)]
pub struct Registry {
    definitions: IndexMap<String, Arc<ComponentDefinition>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A kind with the same name has already been registered.
    #[error("a component kind named `{0}` has already been registered")]
    DuplicateName(String),
    /// The registry has been sealed, no new kind can be registered.
    #[error("cannot register component kind `{0}`: the registry is sealed")]
    Sealed(String),
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new component kind.
    ///
    /// # Errors
    /// Fails if a kind with the same name already exists.
    pub fn register(&mut self, definition: ComponentDefinition) -> Result<(), RegistryError> {
        if self.definitions.contains_key(&definition.name) {
            return Err(RegistryError::DuplicateName(definition.name));
        }
        log::trace!("registering component kind {} ({})", definition.name, definition.stability);
        self.definitions.insert(definition.name.clone(), Arc::new(definition));
        Ok(())
    }

    /// Registers a new component kind, builder-style.
    pub fn with(mut self, definition: ComponentDefinition) -> Result<Self, RegistryError> {
        self.register(definition)?;
        Ok(self)
    }

    /// Seals the registry: no more kinds can be added.
    pub fn seal(self) -> Arc<Registry> {
        Arc::new(Registry {
            definitions: self.definitions,
        })
    }
}

impl Registry {
    /// Finds the definition of the kind `name`.
    pub fn lookup(&self, name: &str) -> Option<&Arc<ComponentDefinition>> {
        self.definitions.get(name)
    }

    /// Iterates on the definitions, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ComponentDefinition>> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

// ===== Process-wide registry

static GLOBAL_BUILDER: Mutex<Option<RegistryBuilder>> = Mutex::new(None);
static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

/// Registers a kind in the process-wide registry.
///
/// # Errors
/// Fails if the kind already exists, or if [`seal_global`] has already been called.
pub fn register_global(definition: ComponentDefinition) -> Result<(), RegistryError> {
    let mut builder = GLOBAL_BUILDER.lock().unwrap_or_else(PoisonError::into_inner);
    if GLOBAL.get().is_some() {
        return Err(RegistryError::Sealed(definition.name));
    }
    builder.get_or_insert_with(RegistryBuilder::new).register(definition)
}

/// Seals the process-wide registry and returns it.
///
/// Calling `seal_global` multiple times returns the same registry.
pub fn seal_global() -> Arc<Registry> {
    let mut builder = GLOBAL_BUILDER.lock().unwrap_or_else(PoisonError::into_inner);
    GLOBAL
        .get_or_init(|| builder.take().unwrap_or_default().seal())
        .clone()
}

/// Returns the process-wide registry, if it has been sealed.
pub fn global() -> Option<Arc<Registry>> {
    GLOBAL.get().cloned()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{register_global, seal_global, RegistryBuilder, RegistryError};
    use crate::component::{Component, ComponentDefinition, Shape, Stability};
    use crate::value::Value;

    struct Nothing;
    impl Component for Nothing {
        fn update(&self, _arguments: Value) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn definition(name: &str) -> ComponentDefinition {
        ComponentDefinition::new(name, Stability::Stable, Shape::open(), Shape::new(), |_ctx, _args| {
            Ok(Arc::new(Nothing) as Arc<dyn Component>)
        })
    }

    #[test]
    fn duplicates() {
        let mut builder = RegistryBuilder::new();
        builder.register(definition("a")).unwrap();
        builder.register(definition("b")).unwrap();
        assert_eq!(
            builder.register(definition("a")),
            Err(RegistryError::DuplicateName(String::from("a")))
        );
        let registry = builder.seal();
        assert_eq!(registry.len(), 2);
        assert!(registry.lookup("a").is_some());
        assert!(registry.lookup("c").is_none());
        let names: Vec<&str> = registry.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn global_registry_is_sealed_once() {
        register_global(definition("global.kind")).unwrap();
        let registry = seal_global();
        assert!(registry.lookup("global.kind").is_some());
        assert_eq!(
            register_global(definition("global.late")),
            Err(RegistryError::Sealed(String::from("global.late")))
        );
        assert!(Arc::ptr_eq(&registry, &seal_global()));
        assert!(super::global().is_some());
    }
}
