//! Component kinds and instances.
//!
//! A component kind is described by a [`ComponentDefinition`]: its name, its [stability](Stability),
//! the [shape](Shape) of its arguments and exports, and a build function.
//! Definitions are collected in a [`Registry`](registry::Registry) before any graph is loaded.
//!
//! The build function turns arguments into a running [`Component`]. The runtime then:
//! - spawns a task that executes [`Component::run`] until the instance is removed from the graph,
//! - calls [`Component::update`] when the arguments of the instance change.
//!
//! Exports are not returned by the build function: the component publishes them with the
//! [`ExportPublisher`] obtained from its [`BuildContext`], as many times as it wants.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::controller::exports::ExportPublisher;
use crate::service::{Service, ServiceUnavailableError, Services};
use crate::value::{Value, ValueKind};

mod error;
pub mod naming;
pub mod registry;
mod stability;

pub use error::{BuildError, BuildErrorKind};
pub use naming::ComponentPath;
pub use stability::Stability;

/// A running instance of a component kind.
///
/// Implementations are shared between the instance task (which executes [`run`](Component::run))
/// and the controller (which calls [`update`](Component::update)), hence the `Sync` bound.
/// Use interior mutability to modify the state of the component.
pub trait Component: Send + Sync + 'static {
    /// Runs the component until `token` is cancelled or a fatal error occurs.
    ///
    /// The default implementation waits for the cancellation, which is enough for components
    /// that only react to updates and to data-plane calls.
    fn run(self: Arc<Self>, token: CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            token.cancelled().await;
            Ok(())
        })
    }

    /// Applies new arguments to the component.
    ///
    /// The update must be atomic: either the new arguments are fully applied, or an error
    /// is returned and the component keeps working with the previous arguments.
    fn update(&self, arguments: Value) -> anyhow::Result<()>;
}

/// Function that builds a component from its arguments.
pub trait ComponentBuilder:
    Fn(BuildContext, Value) -> Result<Arc<dyn Component>, BuildError> + Send + Sync + 'static
{
}
impl<F> ComponentBuilder for F where
    F: Fn(BuildContext, Value) -> Result<Arc<dyn Component>, BuildError> + Send + Sync + 'static
{
}

/// Definition of a component kind.
pub struct ComponentDefinition {
    /// Unique name of the kind, for instance `metrics.relabel`.
    pub name: String,
    pub stability: Stability,
    /// Fields accepted in the arguments.
    pub arguments: Shape,
    /// Fields published in the exports.
    pub exports: Shape,
    build: Box<dyn ComponentBuilder>,
}

/// The fields of an arguments or exports [`Value`].
///
/// An _open_ shape accepts any field, which is useful for pass-through components.
#[derive(Debug, Clone, Default)]
pub struct Shape {
    fields: Vec<Field>,
    open: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: ValueKind,
    pub required: bool,
}

/// Everything a build function can access.
pub struct BuildContext {
    pub(crate) id: ComponentPath,
    pub(crate) exports: ExportPublisher,
    pub(crate) services: Arc<Services>,
    pub(crate) data_path: PathBuf,
}

impl ComponentDefinition {
    pub fn new<F: ComponentBuilder>(
        name: impl Into<String>,
        stability: Stability,
        arguments: Shape,
        exports: Shape,
        build: F,
    ) -> Self {
        Self {
            name: name.into(),
            stability,
            arguments,
            exports,
            build: Box::new(build),
        }
    }

    /// Builds a new instance of this kind.
    pub fn build(&self, ctx: BuildContext, arguments: Value) -> Result<Arc<dyn Component>, BuildError> {
        (self.build)(ctx, arguments)
    }
}

impl std::fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("name", &self.name)
            .field("stability", &self.stability)
            .field("arguments", &self.arguments)
            .field("exports", &self.exports)
            .finish_non_exhaustive()
    }
}

impl Shape {
    /// Creates an empty, closed shape.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a shape that accepts any field.
    pub fn open() -> Self {
        Self {
            fields: Vec::new(),
            open: true,
        }
    }

    pub fn required(mut self, name: &'static str, kind: ValueKind) -> Self {
        self.fields.push(Field {
            name,
            kind,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: &'static str, kind: ValueKind) -> Self {
        self.fields.push(Field {
            name,
            kind,
            required: false,
        });
        self
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Returns true if `name` is a valid field of this shape.
    pub fn accepts_field(&self, name: &str) -> bool {
        self.open || self.field(name).is_some()
    }
}

impl BuildContext {
    /// Path of the instance being built.
    pub fn id(&self) -> &ComponentPath {
        &self.id
    }

    /// Returns a publisher that the component can keep to update its exports later.
    pub fn export_publisher(&self) -> ExportPublisher {
        self.exports.clone()
    }

    /// Publishes new exports for the instance being built.
    pub fn publish_exports(&self, exports: Value) {
        self.exports.publish(exports);
    }

    /// Looks up the service registered under `name`.
    ///
    /// # Errors
    /// Fails if the service has not been supplied to the runtime, if it is not ready yet,
    /// or if it is not of type `T`. Returning this error from the build function
    /// (with `?`) only fails the build of this instance.
    pub fn service<T: Service>(&self, name: &str) -> Result<Arc<T>, ServiceUnavailableError> {
        self.services.get::<T>(name)
    }

    /// Directory where the instance can store its data.
    ///
    /// The directory is not created by the runtime.
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }
}
