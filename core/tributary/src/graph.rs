//! Dependency graph of component instances.
//!
//! A configuration declares component instances ([`ComponentDecl`]), whose arguments are
//! [expressions](Expr) that can reference the exports of other instances.
//! [`Graph::build`] validates the declarations against the [`Registry`](crate::component::registry::Registry),
//! derives the edges from the references, rejects cycles and computes a topological order.
//! [`GraphDiff`] compares a new graph with the live one, on reload.
//!
//! Structural errors are collected: a failed build reports all of them in one [`LoadError`].

mod builder;
mod decl;
mod diff;
mod error;

pub use builder::{Graph, GraphNode};
pub use decl::{ComponentDecl, ExportRef, Expr};
pub use diff::GraphDiff;
pub use error::{ConfigError, CycleError, GraphError, LoadError};
