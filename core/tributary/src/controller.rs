//! Control of the live graph.
//!
//! The [`Controller`] runs on a single Tokio task, which owns the live graph and performs
//! every structural modification, one at a time:
//! - loading a configuration: building the new graph, tearing down the removed nodes,
//!   building the new nodes and updating the modified ones;
//! - propagating the exports published by a node to the nodes that depend on it;
//! - noticing the nodes whose task stops on its own.
//!
//! Each running node has its own task, which executes [`Component::run`](crate::component::Component::run)
//! until the node is removed. Node tasks never modify the graph: they only publish exports,
//! through an [`ExportPublisher`](exports::ExportPublisher).
//!
//! The controller is driven through a [`ControlHandle`].
//!
//! ## Failures
//! A configuration that cannot be turned into a valid graph is rejected as a whole, and the
//! live graph is left untouched. On the contrary, the failure of a node (build, update, or
//! unexpected end of its task) only affects that node: it is marked as [failed](NodeState::Failed)
//! and retried on the next configuration load.

pub mod exports;

mod error;
mod handle;
mod main_loop;
mod messages;
mod node;
mod scheduler;

pub use error::{ControllerError, DispatchError, NodeError, SendWaitError};
pub use handle::ControlHandle;
pub use main_loop::Controller;
pub use node::{NodeInfo, NodeState};
pub use scheduler::LoadReport;
