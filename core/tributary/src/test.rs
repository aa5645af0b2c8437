//! Testing utilities.
//!
//! Components and converters rely on the runtime to work: they receive a [`BuildContext`](crate::component::BuildContext)
//! built by the controller, and their output is only meaningful once it has been loaded.
//! This module provides helpers to exercise them outside of a running agent.
//!
//! # Feature Flag
//!
//! To use this module, you need to enable the `test` feature of tributary.
//! Since you only need it for testing, the feature should only be enabled in `dev-dependencies`.
//!
//! Extract of `Cargo.toml`:
//! ```toml
//! [dependencies]
//! tributary = "version"
//!
//! [dev-dependencies]
//! tributary = {version = "version", features = ["test"]}
//! ```

/// Tests of configuration converters.
pub mod convert;


pub use context::{Built, TestBuild};
