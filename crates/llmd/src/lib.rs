//! llmd library - exposes modules for testing.

pub mod config;
pub mod controller;
pub mod error;
pub mod inspector;
pub mod prober;
pub mod registry;
pub mod routes;
pub mod runner;
pub mod server;

pub use controller::{LifecycleController, LifecycleOutcome, LifecycleResult, LifecycleTimings};
pub use error::LifecycleError;
