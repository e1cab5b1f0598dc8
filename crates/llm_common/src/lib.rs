//! Shared types for llmd and llmctl.
//!
//! Everything that crosses the HTTP boundary lives here so the daemon and
//! the client agree on service names, states and payload shapes.

pub mod api;
pub mod service;

pub use api::*;
pub use service::*;

/// Default address the control API listens on
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:7999";

/// Default base URL used by clients
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:7999";
