//! Tracewire Core
//!
//! Identifiers, error handling and agent configuration shared by the
//! tracing engine and the interceptors built on top of it.

pub mod config;
pub mod error;
pub mod ids;

pub use config::AgentConfig;
pub use error::{Error, Result};
pub use ids::*;
