//! `chunkflow-core`: shared building blocks.
//!
//! Identifiers, the error model and engine configuration. No IO beyond
//! reading environment variables.

pub mod config;
pub mod error;
pub mod id;
pub mod status;

pub use config::EngineConfig;
pub use error::{CoreError, CoreResult};
pub use id::JobId;
pub use status::JobStatus;
