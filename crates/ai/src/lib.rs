//! `chunkflow-ai`
//!
//! **Responsibility:** boundary to the remote text-completion service.
//!
//! - `CompletionClient` is the only way the engine talks to the model.
//! - Failures are typed (`CompletionError`) and carry the remote status code
//!   when there is one; retry classification happens in the engine.
//! - Prompts and output sanitization live here so the engine stays
//!   prompt-agnostic.

pub mod completion;
pub mod http_client;
pub mod prompt;
pub mod sanitize;
pub mod scripted;

pub use completion::{CompletionClient, CompletionError, CompletionRequest};
pub use http_client::{HttpCompletionClient, HttpCompletionConfig};
pub use prompt::{Mode, PromptContext};
pub use sanitize::sanitize_model_output;
pub use scripted::{FnCompletionClient, ScriptedCompletionClient};
