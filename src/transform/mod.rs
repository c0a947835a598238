//! Text transformation providers
//!
//! - [`TextTransformer`] - the seam the task processor calls once per chunk
//! - [`openai`] - OpenAI-compatible chat completions client

use crate::error::TransformError;

pub mod openai;

pub use openai::OpenAiTransformer;

/// Transforms one chunk of text.
///
/// Implementations must not retry internally: a failed call is reported
/// to the task processor as-is, which aborts the whole task.
#[async_trait::async_trait]
pub trait TextTransformer: Send + Sync {
    /// Transform a single chunk
    async fn transform(&self, chunk: &str) -> Result<String, TransformError>;
}
