//! Text-generation backend seam.
//!
//! The report loop only needs "prompt in, text out"; concrete backends
//! (Gemini over HTTP, scripted fakes in tests) implement [`TextGenerator`].

use async_trait::async_trait;

use crate::error::GenerationError;

/// One generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub top_p: f32,
}

/// A backend that turns a prompt into unstructured text.
///
/// Implementations make a single call per request; retrying and timeouts are
/// their own business, never the caller's.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}
