//! External analysis services.
//!
//! The generator talks to the model through [`AnalysisService`], one async
//! call per run. Two implementations ship with the crate:
//!
//! * [`gemini::GeminiService`]: Gemini's REST `generateContent` endpoint
//!   with `responseSchema`, so the output shape is enforced server-side.
//! * [`llm::LlmProviderService`]: any `edgequake_llm` chat provider
//!   (OpenAI, Anthropic, Ollama, …); the schema travels in the prompt.
//!
//! Neither retries: a failed call fails the run.

pub mod gemini;
pub mod llm;

use crate::error::ServiceError;
use crate::pipeline::compose::AnalysisRequest;
use async_trait::async_trait;

/// Raw reply from an analysis service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceResponse {
    /// Text payload, expected to be a JSON array of bill items.
    pub text: String,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// A model that turns an [`AnalysisRequest`] into response text.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Display name used in progress messages (e.g. the model id).
    fn name(&self) -> &str;

    /// Send one request and wait for the reply.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<ServiceResponse, ServiceError>;
}

pub use gemini::GeminiService;
pub use llm::LlmProviderService;
