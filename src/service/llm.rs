//! Chat-provider backend via `edgequake_llm`.
//!
//! Providers reached this way have no server-side schema support, so the
//! schema is appended to the instructions and sent as the system message.
//! The plan and the reference images travel together in one user message,
//! plan first.

use crate::error::{BomError, ServiceError};
use crate::pipeline::compose::AnalysisRequest;
use crate::prompts::instructions_with_schema;
use crate::service::{AnalysisService, ServiceResponse};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default model when a provider is named without one.
pub const DEFAULT_PROVIDER_MODEL: &str = "gpt-4.1";

const DEFAULT_TEMPERATURE: f32 = 0.1;
const DEFAULT_MAX_TOKENS: usize = 8192;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// [`AnalysisService`] wrapping any `edgequake_llm` vision provider.
pub struct LlmProviderService {
    provider: Arc<dyn LLMProvider>,
    name: String,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
}

impl LlmProviderService {
    /// Wrap a pre-built provider. `name` appears in progress messages.
    pub fn new(provider: Arc<dyn LLMProvider>, name: impl Into<String>) -> Self {
        Self {
            provider,
            name: name.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Build a provider by name (`"openai"`, `"anthropic"`, `"ollama"`, ...).
    /// The API key is read from the provider's usual environment variable.
    pub fn from_name(provider_name: &str, model: Option<&str>) -> Result<Self, BomError> {
        let model = model.unwrap_or(DEFAULT_PROVIDER_MODEL);
        let provider =
            ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
                BomError::ProviderNotConfigured {
                    provider: provider_name.to_string(),
                    hint: format!("{e}"),
                }
            })?;
        Ok(Self::new(provider, format!("{provider_name}/{model}")))
    }

    /// Resolve a provider from the environment.
    ///
    /// `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` win when both are set;
    /// otherwise the factory scans for any known API key.
    pub fn from_env() -> Result<Self, BomError> {
        if let (Ok(prov), Ok(model)) = (
            std::env::var("EDGEQUAKE_LLM_PROVIDER"),
            std::env::var("EDGEQUAKE_MODEL"),
        ) {
            if !prov.is_empty() && !model.is_empty() {
                return Self::from_name(&prov, Some(&model));
            }
        }

        let (provider, _embedding) =
            ProviderFactory::from_env().map_err(|e| BomError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: format!(
                    "No LLM provider could be auto-detected from environment.\n\
                    Set GEMINI_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY.\n\
                    Error: {}",
                    e
                ),
            })?;
        Ok(Self::new(provider, "auto"))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens.max(256);
        self
    }

    /// Whole-call deadline. Default: 300 s.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.max(Duration::from_secs(1));
        self
    }
}

/// Bound `call` by `timeout`; an expired deadline is [`ServiceError::Timeout`].
async fn with_deadline<T, F>(service: &str, timeout: Duration, call: F) -> Result<T, ServiceError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| ServiceError::Timeout {
            service: service.to_string(),
            secs: timeout.as_secs(),
        })
}

fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

/// System message carries instructions + schema; one user message carries
/// every image, plan first.
fn build_messages(request: &AnalysisRequest) -> Vec<ChatMessage> {
    let system = instructions_with_schema(request.instructions(), request.response_schema());
    let images: Vec<ImageData> = request
        .images()
        .map(|asset| {
            ImageData::new(asset.data.clone(), asset.media_type.clone()).with_detail("high")
        })
        .collect();

    vec![
        ChatMessage::system(system),
        ChatMessage::user_with_images(
            "The first image is the plan to analyze. Any further images are reference material.",
            images,
        ),
    ]
}

#[async_trait]
impl AnalysisService for LlmProviderService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<ServiceResponse, ServiceError> {
        let start = Instant::now();
        let messages = build_messages(request);
        let options = build_options(self.temperature, self.max_tokens);

        let call = self.provider.chat(&messages, Some(&options));
        match with_deadline(&self.name, self.timeout, call).await? {
            Ok(response) => {
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    self.name,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                if response.content.trim().is_empty() {
                    return Err(ServiceError::EmptyResponse {
                        service: self.name.clone(),
                    });
                }
                Ok(ServiceResponse {
                    text: response.content,
                    input_tokens: Some(response.prompt_tokens as u64),
                    output_tokens: Some(response.completion_tokens as u64),
                })
            }
            Err(e) => {
                warn!("{}: request failed: {}", self.name, e);
                Err(ServiceError::Provider {
                    message: format!("{}: {}", self.name, e),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::compose::compose_request;
    use crate::pipeline::encode::EncodedAsset;

    fn asset(mime: &str, data: &str) -> EncodedAsset {
        EncodedAsset {
            media_type: mime.into(),
            data: data.into(),
        }
    }

    #[test]
    fn build_options_defaults() {
        let opts = build_options(DEFAULT_TEMPERATURE, DEFAULT_MAX_TOKENS);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(8192));
    }

    #[tokio::test]
    async fn deadline_expiry_is_a_timeout() {
        let err = with_deadline("openai/gpt-4.1", Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await
        .unwrap_err();
        match err {
            ServiceError::Timeout { service, .. } => assert_eq!(service, "openai/gpt-4.1"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn deadline_passes_through_fast_calls() {
        let value = with_deadline("ollama/llava", Duration::from_secs(1), async { 7 })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn messages_carry_every_image_plan_first() {
        let request = compose_request(
            "list the materials",
            asset("image/jpeg", "PLAN"),
            vec![asset("image/png", "REF")],
        );
        let messages = build_messages(&request);
        assert_eq!(messages.len(), 2);

        let images = messages[1].images.as_ref().unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].data, "PLAN");
        assert_eq!(images[0].mime_type, "image/jpeg");
        assert_eq!(images[1].mime_type, "image/png");
    }
}
