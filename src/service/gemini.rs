//! Gemini REST client with schema-constrained generation.
//!
//! ## Request shape
//!
//! `POST {base_url}/models/{model}:generateContent` with the API key in the
//! `x-goog-api-key` header. Each request part becomes its own user content
//! entry, in order: the instruction text, then the plan image, then every
//! reference image as `inlineData`. `generationConfig` sets
//! `responseMimeType: application/json` and attaches the bill-item schema as
//! `responseSchema`, which makes the service emit bare JSON.
//!
//! ## Response handling
//!
//! The text of the first candidate's non-thought parts is concatenated and
//! returned untouched; validation happens in
//! [`crate::pipeline::validate`]. HTTP failures are mapped to
//! [`ServiceError`] variants so callers can tell a bad key from a quota
//! problem.

use crate::config::GeminiConfig;
use crate::error::{BomError, ServiceError};
use crate::pipeline::compose::{AnalysisRequest, RequestPart};
use crate::service::{AnalysisService, ServiceResponse};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// [`AnalysisService`] backed by the Gemini REST API.
pub struct GeminiService {
    client: reqwest::Client,
    api_key: String,
    config: GeminiConfig,
}

impl fmt::Debug for GeminiService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiService")
            .field("api_key", &"<redacted>")
            .field("config", &self.config)
            .finish()
    }
}

impl GeminiService {
    /// Create a client. The key is passed through to the service unchanged.
    pub fn new(api_key: impl Into<String>, config: GeminiConfig) -> Result<Self, BomError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BomError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            config,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        )
    }
}

#[async_trait]
impl AnalysisService for GeminiService {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<ServiceResponse, ServiceError> {
        let service = self.name();
        let body = build_request_body(request, &self.config);
        let start = Instant::now();

        info!(
            "POST {} ({} images, {} bytes base64)",
            self.endpoint(),
            request.images().count(),
            request.payload_bytes()
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(service, self.config.timeout_secs, e))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(service, self.config.timeout_secs, e))?;

        debug!(
            "{}: HTTP {} in {:?}, {} bytes",
            service,
            status,
            start.elapsed(),
            text.len()
        );

        if !status.is_success() {
            let err = map_status(service, status, retry_after, &text);
            warn!("{}: {}", service, err);
            return Err(err);
        }

        extract_response(service, &text)
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: Blob<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// JSON body for `generateContent`.
fn build_request_body(request: &AnalysisRequest, config: &GeminiConfig) -> Value {
    let contents = request
        .parts()
        .iter()
        .map(|part| {
            let part = match part {
                RequestPart::Instructions(text) => Part::Text { text },
                RequestPart::Image { asset, .. } => Part::Inline {
                    inline_data: Blob {
                        mime_type: &asset.media_type,
                        data: &asset.data,
                    },
                },
            };
            Content {
                role: "user",
                parts: vec![part],
            }
        })
        .collect();

    let body = GenerateContentRequest {
        contents,
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: request.response_schema(),
            temperature: config.temperature,
        },
    };

    // Plain borrowed strings and a Value: serialisation cannot fail.
    serde_json::to_value(&body).unwrap_or(Value::Null)
}

/// Pull the answer text and usage out of a successful response body.
fn extract_response(service: &str, body: &str) -> Result<ServiceResponse, ServiceError> {
    let parsed: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| ServiceError::Transport {
            service: service.to_string(),
            message: format!("malformed response body: {e}"),
        })?;

    if let Some(reason) = parsed
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.clone())
    {
        return Err(ServiceError::Blocked {
            service: service.to_string(),
            reason,
        });
    }

    let candidate = parsed.candidates.first();
    let text: String = candidate
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter(|p| !p.thought)
                .filter_map(|p| p.text.as_deref())
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return match candidate.and_then(|c| c.finish_reason.clone()) {
            Some(reason) if reason != "STOP" => Err(ServiceError::Blocked {
                service: service.to_string(),
                reason,
            }),
            _ => Err(ServiceError::EmptyResponse {
                service: service.to_string(),
            }),
        };
    }

    let usage = parsed.usage_metadata.as_ref();
    Ok(ServiceResponse {
        text,
        input_tokens: usage.and_then(|u| u.prompt_token_count),
        output_tokens: usage.and_then(|u| u.candidates_token_count),
    })
}

/// Map a non-success HTTP status to a [`ServiceError`].
fn map_status(
    service: &str,
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: &str,
) -> ServiceError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|env| env.error.message)
        .unwrap_or_else(|_| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Auth {
            service: service.to_string(),
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => ServiceError::RateLimited {
            service: service.to_string(),
            retry_after_secs,
        },
        _ => ServiceError::Api {
            service: service.to_string(),
            status: status.as_u16(),
            message,
        },
    }
}

fn transport_error(service: &str, timeout_secs: u64, e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout {
            service: service.to_string(),
            secs: timeout_secs,
        }
    } else {
        ServiceError::Transport {
            service: service.to_string(),
            message: e.to_string(),
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
    fn body_lists_parts_in_request_order() {
        let request = compose_request(
            "analyze the plan",
            asset("image/jpeg", "PLAN"),
            vec![asset("image/png", "REF1"), asset("image/webp", "REF2")],
        );
        let body = build_request_body(&request, &GeminiConfig::default());
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 4);
        assert_eq!(contents[0]["parts"][0]["text"], "analyze the plan");
        assert_eq!(contents[1]["parts"][0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(contents[1]["parts"][0]["inlineData"]["data"], "PLAN");
        assert_eq!(contents[3]["parts"][0]["inlineData"]["data"], "REF2");
        assert!(contents.iter().all(|c| c["role"] == "user"));
    }

    #[test]
    fn body_carries_schema_constraint() {
        let request = compose_request("x", asset("image/jpeg", "P"), vec![]);
        let body = build_request_body(&request, &GeminiConfig::default());
        let gen = &body["generationConfig"];
        assert_eq!(gen["responseMimeType"], "application/json");
        assert_eq!(gen["responseSchema"]["type"], "ARRAY");
        assert!(gen.get("temperature").is_none());

        let config = GeminiConfig::builder().temperature(0.2).build().unwrap();
        let body = build_request_body(&request, &config);
        assert!(body["generationConfig"]["temperature"].is_number());
    }

    #[test]
    fn extracts_text_and_usage() {
        let body = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "thinking...", "thought": true},
                    {"text": "[{\"codigo\":\"001\","},
                    {"text": "\"descripcion\":\"x\",\"unidad\":\"m\",\"cantidad\":1}]"}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 1200, "candidatesTokenCount": 80}
        }"#;
        let resp = extract_response("gemini-2.5-pro", body).unwrap();
        assert!(resp.text.starts_with("[{\"codigo\":\"001\","));
        assert!(!resp.text.contains("thinking"));
        assert_eq!(resp.input_tokens, Some(1200));
        assert_eq!(resp.output_tokens, Some(80));
    }

    #[test]
    fn blocked_prompt() {
        let body = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let err = extract_response("gemini", body).unwrap_err();
        assert!(matches!(err, ServiceError::Blocked { ref reason, .. } if reason == "SAFETY"));
    }

    #[test]
    fn empty_candidates() {
        let err = extract_response("gemini", r#"{"candidates": []}"#).unwrap_err();
        assert!(matches!(err, ServiceError::EmptyResponse { .. }));

        let body = r#"{"candidates": [{"finishReason": "MAX_TOKENS"}]}"#;
        let err = extract_response("gemini", body).unwrap_err();
        assert!(matches!(err, ServiceError::Blocked { ref reason, .. } if reason == "MAX_TOKENS"));
    }

    #[test]
    fn status_mapping() {
        let body = r#"{"error": {"code": 403, "message": "API key not valid", "status": "PERMISSION_DENIED"}}"#;
        let err = map_status("gemini", StatusCode::FORBIDDEN, None, body);
        assert!(matches!(err, ServiceError::Auth { ref message, .. } if message == "API key not valid"));

        let err = map_status("gemini", StatusCode::TOO_MANY_REQUESTS, Some(17), "");
        assert!(matches!(
            err,
            ServiceError::RateLimited {
                retry_after_secs: Some(17),
                ..
            }
        ));

        let err = map_status("gemini", StatusCode::INTERNAL_SERVER_ERROR, None, "<html>");
        assert!(matches!(
            err,
            ServiceError::Api { status: 500, ref message, .. } if message == "Internal Server Error"
        ));
    }

    /// Accept one HTTP request on a local port, answer with `response`, and
    /// hand back the raw request text.
    async fn serve_once(response: String) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 8192];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let len = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + len || n == 0 {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&buf).to_string()
        });
        (format!("http://{addr}/v1beta"), handle)
    }

    fn http_response(status: &str, extra: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n{extra}Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn service_at(base_url: &str) -> GeminiService {
        let config = GeminiConfig::builder()
            .base_url(base_url)
            .model("gemini-test")
            .timeout_secs(10)
            .build()
            .unwrap();
        GeminiService::new("test-key", config).unwrap()
    }

    #[tokio::test]
    async fn analyze_round_trip_against_local_server() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"[]"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":7,"candidatesTokenCount":1}}"#;
        let (base, server) = serve_once(http_response("200 OK", "", body)).await;

        let request = compose_request("x", asset("image/jpeg", "UExBTg=="), vec![]);
        let resp = service_at(&base).analyze(&request).await.unwrap();
        assert_eq!(resp.text, "[]");
        assert_eq!(resp.input_tokens, Some(7));

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /v1beta/models/gemini-test:generateContent"));
        assert!(raw.to_ascii_lowercase().contains("x-goog-api-key: test-key"));
        assert!(raw.contains("\"responseMimeType\":\"application/json\""));
    }

    #[tokio::test]
    async fn rate_limit_reads_retry_after() {
        let body = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        let (base, _server) =
            serve_once(http_response("429 Too Many Requests", "Retry-After: 42\r\n", body)).await;

        let request = compose_request("x", asset("image/jpeg", "UA=="), vec![]);
        let err = service_at(&base).analyze(&request).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::RateLimited {
                retry_after_secs: Some(42),
                ..
            }
        ));
    }

    #[test]
    fn debug_redacts_key() {
        let svc = GeminiService::new("secret-key", GeminiConfig::default()).unwrap();
        let dbg = format!("{svc:?}");
        assert!(!dbg.contains("secret-key"));
        assert_eq!(svc.name(), "gemini-2.5-pro");
        assert!(svc.endpoint().ends_with("/models/gemini-2.5-pro:generateContent"));
    }
}
