// Google Gemini adapter
// API Reference: https://ai.google.dev/api/generate-content
//
// The key travels in the `x-goog-api-key` header rather than the query
// string so it never shows up in request logs.

use crate::llm::provider::{build_http_client, classify_failure, LLMAdapter};
use crate::types::{AppError, AppResult, ApiKey, LLMProvider, LLMRequest, LLMResponse, Role, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const GOOGLE_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GoogleAdapter {
    client: Client,
    api_key: ApiKey,
    base_url: String,
}

// Request types for the Gemini API
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

// Response types for the Gemini API
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Deserialize)]
struct GeminiError {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GoogleAdapter {
    pub fn new(api_key: ApiKey, base_url: Option<&str>) -> AppResult<Self> {
        Ok(Self {
            client: build_http_client()?,
            api_key,
            base_url: base_url
                .unwrap_or(GOOGLE_API_BASE)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn convert_request(request: &LLMRequest) -> GeminiRequest {
        let contents = request
            .messages
            .iter()
            .map(|m| GeminiContent {
                role: Some(
                    match m.role {
                        Role::User => "user",
                        Role::Assistant => "model",
                    }
                    .to_string(),
                ),
                parts: vec![GeminiPart { text: m.content.clone() }],
            })
            .collect();

        GeminiRequest {
            contents,
            system_instruction: request.system_instruction.as_ref().map(|text| GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: text.clone() }],
            }),
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        }
    }

    async fn failure(response: reqwest::Response) -> AppError {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<GeminiErrorResponse>(&error_text) {
            Ok(parsed) => match parsed.error.status {
                Some(code) => format!("{} ({})", parsed.error.message, code),
                None => parsed.error.message,
            },
            Err(_) => error_text,
        };
        classify_failure(LLMProvider::Google, status, &message)
    }
}

#[async_trait]
impl LLMAdapter for GoogleAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);
        let body = Self::convert_request(request);
        debug!(model = %request.model, messages = request.messages.len(), "Sending Gemini request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::LLMApi(format!("Gemini request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let gemini: GeminiResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLMApi(format!("Failed to parse Gemini response: {}", e)))?;

        let candidate = match gemini.candidates.into_iter().next() {
            Some(candidate) => candidate,
            None => {
                let reason = gemini
                    .prompt_feedback
                    .and_then(|f| f.block_reason)
                    .unwrap_or_else(|| "no candidates returned".to_string());
                return Err(AppError::LLMApi(format!("Gemini returned no answer: {}", reason)));
            }
        };

        let finish_reason = candidate.finish_reason.unwrap_or_else(|| "STOP".to_string());
        let content: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<Vec<_>>().join(""))
            .unwrap_or_default();
        if content.is_empty() && finish_reason != "STOP" {
            return Err(AppError::LLMApi(format!(
                "Gemini stopped without content (finish reason: {})",
                finish_reason
            )));
        }

        let usage = gemini
            .usage_metadata
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content,
            finish_reason,
            usage,
        })
    }

    async fn verify_credentials(&self, model: &str) -> AppResult<()> {
        let url = format!("{}/models/{}", self.base_url, model);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", self.api_key.expose())
            .send()
            .await
            .map_err(|e| AppError::Construction(format!("Could not reach Gemini API: {}", e)))?;

        if response.status().is_success() {
            return Ok(());
        }
        match Self::failure(response).await {
            AppError::Auth(msg) => Err(AppError::Auth(msg)),
            other => Err(AppError::Construction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LLMMessage;

    fn request() -> LLMRequest {
        LLMRequest {
            model: "gemini-2.0-flash".to_string(),
            messages: vec![LLMMessage::user("How many rows?"), LLMMessage::assistant("{}")],
            max_tokens: Some(256),
            temperature: Some(0.1),
            system_instruction: Some("You analyse tables.".to_string()),
        }
    }

    #[test]
    fn test_request_conversion() {
        let body = serde_json::to_value(GoogleAdapter::convert_request(&request())).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You analyse tables.");
        assert!(body["systemInstruction"].get("role").is_none());
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
    }

    #[tokio::test]
    async fn test_generate_content_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-2.0-flash:generateContent")
            .match_header("x-goog-api-key", "test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"There are "},{"text":"150 rows."}]},"finishReason":"STOP"}],
                   "usageMetadata":{"promptTokenCount":12,"candidatesTokenCount":4,"totalTokenCount":16}}"#,
            )
            .create_async()
            .await;

        let adapter = GoogleAdapter::new(ApiKey::new("test-key").unwrap(), Some(&server.url())).unwrap();
        let response = adapter.create_chat_completion(&request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "There are 150 rows.");
        assert_eq!(response.usage.total_tokens, 16);
    }

    #[tokio::test]
    async fn test_invalid_key_is_auth_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/models/gemini-2.0-flash")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#)
            .create_async()
            .await;

        let adapter = GoogleAdapter::new(ApiKey::new("bad").unwrap(), Some(&server.url())).unwrap();
        let err = adapter.verify_credentials("gemini-2.0-flash").await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_blocked_prompt_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-2.0-flash:generateContent")
            .with_status(200)
            .with_body(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#)
            .create_async()
            .await;

        let adapter = GoogleAdapter::new(ApiKey::new("k").unwrap(), Some(&server.url())).unwrap();
        let err = adapter.create_chat_completion(&request()).await.unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }
}
