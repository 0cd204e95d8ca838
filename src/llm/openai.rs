// OpenAI-compatible chat completions adapter
// Works against api.openai.com and any server exposing the same
// `/chat/completions` and `/models` routes (set LLM_BASE_URL).

use crate::llm::provider::{build_http_client, classify_failure, LLMAdapter};
use crate::types::{AppError, AppResult, ApiKey, LLMProvider, LLMRequest, LLMResponse, Role, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

pub struct OpenAIAdapter {
    client: Client,
    api_key: ApiKey,
    base_url: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

impl OpenAIAdapter {
    pub fn new(api_key: ApiKey, base_url: Option<&str>) -> AppResult<Self> {
        Ok(Self {
            client: build_http_client()?,
            api_key,
            base_url: base_url
                .unwrap_or(OPENAI_API_BASE)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn convert_request(request: &LLMRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_instruction {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(|m| ChatMessage {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: m.content.clone(),
        }));

        ChatRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        }
    }

    async fn failure(response: reqwest::Response) -> AppError {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorResponse>(&error_text) {
            Ok(parsed) => match parsed.error.code {
                Some(code) => format!("{} (code: {})", parsed.error.message, code),
                None => parsed.error.message,
            },
            Err(_) => error_text,
        };
        classify_failure(LLMProvider::OpenAI, status, &message)
    }
}

#[async_trait]
impl LLMAdapter for OpenAIAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %request.model, messages = request.messages.len(), "Sending chat completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose())
            .json(&Self::convert_request(request))
            .send()
            .await
            .map_err(|e| AppError::LLMApi(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLMApi(format!("Failed to parse OpenAI response: {}", e)))?;

        let choice = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LLMApi("OpenAI returned no choices".to_string()))?;

        Ok(LLMResponse {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage: chat
                .usage
                .map(|u| TokenUsage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                    total_tokens: u.total_tokens,
                })
                .unwrap_or_default(),
        })
    }

    async fn verify_credentials(&self, _model: &str) -> AppResult<()> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.api_key.expose())
            .send()
            .await
            .map_err(|e| AppError::Construction(format!("Could not reach OpenAI API: {}", e)))?;

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

    #[test]
    fn test_system_instruction_becomes_first_message() {
        let request = LLMRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![LLMMessage::user("hi")],
            max_tokens: None,
            temperature: Some(0.0),
            system_instruction: Some("sys".to_string()),
        };
        let body = serde_json::to_value(OpenAIAdapter::convert_request(&request)).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!(body.get("max_tokens").is_none());
    }

    #[tokio::test]
    async fn test_chat_completion_round_trip() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"42"},"finish_reason":"stop"}],"usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#)
            .create_async()
            .await;

        let adapter = OpenAIAdapter::new(ApiKey::new("sk-test").unwrap(), Some(&server.url())).unwrap();
        let request = LLMRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![LLMMessage::user("answer?")],
            max_tokens: Some(10),
            temperature: None,
            system_instruction: None,
        };
        let response = adapter.create_chat_completion(&request).await.unwrap();
        mock.assert_async().await;
        assert_eq!(response.content, "42");
        assert_eq!(response.usage.prompt_tokens, 3);
    }

    #[tokio::test]
    async fn test_unauthorized_is_auth_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/models")
            .with_status(401)
            .with_body(r#"{"error":{"message":"Incorrect API key provided","code":"invalid_api_key"}}"#)
            .create_async()
            .await;

        let adapter = OpenAIAdapter::new(ApiKey::new("sk-bad").unwrap(), Some(&server.url())).unwrap();
        assert!(matches!(
            adapter.verify_credentials("gpt-4o-mini").await,
            Err(AppError::Auth(_))
        ));
    }
}
