use async_trait::async_trait;
use crate::types::{AppError, AppResult, ApiKey, LLMProvider, LLMRequest, LLMResponse};

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;

    /// Cheap authenticated call used to reject a bad key before the first query.
    async fn verify_credentials(&self, _model: &str) -> AppResult<()> {
        Ok(())
    }
}

/// Configuration for LLM provider (renamed to avoid conflict with LLMProvider enum in types.rs)
#[derive(Debug, Clone)]
pub struct LLMProviderConfig {
    pub provider: LLMProvider,
    pub api_key: ApiKey,
    pub base_url: Option<String>,
}

pub struct LLM {
    adapter: Box<dyn LLMAdapter>,
    provider: LLMProvider,
}

impl LLM {
    pub fn new(config: LLMProviderConfig) -> AppResult<Self> {
        let adapter: Box<dyn LLMAdapter> = match config.provider {
            LLMProvider::Google => Box::new(crate::llm::google::GoogleAdapter::new(
                config.api_key,
                config.base_url.as_deref(),
            )?),
            LLMProvider::OpenAI => Box::new(crate::llm::openai::OpenAIAdapter::new(
                config.api_key,
                config.base_url.as_deref(),
            )?),
        };

        Ok(Self {
            adapter,
            provider: config.provider,
        })
    }

    /// Wrap an existing adapter, e.g. a scripted one in tests.
    pub fn from_adapter(provider: LLMProvider, adapter: Box<dyn LLMAdapter>) -> Self {
        Self { adapter, provider }
    }

    pub fn provider(&self) -> LLMProvider {
        self.provider
    }

    pub async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.adapter.create_chat_completion(request).await
    }

    pub async fn verify_credentials(&self, model: &str) -> AppResult<()> {
        self.adapter.verify_credentials(model).await
    }
}

pub(crate) fn build_http_client() -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("tabletalk/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::Construction(format!("Failed to build HTTP client: {}", e)))
}

/// Map a non-success provider response onto the error taxonomy.
pub(crate) fn classify_failure(provider: LLMProvider, status: reqwest::StatusCode, message: &str) -> AppError {
    let lower = message.to_lowercase();
    let key_problem = lower.contains("api key") || lower.contains("api_key") || lower.contains("unauthenticated");
    if status == reqwest::StatusCode::UNAUTHORIZED
        || status == reqwest::StatusCode::FORBIDDEN
        || (status == reqwest::StatusCode::BAD_REQUEST && key_problem)
    {
        AppError::Auth(format!("{} rejected the API key ({}): {}", provider, status, message))
    } else {
        AppError::LLMApi(format!("{} API error ({}): {}", provider, status, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure(LLMProvider::Google, StatusCode::BAD_REQUEST, "API key not valid. Please pass a valid API key."),
            AppError::Auth(_)
        ));
        assert!(matches!(
            classify_failure(LLMProvider::OpenAI, StatusCode::UNAUTHORIZED, "Incorrect key"),
            AppError::Auth(_)
        ));
        assert!(matches!(
            classify_failure(LLMProvider::Google, StatusCode::BAD_REQUEST, "Invalid JSON payload"),
            AppError::LLMApi(_)
        ));
        assert!(matches!(
            classify_failure(LLMProvider::Google, StatusCode::TOO_MANY_REQUESTS, "quota"),
            AppError::LLMApi(_)
        ));
    }
}
