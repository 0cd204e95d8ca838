//! Agents
//!
//! Capability interface between a session and whatever answers questions
//! about its dataset. [`AgentFactory::construct`] builds a handle from a key,
//! a dataset and an [`AgentConfig`]; [`Agent::answer`] answers one query.
//!
//! - `dataframe` - the model-backed agent used in production
//! - `tools` - the read-only dataset operations that agent may call

pub mod dataframe;
pub mod tools;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::dataset::Dataset;
use crate::llm::provider::{LLMProviderConfig, LLM};
use crate::types::{AppError, AppResult, ApiKey, LLMProvider};

pub use dataframe::DataFrameAgent;

#[async_trait]
pub trait Agent: Send + Sync {
    async fn answer(&self, query: &str) -> AppResult<String>;
}

#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn construct(
        &self,
        api_key: &ApiKey,
        dataset: Arc<Dataset>,
        config: &AgentConfig,
    ) -> AppResult<Arc<dyn Agent>>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentConfig {
    pub model: String,
    pub temperature: f32,
    pub verbose: bool,
    pub max_steps: usize,
    pub max_tokens: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl AgentConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.llm.model.clone(),
            temperature: config.agent.temperature,
            verbose: config.agent.verbose,
            max_steps: config.agent.max_steps,
            max_tokens: config.agent.max_tokens,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(AppError::InvalidRequest(format!(
                "temperature must be within [0, 1], got {}",
                self.temperature
            )));
        }
        if self.model.trim().is_empty() {
            return Err(AppError::InvalidRequest("model must not be empty".to_string()));
        }
        if self.max_steps == 0 {
            return Err(AppError::InvalidRequest("max_steps must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Builds [`DataFrameAgent`]s backed by the configured provider.
pub struct LlmAgentFactory {
    provider: LLMProvider,
    base_url: Option<String>,
    verify_key: bool,
    preview_rows: usize,
}

impl LlmAgentFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            provider: config.llm.provider,
            base_url: config.llm.base_url.clone(),
            verify_key: config.agent.verify_key,
            preview_rows: config.agent.preview_rows,
        }
    }
}

#[async_trait]
impl AgentFactory for LlmAgentFactory {
    async fn construct(
        &self,
        api_key: &ApiKey,
        dataset: Arc<Dataset>,
        config: &AgentConfig,
    ) -> AppResult<Arc<dyn Agent>> {
        config.validate()?;
        if dataset.column_count() == 0 {
            return Err(AppError::InvalidRequest("dataset has no columns".to_string()));
        }

        let llm = LLM::new(LLMProviderConfig {
            provider: self.provider,
            api_key: api_key.clone(),
            base_url: self.base_url.clone(),
        })?;
        if self.verify_key {
            llm.verify_credentials(&config.model).await?;
        }

        info!(
            provider = %self.provider,
            model = %config.model,
            temperature = config.temperature,
            dataset = %dataset.name(),
            "Agent constructed"
        );
        Ok(Arc::new(DataFrameAgent::new(llm, dataset, config.clone(), self.preview_rows)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_temperature_range() {
        let mut config = AgentConfig::default();
        assert!(config.validate().is_ok());
        config.temperature = 1.5;
        assert!(matches!(config.validate(), Err(AppError::InvalidRequest(_))));
        config.temperature = -0.1;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_factory_surfaces_rejected_key() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/models/gemini-2.0-flash")
            .with_status(403)
            .with_body(r#"{"error":{"code":403,"message":"Permission denied","status":"PERMISSION_DENIED"}}"#)
            .create_async()
            .await;

        let mut config = Config::default();
        config.llm.base_url = Some(server.url());
        let factory = LlmAgentFactory::new(&config);
        let dataset = Arc::new(Dataset::from_csv_bytes("a.csv", b"x\n1\n").unwrap());
        let result = factory
            .construct(&ApiKey::new("nope").unwrap(), dataset, &AgentConfig::from_config(&config))
            .await;
        assert!(matches!(result, Err(AppError::Auth(_))));
    }

    #[tokio::test]
    async fn test_factory_without_verification_builds_handle() {
        let mut config = Config::default();
        config.agent.verify_key = false;
        let factory = LlmAgentFactory::new(&config);
        let dataset = Arc::new(Dataset::from_csv_bytes("a.csv", b"x\n1\n").unwrap());
        let result = factory
            .construct(&ApiKey::new("k").unwrap(), dataset, &AgentConfig::default())
            .await;
        assert!(result.is_ok());
    }
}
