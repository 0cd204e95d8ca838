use std::sync::Arc;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::agents::{AgentConfig, AgentFactory, LlmAgentFactory};
use crate::config::Config;
use crate::dataset::DatasetInfo;
use crate::session::{AgentStatus, SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sessions: SessionStore,
    pub agent_factory: Arc<dyn AgentFactory>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let agent_factory = Arc::new(LlmAgentFactory::new(&config));
        Self::with_factory(config, agent_factory)
    }

    pub fn with_factory(config: Config, agent_factory: Arc<dyn AgentFactory>) -> Self {
        Self {
            config,
            sessions: SessionStore::default(),
            agent_factory,
        }
    }

    /// Factory to use for automatic initialization, if enabled.
    pub fn auto_init_factory(&self) -> Option<&dyn AgentFactory> {
        if self.config.agent.auto_initialize {
            Some(self.agent_factory.as_ref())
        } else {
            None
        }
    }

    pub fn default_agent_config(&self) -> AgentConfig {
        AgentConfig::from_config(&self.config)
    }
}

// API Request/Response types

#[derive(Debug, Deserialize)]
pub struct ApiKeyRequest {
    /// Empty clears the key.
    pub api_key: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct InitializeAgentRequest {
    #[validate(length(min = 1, max = 100))]
    pub model: Option<String>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub temperature: Option<f32>,
    pub verbose: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, max = 10000))]
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct RowsQuery {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub dataset: DatasetInfo,
    pub agent: AgentStatus,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub sessions: usize,
}
