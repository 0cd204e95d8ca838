//! Sessions
//!
//! One [`Session`] per client holds the key, the dataset, the agent handle
//! and the history. Every mutating action takes the session's action lock,
//! so actions run one at a time in submission order; reads only take the
//! state lock and never wait on a remote call.

pub mod history;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::agents::{Agent, AgentConfig, AgentFactory};
use crate::dataset::{Dataset, DatasetInfo, RowsPage};
use crate::types::{AppError, AppResult, ApiKey};

pub use history::{EntryStatus, History, HistoryEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    /// Pre-populated from the server environment.
    Environment,
    /// Entered by the user.
    User,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentStatus {
    NotInitialized { missing: Vec<&'static str> },
    Ready { config: AgentConfig, built_at: DateTime<Utc> },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct KeySummary {
    pub masked: String,
    pub source: KeySource,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub api_key: Option<KeySummary>,
    pub dataset: Option<DatasetInfo>,
    pub agent: AgentStatus,
    pub agent_config: AgentConfig,
    pub history_len: usize,
    pub busy: bool,
}

struct AgentSlot {
    handle: Arc<dyn Agent>,
    config: AgentConfig,
    built_at: DateTime<Utc>,
}

struct SessionState {
    api_key: Option<(ApiKey, KeySource)>,
    dataset: Option<Arc<Dataset>>,
    agent: Option<AgentSlot>,
    agent_error: Option<String>,
    agent_config: AgentConfig,
    history: History,
}

impl SessionState {
    fn invalidate_agent(&mut self, reason: &str) {
        if self.agent.take().is_some() {
            info!(reason, "Agent invalidated");
        }
        self.agent_error = None;
    }

    fn agent_status(&self) -> AgentStatus {
        if let Some(slot) = &self.agent {
            return AgentStatus::Ready {
                config: slot.config.clone(),
                built_at: slot.built_at,
            };
        }
        if let Some(error) = &self.agent_error {
            return AgentStatus::Failed { error: error.clone() };
        }
        let mut missing = Vec::new();
        if self.api_key.is_none() {
            missing.push("api_key");
        }
        if self.dataset.is_none() {
            missing.push("dataset");
        }
        AgentStatus::NotInitialized { missing }
    }
}

pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    last_active: std::sync::Mutex<Instant>,
    state: Arc<RwLock<SessionState>>,
    actions: Arc<Mutex<()>>,
}

impl Session {
    pub fn new(fallback_key: Option<ApiKey>, agent_config: AgentConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            last_active: std::sync::Mutex::new(Instant::now()),
            state: Arc::new(RwLock::new(SessionState {
                api_key: fallback_key.map(|k| (k, KeySource::Environment)),
                dataset: None,
                agent: None,
                agent_error: None,
                agent_config,
                history: History::default(),
            })),
            actions: Arc::new(Mutex::new(())),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn touch(&self) {
        if let Ok(mut last) = self.last_active.lock() {
            *last = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_active
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default()
    }

    pub async fn summary(&self) -> SessionSummary {
        let state = self.state.read().await;
        SessionSummary {
            id: self.id,
            created_at: self.created_at,
            api_key: state.api_key.as_ref().map(|(key, source)| KeySummary {
                masked: key.masked(),
                source: *source,
            }),
            dataset: state.dataset.as_ref().map(|d| d.info()),
            agent: state.agent_status(),
            agent_config: state.agent_config.clone(),
            history_len: state.history.len(),
            busy: state.history.has_pending(),
        }
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.state.read().await.history.entries().to_vec()
    }

    pub async fn rows(&self, offset: usize, limit: usize) -> AppResult<RowsPage> {
        let state = self.state.read().await;
        let dataset = state
            .dataset
            .as_ref()
            .ok_or_else(|| AppError::NotFound("no dataset uploaded".to_string()))?;
        Ok(dataset.slice(offset, limit))
    }

    /// Replace (or clear) the key. Any existing agent is dropped; with a
    /// factory the agent is rebuilt when a dataset is present.
    pub async fn set_api_key(
        &self,
        key: Option<ApiKey>,
        auto_init: Option<&dyn AgentFactory>,
    ) -> AgentStatus {
        let _turn = self.actions.lock().await;
        {
            let mut state = self.state.write().await;
            state.api_key = key.map(|k| (k, KeySource::User));
            state.invalidate_agent("api key changed");
            debug!(session = %self.id, has_key = state.api_key.is_some(), "API key updated");
        }
        if let Some(factory) = auto_init {
            self.build_agent_if_ready(factory).await;
        }
        self.state.read().await.agent_status()
    }

    /// Parse and install a new dataset. On a parse failure the previous
    /// dataset and agent stay as they were.
    pub async fn load_dataset(
        &self,
        name: String,
        bytes: Vec<u8>,
        auto_init: Option<&dyn AgentFactory>,
    ) -> AppResult<(DatasetInfo, AgentStatus)> {
        let _turn = self.actions.lock().await;
        let dataset = tokio::task::spawn_blocking(move || Dataset::from_csv_bytes(&name, &bytes))
            .await
            .map_err(|e| AppError::Internal(format!("dataset parser panicked: {}", e)))??;
        let info = dataset.info();
        {
            let mut state = self.state.write().await;
            state.dataset = Some(Arc::new(dataset));
            state.invalidate_agent("dataset replaced");
        }
        if let Some(factory) = auto_init {
            self.build_agent_if_ready(factory).await;
        }
        Ok((info, self.state.read().await.agent_status()))
    }

    /// Build the agent from the current key and dataset. `config` replaces
    /// the session's agent settings when given.
    pub async fn initialize_agent(
        &self,
        factory: &dyn AgentFactory,
        config: Option<AgentConfig>,
    ) -> AppResult<AgentStatus> {
        let _turn = self.actions.lock().await;
        if let Some(config) = &config {
            config.validate()?;
        }
        {
            let mut state = self.state.write().await;
            if state.api_key.is_none() {
                return Err(AppError::InvalidRequest("an API key is required".to_string()));
            }
            if state.dataset.is_none() {
                return Err(AppError::InvalidRequest("a dataset is required".to_string()));
            }
            if let Some(config) = config {
                state.agent_config = config;
            }
        }
        self.build_agent(factory).await?;
        Ok(self.state.read().await.agent_status())
    }

    async fn build_agent_if_ready(&self, factory: &dyn AgentFactory) {
        let ready = {
            let state = self.state.read().await;
            state.api_key.is_some() && state.dataset.is_some()
        };
        if ready {
            // failure is recorded in the agent status
            let _ = self.build_agent(factory).await;
        }
    }

    /// Caller must hold the action lock.
    async fn build_agent(&self, factory: &dyn AgentFactory) -> AppResult<()> {
        let (key, dataset, config) = {
            let state = self.state.read().await;
            match (&state.api_key, &state.dataset) {
                (Some((key, _)), Some(dataset)) => {
                    (key.clone(), dataset.clone(), state.agent_config.clone())
                }
                _ => return Err(AppError::InvalidRequest("an API key and a dataset are required".to_string())),
            }
        };

        let result = factory.construct(&key, dataset, &config).await;
        let mut state = self.state.write().await;
        match result {
            Ok(handle) => {
                state.agent = Some(AgentSlot {
                    handle,
                    config,
                    built_at: Utc::now(),
                });
                state.agent_error = None;
                info!(session = %self.id, "Agent initialized");
                Ok(())
            }
            Err(e) => {
                // a failed build never leaves an older handle in place
                state.agent = None;
                state.agent_error = Some(e.to_string());
                warn!(session = %self.id, error = %e, "Agent initialization failed");
                Err(e)
            }
        }
    }

    /// Send a query to the current agent and record the outcome.
    ///
    /// The answer runs on its own task, which owns the action lock and
    /// resolves the entry, so dropping this future never strands a
    /// `Pending` entry.
    pub async fn dispatch_query(&self, query: &str) -> AppResult<HistoryEntry> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidRequest("query must not be empty".to_string()));
        }

        let turn = self.actions.clone().lock_owned().await;
        let (agent, id) = {
            let mut state = self.state.write().await;
            let agent = state
                .agent
                .as_ref()
                .map(|slot| slot.handle.clone())
                .ok_or(AppError::NoAgent)?;
            let id = state.history.begin(query)?;
            (agent, id)
        };

        info!(session = %self.id, entry = id, query_len = query.len(), "Dispatching query");
        let session = self.id;
        let state = self.state.clone();
        let query = query.to_string();
        let task = tokio::spawn(async move {
            let _turn = turn;
            let started = Instant::now();
            let outcome = agent.answer(&query).await.map_err(|e| e.to_string());
            match &outcome {
                Ok(_) => info!(session = %session, entry = id, elapsed_ms = started.elapsed().as_millis() as u64, "Query answered"),
                Err(e) => warn!(session = %session, entry = id, error = %e, "Query failed"),
            }
            state.write().await.history.resolve(id, outcome)
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!(session = %self.id, entry = id, error = %e, "Query task aborted");
                self.state
                    .write()
                    .await
                    .history
                    .resolve(id, Err(format!("query task aborted: {}", e)))
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, Arc<Session>>>>,
}

impl SessionStore {
    pub async fn create(&self, fallback_key: Option<ApiKey>, agent_config: AgentConfig) -> Arc<Session> {
        let session = Arc::new(Session::new(fallback_key, agent_config));
        self.inner.write().await.insert(session.id(), session.clone());
        info!(session = %session.id(), "Session created");
        session
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Arc<Session>> {
        let guard = self.inner.read().await;
        let session = guard
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("session {}", id)))?;
        session.touch();
        Ok(session)
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.inner.write().await.remove(&id).is_some();
        if removed {
            info!(session = %id, "Session discarded");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Drop sessions idle for longer than `ttl`. Returns how many went.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|_, session| session.idle_for() <= ttl);
        let evicted = before - guard.len();
        if evicted > 0 {
            info!(evicted, remaining = guard.len(), "Evicted idle sessions");
        }
        evicted
    }

    pub fn spawn_idle_sweeper(&self, ttl: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        let period = (ttl / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                store.evict_idle(ttl).await;
            }
        })
    }
}
