//! DataFrame Agent
//!
//! Answers questions about one dataset by letting the chat model call the
//! read-only tools in [`super::tools`] until it produces a final answer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::agents::tools::{parse_turn, ModelTurn, ToolCall, PROTOCOL};
use crate::agents::{Agent, AgentConfig};
use crate::dataset::Dataset;
use crate::llm::provider::LLM;
use crate::types::{AppError, AppResult, LLMMessage, LLMRequest};

pub struct DataFrameAgent {
    llm: LLM,
    dataset: Arc<Dataset>,
    config: AgentConfig,
    system_prompt: String,
}

impl DataFrameAgent {
    pub fn new(llm: LLM, dataset: Arc<Dataset>, config: AgentConfig, preview_rows: usize) -> Self {
        let system_prompt = Self::create_system_prompt(&dataset, preview_rows);
        Self {
            llm,
            dataset,
            config,
            system_prompt,
        }
    }

    fn create_system_prompt(dataset: &Dataset, preview_rows: usize) -> String {
        let (rows, cols) = dataset.shape();
        let schema = dataset
            .columns()
            .iter()
            .map(|c| format!("- {} ({})", c.name, c.kind.dtype()))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "You are a data analyst working with a table loaded from the file \"{name}\".\n\
             The table has {rows} rows and {cols} columns:\n{schema}\n\n\
             These are the first rows:\n{preview}\n\
             {protocol}",
            name = dataset.name(),
            rows = rows,
            cols = cols,
            schema = schema,
            preview = Dataset::render(&dataset.head(preview_rows)),
            protocol = PROTOCOL,
        )
    }

    fn log_step(&self, step: usize, action: &str, observation: &str) {
        if self.config.verbose {
            info!(step, action, observation = %truncate(observation, 500), "Agent step");
        } else {
            debug!(step, action, "Agent step");
        }
    }
}

#[async_trait]
impl Agent for DataFrameAgent {
    async fn answer(&self, query: &str) -> AppResult<String> {
        let mut messages = vec![LLMMessage::user(query)];

        for step in 1..=self.config.max_steps {
            let request = LLMRequest {
                model: self.config.model.clone(),
                messages: messages.clone(),
                max_tokens: Some(self.config.max_tokens),
                temperature: Some(self.config.temperature),
                system_instruction: Some(self.system_prompt.clone()),
            };
            let reply = self
                .llm
                .create_chat_completion(&request)
                .await
                .map_err(|e| AppError::Query(e.to_string()))?;

            let observation = match parse_turn(&reply.content) {
                ModelTurn::Call(ToolCall::FinalAnswer { answer }) => {
                    self.log_step(step, "final_answer", &answer);
                    return Ok(answer);
                }
                ModelTurn::Text(text) => {
                    if text.is_empty() {
                        return Err(AppError::Query("Model returned an empty answer".to_string()));
                    }
                    self.log_step(step, "text", &text);
                    return Ok(text);
                }
                ModelTurn::Call(call) => {
                    let observation = call.execute(&self.dataset);
                    self.log_step(step, call.name(), &observation);
                    observation
                }
                ModelTurn::Invalid(reason) => {
                    warn!(step, reason = %reason, "Model sent an invalid action");
                    format!("Error: invalid action ({}). Use one of the listed actions.", reason)
                }
            };

            messages.push(LLMMessage::assistant(reply.content));
            messages.push(LLMMessage::user(format!("Observation:\n{}", observation)));
        }

        Err(AppError::Query(format!(
            "Agent stopped after {} steps without a final answer",
            self.config.max_steps
        )))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::LLMAdapter;
    use crate::types::{LLMProvider, LLMResponse, TokenUsage};
    use std::sync::Mutex;

    /// Replays canned replies and records every request it sees.
    struct ScriptedAdapter {
        replies: Mutex<Vec<AppResult<String>>>,
        seen: Arc<Mutex<Vec<LLMRequest>>>,
    }

    #[async_trait]
    impl LLMAdapter for ScriptedAdapter {
        async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
            self.seen.lock().unwrap().push(request.clone());
            let next = self.replies.lock().unwrap().remove(0)?;
            Ok(LLMResponse {
                content: next,
                finish_reason: "STOP".to_string(),
                usage: TokenUsage::default(),
            })
        }
    }

    fn agent(replies: Vec<AppResult<String>>, max_steps: usize) -> (DataFrameAgent, Arc<Mutex<Vec<LLMRequest>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let adapter = ScriptedAdapter {
            replies: Mutex::new(replies),
            seen: seen.clone(),
        };
        let dataset = Arc::new(
            Dataset::from_csv_bytes("sales.csv", b"region,units\nnorth,10\nsouth,4\nnorth,6\n").unwrap(),
        );
        let config = AgentConfig {
            max_steps,
            ..AgentConfig::default()
        };
        let llm = LLM::from_adapter(LLMProvider::Google, Box::new(adapter));
        (DataFrameAgent::new(llm, dataset, config, 5), seen)
    }

    #[tokio::test]
    async fn test_tool_loop_feeds_observation_back() {
        let (agent, seen) = agent(
            vec![
                Ok(r#"{"action":"value_counts","column":"region"}"#.to_string()),
                Ok(r#"{"action":"final_answer","answer":"north appears most often"}"#.to_string()),
            ],
            4,
        );
        let answer = agent.answer("Which region is most common?").await.unwrap();
        assert_eq!(answer, "north appears most often");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        let system = seen[0].system_instruction.as_deref().unwrap();
        assert!(system.contains("sales.csv"));
        assert!(system.contains("units (int64)"));
        let observation = &seen[1].messages[2].content;
        assert!(observation.contains("north: 2"), "{}", observation);
    }

    #[tokio::test]
    async fn test_plain_text_is_final_answer() {
        let (agent, _) = agent(vec![Ok("There are 3 rows.".to_string())], 4);
        assert_eq!(agent.answer("How many rows?").await.unwrap(), "There are 3 rows.");
    }

    #[tokio::test]
    async fn test_step_limit_is_query_error() {
        let replies = (0..2).map(|_| Ok(r#"{"action":"shape"}"#.to_string())).collect();
        let (agent, _) = agent(replies, 2);
        let err = agent.answer("loop forever").await.unwrap_err();
        assert!(matches!(err, AppError::Query(ref m) if m.contains("2 steps")), "{:?}", err);
    }

    #[tokio::test]
    async fn test_llm_failure_is_query_error() {
        let (agent, _) = agent(vec![Err(AppError::LLMApi("quota exceeded".to_string()))], 3);
        let err = agent.answer("anything").await.unwrap_err();
        assert!(matches!(err, AppError::Query(ref m) if m.contains("quota exceeded")));
    }
}
