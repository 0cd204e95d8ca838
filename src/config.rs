use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::types::{ApiKey, LLMProvider};

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LLMConfig,
    pub agent: AgentDefaults,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub model: String,
    /// Overrides the provider's public endpoint (proxies, tests).
    pub base_url: Option<String>,
    /// Server-side key that pre-populates new sessions.
    pub fallback_api_key: Option<ApiKey>,
}

#[derive(Debug, Clone)]
pub struct AgentDefaults {
    pub temperature: f32,
    pub verbose: bool,
    pub max_steps: usize,
    pub max_tokens: u32,
    pub preview_rows: usize,
    pub auto_initialize: bool,
    pub verify_key: bool,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub idle_timeout_secs: u64,
    pub upload_max_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: Option<PathBuf>,
}

pub const DEFAULT_GOOGLE_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 3000,
                host: "0.0.0.0".to_string(),
                cors_allowed_origins: vec!["http://localhost:3000".to_string()],
            },
            llm: LLMConfig {
                provider: LLMProvider::Google,
                model: DEFAULT_GOOGLE_MODEL.to_string(),
                base_url: None,
                fallback_api_key: None,
            },
            agent: AgentDefaults {
                temperature: 0.1,
                verbose: true,
                max_steps: 6,
                max_tokens: 2048,
                preview_rows: 5,
                auto_initialize: true,
                verify_key: true,
            },
            session: SessionConfig {
                idle_timeout_secs: 3600,
                upload_max_bytes: 25 * 1024 * 1024,
            },
            logging: LoggingConfig { log_dir: None },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Config::default();

        let provider = match env::var("LLM_PROVIDER") {
            Ok(raw) => LLMProvider::from_id(&raw)
                .with_context(|| format!("Unsupported LLM_PROVIDER: {}", raw))?,
            Err(_) => defaults.llm.provider,
        };
        let default_model = match provider {
            LLMProvider::Google => DEFAULT_GOOGLE_MODEL,
            LLMProvider::OpenAI => DEFAULT_OPENAI_MODEL,
        };
        let fallback_api_key = env::var("LLM_API_KEY")
            .ok()
            .or_else(|| match provider {
                LLMProvider::Google => env::var("GOOGLE_API_KEY").ok(),
                LLMProvider::OpenAI => env::var("OPENAI_API_KEY").ok(),
            })
            .and_then(ApiKey::new);

        let temperature: f32 = parse_var("AGENT_TEMPERATURE", defaults.agent.temperature)?;
        if !(0.0..=1.0).contains(&temperature) {
            anyhow::bail!("AGENT_TEMPERATURE must be within [0, 1], got {}", temperature);
        }

        Ok(Self {
            server: ServerConfig {
                port: parse_var("PORT", defaults.server.port)?,
                host: env::var("HOST").unwrap_or(defaults.server.host),
                cors_allowed_origins: parse_origins(
                    env::var("ALLOWED_ORIGINS").ok(),
                    defaults.server.cors_allowed_origins,
                ),
            },
            llm: LLMConfig {
                provider,
                model: env::var("LLM_MODEL").unwrap_or_else(|_| default_model.to_string()),
                base_url: env::var("LLM_BASE_URL").ok().filter(|s| !s.trim().is_empty()),
                fallback_api_key,
            },
            agent: AgentDefaults {
                temperature,
                verbose: parse_var("AGENT_VERBOSE", defaults.agent.verbose)?,
                max_steps: parse_var("AGENT_MAX_STEPS", defaults.agent.max_steps)?,
                max_tokens: parse_var("AGENT_MAX_TOKENS", defaults.agent.max_tokens)?,
                preview_rows: parse_var("AGENT_PREVIEW_ROWS", defaults.agent.preview_rows)?,
                auto_initialize: parse_var("AGENT_AUTO_INIT", defaults.agent.auto_initialize)?,
                verify_key: parse_var("AGENT_VERIFY_KEY", defaults.agent.verify_key)?,
            },
            session: SessionConfig {
                idle_timeout_secs: parse_var(
                    "SESSION_IDLE_TIMEOUT_SECS",
                    defaults.session.idle_timeout_secs,
                )?,
                upload_max_bytes: parse_var("UPLOAD_MAX_BYTES", defaults.session.upload_max_bytes)?,
            },
            logging: LoggingConfig {
                log_dir: env::var("LOG_DIR").ok().map(PathBuf::from),
            },
        })
    }
}

/// Comma-separated origin list; unset keeps the defaults.
fn parse_origins(raw: Option<String>, default: Vec<String>) -> Vec<String> {
    match raw {
        Some(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => default,
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.llm.provider, LLMProvider::Google);
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert!((config.agent.temperature - 0.1).abs() < f32::EPSILON);
        assert!(config.agent.auto_initialize);
        assert!(config.llm.fallback_api_key.is_none());
    }

    #[test]
    fn test_parse_var_falls_back_when_unset() {
        let value: u16 = parse_var("TABLETALK_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_origins_default_and_override() {
        let defaults = Config::default().server.cors_allowed_origins;
        assert_eq!(parse_origins(None, defaults.clone()), vec!["http://localhost:3000".to_string()]);
        assert_eq!(
            parse_origins(Some("https://a.example, ,https://b.example".to_string()), defaults),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}
