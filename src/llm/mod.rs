// LLM abstraction layer

pub mod provider;
pub mod google;
pub mod openai;

pub use provider::*;
pub use crate::types::{LLMMessage, LLMProvider, LLMRequest, LLMResponse, Role, TokenUsage};
