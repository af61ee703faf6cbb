use anyhow::{anyhow, Result};
use std::env;

use leadnav_llm::LlmProvider;

#[derive(Debug, Clone)]
pub struct LeadNavConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub top_k: usize,
}

impl LeadNavConfig {
    pub fn from_env() -> Result<Self> {
        let provider_name = env::var("LEADNAV_PROVIDER").unwrap_or_else(|_| "gemini".to_string());
        let provider = LlmProvider::from_str(&provider_name)
            .ok_or_else(|| anyhow!(format!("unknown provider {provider_name}")))?;
        let model =
            env::var("LEADNAV_MODEL").unwrap_or_else(|_| default_model(provider).to_string());
        let top_k = env::var("LEADNAV_TOP_K")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        Ok(Self {
            provider,
            model,
            top_k,
        })
    }

    /// Effective snippet count: an explicit flag beats the env default.
    pub fn top_k_or(&self, flag: Option<usize>) -> usize {
        flag.unwrap_or(self.top_k)
    }
}

fn default_model(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::Gemini => "gemini-1.5-flash",
        LlmProvider::OpenAi => "gpt-4o-mini",
        LlmProvider::Local => "local",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_is_the_default_provider() {
        assert_eq!(default_model(LlmProvider::Gemini), "gemini-1.5-flash");
    }

    #[test]
    fn cli_flag_overrides_env_top_k() {
        let config = LeadNavConfig {
            provider: LlmProvider::Local,
            model: "local".to_string(),
            top_k: 8,
        };
        assert_eq!(config.top_k_or(None), 8);
        assert_eq!(config.top_k_or(Some(3)), 3);
    }
}
