use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::{
    completion::{CompletionClient, parse_json_content},
    error::CompletionError,
};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Missing API key for {provider_name}: {env_var} environment variable is not set")]
    MissingApiKey {
        provider_name: String,
        env_var: String,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Provider {
    #[default]
    Grok,
    Openai,
    Gemini,
}

pub struct ProviderConfig {
    pub api_url: &'static str,
    pub model: &'static str,
    pub env_var: &'static str,
}

impl Provider {
    pub fn config(&self) -> ProviderConfig {
        match self {
            Provider::Grok => ProviderConfig {
                api_url: "https://api.x.ai/v1/chat/completions",
                model: "grok-4-fast",
                env_var: "XAI_API_KEY",
            },
            Provider::Openai => ProviderConfig {
                api_url: "https://api.openai.com/v1/chat/completions",
                model: "gpt-5.1",
                env_var: "OPENAI_API_KEY",
            },
            Provider::Gemini => ProviderConfig {
                api_url: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions",
                model: "gemini-3-pro",
                env_var: "GEMINI_API_KEY",
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Grok => "Grok",
            Provider::Openai => "OpenAI",
            Provider::Gemini => "Gemini",
        }
    }

    /// Validate that the API key is set for this provider
    pub fn validate_api_key(&self) -> Result<String, ProviderError> {
        let config = self.config();
        std::env::var(config.env_var)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ProviderError::MissingApiKey {
                provider_name: self.name().to_string(),
                env_var: config.env_var.to_string(),
            })
    }
}

/// OpenAI-compatible `/chat/completions` client that asks for a JSON object reply.
pub struct ChatCompletionClient {
    provider: Provider,
    api_key: String,
    http: reqwest::Client,
}

impl ChatCompletionClient {
    pub fn new(provider: Provider) -> Result<Self, ProviderError> {
        let api_key = provider.validate_api_key()?;
        Ok(Self {
            provider,
            api_key,
            http: reqwest::Client::new(),
        })
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }
}

#[async_trait]
impl CompletionClient for ChatCompletionClient {
    fn model(&self) -> &str {
        self.provider.config().model
    }

    async fn complete(&self, prompt: &str, temperature: f32) -> Result<Value, CompletionError> {
        let config = self.provider.config();
        debug!(
            provider = self.provider.name(),
            model = config.model,
            prompt_chars = prompt.len(),
            temperature,
            "sending completion request"
        );

        let response = self
            .http
            .post(config.api_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": config.model,
                "messages": [
                    {
                        "role": "user",
                        "content": prompt,
                    },
                ],
                "response_format": { "type": "json_object" },
                "temperature": temperature,
            }))
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| CompletionError::InvalidApiResponse(response.clone()))?;

        parse_json_content(content)
    }
}
