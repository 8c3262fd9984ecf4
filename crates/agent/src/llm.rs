use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::warn;

use casedesk_core::config::{LlmConfig, LlmProvider};
use casedesk_messaging::RetryPolicy;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system: &str, user: &str) -> Result<String>;

    /// False when every call is known to fail, so callers can skip straight to a fallback.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Generator used when no provider is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _system: &str, _user: &str) -> Result<String> {
        bail!("text generation is disabled")
    }

    fn is_configured(&self) -> bool {
        false
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

enum Attempt {
    Retry(anyhow::Error),
    Stop(anyhow::Error),
}

/// Client for `/chat/completions` on OpenAI or any API speaking the same protocol.
pub struct OpenAiCompatibleGenerator {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    max_tokens: u32,
    policy: RetryPolicy,
}

impl std::fmt::Debug for OpenAiCompatibleGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleGenerator")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatibleGenerator {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let default_base = match config.provider {
            LlmProvider::Ollama => OLLAMA_BASE_URL,
            LlmProvider::OpenAi | LlmProvider::Disabled => OPENAI_BASE_URL,
        };
        let base_url = config
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(default_base)
            .trim_end_matches('/')
            .to_string();
        let api_key =
            config.api_key.clone().filter(|key| !key.expose_secret().trim().is_empty());
        if config.provider == LlmProvider::OpenAi && api_key.is_none() {
            bail!("llm.api_key is required for the openai provider");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("failed to build http client for text generation")?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            policy: RetryPolicy::with_max_retries(config.max_retries),
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn attempt(&self, system: &str, user: &str) -> std::result::Result<String, Attempt> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            max_tokens: self.max_tokens,
        };
        let mut builder = self.client.post(self.completions_url()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|error| Attempt::Retry(anyhow!("completion request failed: {error}")))?;
        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(Attempt::Retry(anyhow!("completion endpoint returned {status}")));
        }
        if !status.is_success() {
            return Err(Attempt::Stop(anyhow!("completion endpoint returned {status}")));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|error| Attempt::Stop(anyhow!("failed to decode completion: {error}")))?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| Attempt::Stop(anyhow!("completion response had no content")))
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let attempts = self.policy.total_attempts();
        let mut last_error = anyhow!("no completion attempt was made");
        for attempt in 0..attempts {
            match self.attempt(system, user).await {
                Ok(text) => return Ok(text),
                Err(Attempt::Stop(error)) => return Err(error),
                Err(Attempt::Retry(error)) => {
                    warn!(
                        event_name = "agent.llm.retry",
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        error = %error,
                        "text generation attempt failed"
                    );
                    last_error = error;
                    if attempt + 1 < attempts {
                        let delay = self.policy.backoff(attempt);
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }
        Err(last_error)
    }
}

pub fn generator_from_config(config: &LlmConfig) -> Result<Arc<dyn TextGenerator>> {
    match config.provider {
        LlmProvider::Disabled => Ok(Arc::new(DisabledGenerator)),
        LlmProvider::OpenAi | LlmProvider::Ollama => {
            Ok(Arc::new(OpenAiCompatibleGenerator::from_config(config)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use casedesk_core::config::{LlmConfig, LlmProvider};
    use secrecy::SecretString;

    use super::{generator_from_config, DisabledGenerator, OpenAiCompatibleGenerator, TextGenerator};

    fn config(provider: LlmProvider) -> LlmConfig {
        LlmConfig {
            provider,
            api_key: None,
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 5,
            max_retries: 1,
            max_tokens: 340,
        }
    }

    #[tokio::test]
    async fn disabled_generator_always_errors() {
        let generator = DisabledGenerator;
        assert!(!generator.is_configured());
        assert!(generator.generate("system", "user").await.is_err());
    }

    #[test]
    fn openai_requires_a_key() {
        assert!(OpenAiCompatibleGenerator::from_config(&config(LlmProvider::OpenAi)).is_err());

        let mut with_key = config(LlmProvider::OpenAi);
        with_key.api_key = Some(SecretString::from("sk-test".to_string()));
        let generator = OpenAiCompatibleGenerator::from_config(&with_key).expect("generator");
        assert_eq!(generator.completions_url(), "https://api.openai.com/v1/chat/completions");
        assert!(!format!("{generator:?}").contains("sk-test"));
    }

    #[test]
    fn ollama_defaults_to_the_local_endpoint_without_a_key() {
        let generator =
            OpenAiCompatibleGenerator::from_config(&config(LlmProvider::Ollama)).expect("ollama");
        assert_eq!(generator.completions_url(), "http://localhost:11434/v1/chat/completions");

        let mut custom = config(LlmProvider::Ollama);
        custom.base_url = Some("http://gpu-box:8000/v1/".to_string());
        let generator = OpenAiCompatibleGenerator::from_config(&custom).expect("custom");
        assert_eq!(generator.completions_url(), "http://gpu-box:8000/v1/chat/completions");
    }

    #[test]
    fn factory_picks_the_disabled_generator() {
        let generator = generator_from_config(&config(LlmProvider::Disabled)).expect("factory");
        assert!(!generator.is_configured());
    }
}
