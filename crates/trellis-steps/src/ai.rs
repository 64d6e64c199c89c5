//! AI caller step.
//!
//! Treats the AI provider as an external dependency behind the step
//! contract. The "mock" provider echoes the prompt and exists so
//! workflows can run without network access or credentials.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::time::Duration;

use trellis_core::{
    AiConfig, ErrorClass, ExecutionContext, StepError, StepExecutor, StepMetadata, StepResult,
};

const DEFAULT_PROVIDER: &str = "mock";
const DEFAULT_MODEL: &str = "mock-1";
const DEFAULT_AI_TIMEOUT_SECS: u64 = 30;
const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Executes a prompt against the configured provider, applying output
/// guardrails before reporting success.
#[derive(Debug)]
pub struct AiStep {
    config: AiConfig,
    client: reqwest::Client,
}

impl AiStep {
    pub fn new(config: AiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn provider(&self) -> &str {
        self.config.provider.as_deref().unwrap_or(DEFAULT_PROVIDER)
    }

    fn model(&self) -> &str {
        self.config.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    fn fail(
        started_at: DateTime<Utc>,
        code: &str,
        message: impl Into<String>,
        class: ErrorClass,
    ) -> StepResult {
        let error = match class {
            ErrorClass::Transient => StepError::transient(code, message),
            ErrorClass::Permanent => StepError::permanent(code, message),
        };
        StepResult::failed(error, StepMetadata::capture(started_at))
    }

    fn build_prompt(&self, input: &Value, started_at: DateTime<Utc>) -> Result<String, StepResult> {
        if let Some(prompt) = self.config.prompt.as_deref().filter(|p| !p.is_empty()) {
            return Ok(prompt.to_string());
        }

        let Some(template) = self.config.prompt_template.as_deref() else {
            return Err(Self::fail(
                started_at,
                "PROMPT_MISSING",
                "AI step requires 'prompt' or 'prompt_template'",
                ErrorClass::Permanent,
            ));
        };

        let Value::Object(fields) = input else {
            return Err(Self::fail(
                started_at,
                "PROMPT_INPUT_ERROR",
                "prompt_template requires object input",
                ErrorClass::Permanent,
            ));
        };

        render_template(template, fields).map_err(|key| {
            Self::fail(
                started_at,
                "PROMPT_FORMAT_ERROR",
                format!("Missing template key: '{key}'"),
                ErrorClass::Permanent,
            )
        })
    }

    fn check_guardrails(&self, output_text: &str, started_at: DateTime<Utc>) -> Option<StepResult> {
        if let Some(min_length) = self.config.min_text_length {
            if output_text.trim().chars().count() < min_length {
                return Some(Self::fail(
                    started_at,
                    "AI_OUTPUT_INVALID",
                    format!("Output too short (min {min_length} chars)"),
                    ErrorClass::Permanent,
                ));
            }
        }

        let lower_text = output_text.to_lowercase();
        for phrase in &self.config.forbidden_phrases {
            if lower_text.contains(&phrase.to_lowercase()) {
                return Some(Self::fail(
                    started_at,
                    "AI_OUTPUT_INVALID",
                    format!("Output contains forbidden phrase: {phrase}"),
                    ErrorClass::Permanent,
                ));
            }
        }

        None
    }

    fn success(&self, started_at: DateTime<Utc>, output_text: String, usage: Value) -> StepResult {
        let ai_meta = json!({
            "provider": self.provider(),
            "model": self.model(),
            "prompt_id": self.config.prompt_id,
            "prompt_version": self.config.prompt_version,
            "usage": usage,
        });
        let output = json!({
            "text": output_text,
            "_ai_meta": ai_meta.clone(),
        });
        StepResult::success(output, StepMetadata::capture(started_at).with_extra(ai_meta))
    }

    async fn execute_openai(&self, prompt_text: &str, started_at: DateTime<Utc>) -> StepResult {
        let Ok(api_key) = std::env::var("OPENAI_API_KEY") else {
            return Self::fail(
                started_at,
                "AI_CONFIG_ERROR",
                "OPENAI_API_KEY is not set",
                ErrorClass::Permanent,
            );
        };

        let mut payload = json!({
            "model": self.model(),
            "messages": [{"role": "user", "content": prompt_text}],
        });
        if let Some(temperature) = self.config.temperature {
            payload["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = self.config.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }

        let timeout =
            Duration::from_secs(self.config.timeout_secs.unwrap_or(DEFAULT_AI_TIMEOUT_SECS));
        tracing::info!(model = self.model(), "Invoking AI provider");

        let response = match self
            .client
            .post(OPENAI_CHAT_URL)
            .bearer_auth(api_key)
            .json(&payload)
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return Self::fail(
                    started_at,
                    "AI_ERROR",
                    format!("AI execution error: {e}"),
                    ErrorClass::Transient,
                )
            }
        };

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let class = match status.as_u16() {
                429 | 500 | 502 | 503 | 504 => ErrorClass::Transient,
                _ => ErrorClass::Permanent,
            };
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Self::fail(
                started_at,
                "AI_HTTP_ERROR",
                format!("Provider HTTP {}: {body}", status.as_u16()),
                class,
            );
        }

        let data: Value = match response.json().await {
            Ok(data) => data,
            Err(e) => {
                return Self::fail(
                    started_at,
                    "AI_ERROR",
                    format!("AI execution error: {e}"),
                    ErrorClass::Transient,
                )
            }
        };

        let output_text = data["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let usage = data.get("usage").cloned().unwrap_or(json!({}));

        if let Some(rejected) = self.check_guardrails(&output_text, started_at) {
            return rejected;
        }
        self.success(started_at, output_text, usage)
    }
}

/// Renders `{key}` placeholders from the input object. Returns the first
/// missing key on failure.
fn render_template(template: &str, fields: &Map<String, Value>) -> Result<String, String> {
    let mut rendered = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                rendered.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                rendered.push('}');
            }
            '{' => {
                let mut key = String::new();
                for k in chars.by_ref() {
                    if k == '}' {
                        break;
                    }
                    key.push(k);
                }

                match fields.get(&key) {
                    Some(Value::String(s)) => rendered.push_str(s),
                    Some(other) => rendered.push_str(&other.to_string()),
                    None => return Err(key),
                }
            }
            _ => rendered.push(c),
        }
    }

    Ok(rendered)
}

#[async_trait]
impl StepExecutor for AiStep {
    async fn execute(&self, input: &Value, _ctx: &ExecutionContext) -> StepResult {
        let started_at = Utc::now();

        let prompt_text = match self.build_prompt(input, started_at) {
            Ok(prompt_text) => prompt_text,
            Err(failure) => return failure,
        };

        match self.provider() {
            "mock" => {
                let output_text = format!("MOCK_RESPONSE: {prompt_text}");
                let usage = json!({
                    "prompt_tokens": prompt_text.split_whitespace().count(),
                    "completion_tokens": output_text.split_whitespace().count(),
                });
                if let Some(rejected) = self.check_guardrails(&output_text, started_at) {
                    return rejected;
                }
                self.success(started_at, output_text, usage)
            }
            "openai" => self.execute_openai(&prompt_text, started_at).await,
            other => Self::fail(
                started_at,
                "AI_CONFIG_ERROR",
                format!("Unknown AI provider: {other}"),
                ErrorClass::Permanent,
            ),
        }
    }
}
