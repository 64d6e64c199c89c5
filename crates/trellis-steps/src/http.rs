//! HTTP caller step.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;

use trellis_core::{
    ApiConfig, ErrorClass, ExecutionContext, StepError, StepExecutor, StepMetadata, StepResult,
};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Executes a real HTTP request.
///
/// Error classification: network failures and 5xx responses are transient,
/// 4xx responses are permanent. Dynamic headers come from the input's
/// `_headers` key when `headers_from_input` is set; `body_from_input` sends
/// the input (minus `_headers`) as the JSON body.
#[derive(Debug)]
pub struct HttpStep {
    config: ApiConfig,
    client: reqwest::Client,
}

impl HttpStep {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn fail(
        started_at: DateTime<Utc>,
        message: impl Into<String>,
        class: ErrorClass,
    ) -> StepResult {
        let error = match class {
            ErrorClass::Transient => StepError::transient("HTTP_ERROR", message),
            ErrorClass::Permanent => StepError::permanent("HTTP_ERROR", message),
        };
        StepResult::failed(error, StepMetadata::capture(started_at))
    }

    fn build_headers(&self, input: &Value) -> Result<HeaderMap, String> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.config.headers {
            let name = HeaderName::from_str(name).map_err(|e| e.to_string())?;
            let value = HeaderValue::from_str(value).map_err(|e| e.to_string())?;
            headers.insert(name, value);
        }

        if self.config.headers_from_input {
            if let Some(dynamic) = input.get("_headers").and_then(Value::as_object) {
                for (name, value) in dynamic {
                    let Some(value) = value.as_str() else { continue };
                    let name = HeaderName::from_str(name).map_err(|e| e.to_string())?;
                    let value = HeaderValue::from_str(value).map_err(|e| e.to_string())?;
                    headers.insert(name, value);
                }
            }
        }

        Ok(headers)
    }

    fn request_body(&self, input: &Value) -> Option<Value> {
        if !self.config.body_from_input {
            return None;
        }
        // Strip _headers so it never leaks to the remote API.
        match input {
            Value::Object(map) => {
                let mut body = map.clone();
                body.remove("_headers");
                Some(Value::Object(body))
            }
            other => Some(other.clone()),
        }
    }
}

#[async_trait]
impl StepExecutor for HttpStep {
    async fn execute(&self, input: &Value, _ctx: &ExecutionContext) -> StepResult {
        let started_at = Utc::now();

        let Some(url) = self.config.url.as_deref() else {
            return Self::fail(
                started_at,
                "Missing URL in step config",
                ErrorClass::Transient,
            );
        };

        let method_name = self.config.method.as_deref().unwrap_or("GET").to_uppercase();
        let method = match Method::from_bytes(method_name.as_bytes()) {
            Ok(method) => method,
            Err(e) => {
                return Self::fail(
                    started_at,
                    format!("Invalid HTTP method {method_name}: {e}"),
                    ErrorClass::Permanent,
                )
            }
        };

        let headers = match self.build_headers(input) {
            Ok(headers) => headers,
            Err(e) => {
                return Self::fail(
                    started_at,
                    format!("Invalid header in step config: {e}"),
                    ErrorClass::Permanent,
                )
            }
        };

        let timeout = Duration::from_secs(
            self.config
                .timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );

        tracing::info!(method = %method, url, "Executing HTTP request");

        let mut request = self
            .client
            .request(method, url)
            .headers(headers)
            .timeout(timeout);
        if let Some(body) = self.request_body(input) {
            request = request.json(&body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                // Network, DNS, and timeout errors are generally transient.
                return Self::fail(
                    started_at,
                    format!("Network Error (Transient): {e}"),
                    ErrorClass::Transient,
                );
            }
        };

        let status = response.status();
        let body_text = response.text().await.unwrap_or_default();

        if status.is_success() {
            let parsed: Value = serde_json::from_str(&body_text)
                .unwrap_or_else(|_| json!({"text": body_text}));
            let output = match parsed {
                Value::Object(mut map) => {
                    map.insert("_status".to_string(), json!(status.as_u16()));
                    Value::Object(map)
                }
                other => json!({"body": other, "_status": status.as_u16()}),
            };
            return StepResult::success(output, StepMetadata::capture(started_at));
        }

        let class = if status.is_server_error() {
            ErrorClass::Transient
        } else {
            ErrorClass::Permanent
        };
        let category = match class {
            ErrorClass::Transient => "Transient",
            ErrorClass::Permanent => "Permanent",
        };
        let body_prefix: String = body_text.chars().take(200).collect();
        Self::fail(
            started_at,
            format!("HTTP {} ({category}): {body_prefix}", status.as_u16()),
            class,
        )
    }
}
