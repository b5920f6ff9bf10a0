//! OpenAI-compatible chat client with SSE streaming.

use std::time::Duration;

use arca_protocol::ChatRequest;
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::BackendError;
use crate::stream::{drive_stream, StreamHandlers, StreamOutcome};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const COMPLETIONS_PATH: &str = "/chat/completions";
const MODELS_PATH: &str = "/models";
const MODELS_TIMEOUT: Duration = Duration::from_secs(10);
const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1", "[::1]"];

/// Connection settings for [`ChatClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Permit localhost endpoints (rejected by default).
    pub allow_local_endpoints: bool,
    /// Used when a request does not set its own temperature.
    pub temperature: Option<f32>,
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            allow_local_endpoints: false,
            temperature: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeouts(mut self, timeout: Duration, connect_timeout: Duration) -> Self {
        self.timeout = timeout;
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn allow_local_endpoints(mut self, allow: bool) -> Self {
        self.allow_local_endpoints = allow;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Chat completions client.
pub struct ChatClient {
    endpoint: String,
    models_endpoint: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    http: Client,
}

#[derive(Serialize)]
struct StreamingBody<'a> {
    #[serde(flatten)]
    request: &'a ChatRequest,
    stream: bool,
}

impl ChatClient {
    /// Validate the options and build the HTTP client. Nothing is sent yet.
    pub fn new(options: &ClientOptions) -> Result<Self, BackendError> {
        let base_url = normalize_base_url(&options.base_url, options.allow_local_endpoints)?;
        if options.api_key.trim().is_empty() {
            return Err(BackendError::Validation("API key must not be empty".into()));
        }

        let http = Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.connect_timeout)
            .pool_max_idle_per_host(2)
            .build()?;

        Ok(Self {
            endpoint: completions_endpoint(&base_url),
            models_endpoint: models_endpoint(&base_url),
            api_key: options.api_key.trim().to_string(),
            model: options.model.clone(),
            temperature: options.temperature,
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// A request for the configured model and temperature.
    pub fn request(&self, messages: Vec<arca_protocol::ChatMessage>) -> ChatRequest {
        let mut request = ChatRequest::new(self.model.clone(), messages);
        request.temperature = self.temperature;
        request
    }

    /// Stream one chat completion, invoking `handlers` as deltas arrive.
    ///
    /// Cancellation at any point returns `StreamOutcome::Cancelled` without an
    /// error; text already handed to the callbacks is not retracted.
    pub async fn stream_complete_chat(
        &self,
        request: &ChatRequest,
        handlers: &mut StreamHandlers<'_>,
        cancel: &CancellationToken,
    ) -> Result<StreamOutcome, BackendError> {
        validate_request(request)?;
        if cancel.is_cancelled() {
            return Ok(StreamOutcome::Cancelled);
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            response = self.send(request) => Some(response?),
        };
        let Some(response) = response else {
            log::debug!("[arca:client] cancelled before response");
            return Ok(StreamOutcome::Cancelled);
        };

        drive_stream(Box::pin(response.bytes_stream()), handlers, cancel).await
    }

    /// Ids of the models the endpoint offers, in the order it lists them.
    /// Doubles as a connection and credentials check.
    pub async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        let response = self
            .http
            .get(&self.models_endpoint)
            .header("accept", "application/json")
            .bearer_auth(&self.api_key)
            .timeout(MODELS_TIMEOUT)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        if !(200..300).contains(&status) {
            log::warn!("[arca:client] model listing returned HTTP {status}");
            return Err(BackendError::from_response(status, &body));
        }

        let payload: Value = serde_json::from_str(&body)
            .map_err(|e| BackendError::Validation(format!("invalid model list: {e}")))?;
        let models = model_ids(&payload);
        log::debug!("[arca:client] endpoint lists {} models", models.len());
        Ok(models)
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, BackendError> {
        let body = StreamingBody {
            request,
            stream: true,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("accept", "text/event-stream")
            .header("content-type", "application/json")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            log::warn!("[arca:client] upstream returned HTTP {status}");
            return Err(BackendError::from_response(status, &body));
        }

        Ok(response)
    }
}

/// Reject requests that cannot succeed before anything is sent.
pub fn validate_request(request: &ChatRequest) -> Result<(), BackendError> {
    if request.model.trim().is_empty() {
        return Err(BackendError::Validation("model must not be empty".into()));
    }
    if request.messages.is_empty() {
        return Err(BackendError::Validation(
            "request must contain at least one message".into(),
        ));
    }
    Ok(())
}

/// Check a base URL and strip trailing slashes.
pub fn normalize_base_url(base_url: &str, allow_local: bool) -> Result<String, BackendError> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(BackendError::Validation("API base URL must not be empty".into()));
    }

    let parsed = Url::parse(trimmed)
        .map_err(|e| BackendError::Validation(format!("invalid API base URL: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(BackendError::Validation(format!(
            "unsupported URL scheme '{}'",
            parsed.scheme()
        )));
    }
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    if host.is_empty() {
        return Err(BackendError::Validation("API base URL has no host".into()));
    }
    if !allow_local && LOCAL_HOSTS.contains(&host.as_str()) {
        return Err(BackendError::Validation(
            "API base URL must not point at localhost".into(),
        ));
    }

    Ok(trimmed.trim_end_matches('/').to_string())
}

fn completions_endpoint(base_url: &str) -> String {
    if base_url.ends_with(COMPLETIONS_PATH) {
        base_url.to_string()
    } else if base_url.ends_with("/v1") {
        format!("{base_url}{COMPLETIONS_PATH}")
    } else {
        format!("{base_url}/v1{COMPLETIONS_PATH}")
    }
}

fn models_endpoint(base_url: &str) -> String {
    let base = base_url.strip_suffix(COMPLETIONS_PATH).unwrap_or(base_url);
    if base.ends_with("/v1") {
        format!("{base}{MODELS_PATH}")
    } else {
        format!("{base}/v1{MODELS_PATH}")
    }
}

/// `data[].id` of a model list; entries without an id are skipped.
fn model_ids(payload: &Value) -> Vec<String> {
    let Some(data) = payload.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };
    data.iter()
        .filter_map(|model| match model.get("id")? {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arca_protocol::ChatMessage;

    #[test]
    fn base_url_validation() {
        assert!(normalize_base_url("", false).is_err());
        assert!(normalize_base_url("   ", false).is_err());
        assert!(normalize_base_url("not a url", false).is_err());
        assert!(normalize_base_url("ftp://example.com", false).is_err());
        assert!(normalize_base_url("http://localhost:8080", false).is_err());
        assert!(normalize_base_url("http://127.0.0.1", false).is_err());
        assert!(normalize_base_url("http://[::1]:9000", false).is_err());
        assert_eq!(
            normalize_base_url("http://localhost:8080/", true).unwrap(),
            "http://localhost:8080"
        );
        assert_eq!(
            normalize_base_url(" https://api.example.com/// ", false).unwrap(),
            "https://api.example.com"
        );
    }

    #[test]
    fn endpoint_building() {
        assert_eq!(
            completions_endpoint("https://api.example.com"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            completions_endpoint("https://api.example.com/v1"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            completions_endpoint("https://x.dev/openai/v1/chat/completions"),
            "https://x.dev/openai/v1/chat/completions"
        );
    }

    #[test]
    fn models_endpoint_building() {
        assert_eq!(
            models_endpoint("https://api.example.com"),
            "https://api.example.com/v1/models"
        );
        assert_eq!(
            models_endpoint("https://api.example.com/v1"),
            "https://api.example.com/v1/models"
        );
        assert_eq!(
            models_endpoint("https://x.dev/openai/v1/chat/completions"),
            "https://x.dev/openai/v1/models"
        );
    }

    #[test]
    fn model_ids_skip_entries_without_ids() {
        let payload = serde_json::json!({"data": [
            {"id": "gpt-4o"},
            {"id": ""},
            {"object": "model"},
            {"id": 7},
            "garbage",
            {"id": "card-model"}
        ]});
        assert_eq!(model_ids(&payload), vec!["gpt-4o", "7", "card-model"]);
        assert!(model_ids(&serde_json::json!({"data": {}})).is_empty());
        assert!(model_ids(&serde_json::json!([])).is_empty());
    }

    #[test]
    fn request_validation() {
        let empty_model = ChatRequest::new(" ", vec![ChatMessage::user("hi")]);
        assert!(matches!(
            validate_request(&empty_model),
            Err(BackendError::Validation(_))
        ));

        let no_messages = ChatRequest::new("m", vec![]);
        assert!(matches!(
            validate_request(&no_messages),
            Err(BackendError::Validation(_))
        ));

        assert!(validate_request(&ChatRequest::new("m", vec![ChatMessage::user("hi")])).is_ok());
    }

    #[test]
    fn blank_api_key_rejected() {
        let options = ClientOptions::new("https://api.example.com", "  ");
        assert!(matches!(
            ChatClient::new(&options),
            Err(BackendError::Validation(_))
        ));
    }

    #[test]
    fn streaming_body_shape() {
        let request = ChatRequest::new("m", vec![ChatMessage::user("hi")])
            .with_temperature(0.5)
            .with_tools(
                vec![serde_json::json!({"type": "function", "function": {"name": "f"}})],
                Some(serde_json::json!("auto")),
            );
        let body = serde_json::to_value(StreamingBody {
            request: &request,
            stream: true,
        })
        .unwrap();

        assert_eq!(body["stream"], true);
        assert_eq!(body["model"], "m");
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["messages"][0]["content"], "hi");
    }

    #[test]
    fn client_request_uses_configured_model() {
        let options = ClientOptions::new("https://api.example.com", "key")
            .with_model("card-model")
            .with_temperature(Some(0.2));
        let client = ChatClient::new(&options).unwrap();
        let request = client.request(vec![ChatMessage::user("hi")]);
        assert_eq!(request.model, "card-model");
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[tokio::test]
    async fn invalid_request_fails_before_sending() {
        let client = ChatClient::new(&ClientOptions::new("https://api.example.com", "key")).unwrap();
        let result = client
            .stream_complete_chat(
                &ChatRequest::new("m", vec![]),
                &mut StreamHandlers::new(),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(BackendError::Validation(_))));
    }
}
