//! OpenAI-compatible chat-completions client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use tokio_retry::RetryIf;
use tokio_retry::strategy::FixedInterval;
use tracing::{instrument, warn};

use crate::config::OpenAiConfig;

use super::ChatModel;
use super::error::{ApiErrorResponse, LlmError};
use super::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ModelReply, ToolDefinition};

/// Delay before the single retry of a transient failure.
const RETRY_DELAY_MS: u64 = 500;

/// Chat-completions client.
///
/// Each call is bounded by the configured timeout and retried once on
/// transient failures (timeouts, 5xx, rate limits).
#[derive(Clone)]
pub struct OpenAiClient {
    inner: Arc<OpenAiClientInner>,
}

struct OpenAiClientInner {
    client: reqwest::Client,
    model: String,
    endpoint: String,
    timeout: Duration,
}

impl OpenAiClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Config` if the API key is not a valid header value
    /// or the HTTP client cannot be built.
    pub fn new(config: &OpenAiConfig) -> Result<Self, LlmError> {
        let bearer = format!("Bearer {}", config.api_key.expose_secret());
        let mut auth = HeaderValue::from_str(&bearer)
            .map_err(|_| LlmError::Config("API key contains invalid header characters".into()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(OpenAiClientInner {
                client,
                model: config.model.clone(),
                endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
                timeout: config.timeout,
            }),
        })
    }

    async fn attempt(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, LlmError> {
        let result = self.complete_once(messages, tools).await;
        if let Err(e) = &result {
            warn!(error = %e, transient = e.is_transient(), "model call failed");
        }
        result
    }

    async fn complete_once(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, LlmError> {
        let request = ChatCompletionRequest {
            model: &self.inner.model,
            messages,
            tools,
        };

        let response = self
            .inner
            .client
            .post(&self.inner.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.inner.timeout.as_secs())
                } else {
                    LlmError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(handle_error_status(status, response).await);
        }

        let body = response.text().await?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::Parse(format!("Failed to parse response: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Parse("response has no choices".to_string()))?;

        Ok(ModelReply {
            content: choice.message.content.filter(|c| !c.is_empty()),
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
            usage: parsed.usage.unwrap_or_default().into(),
            model: parsed.model.unwrap_or_else(|| self.inner.model.clone()),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    fn model_id(&self) -> &str {
        &self.inner.model
    }

    #[instrument(
        skip(self, messages, tools),
        fields(model = %self.inner.model, messages = messages.len(), tools = tools.len())
    )]
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, LlmError> {
        let strategy = FixedInterval::from_millis(RETRY_DELAY_MS).take(1);

        RetryIf::spawn(
            strategy,
            || self.attempt(messages, tools),
            LlmError::is_transient,
        )
        .await
    }
}

/// Map an error status code to an `LlmError`.
async fn handle_error_status(status: reqwest::StatusCode, response: reqwest::Response) -> LlmError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        return LlmError::RateLimited(retry_after);
    }

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return LlmError::Unauthorized("Invalid API key".to_string());
    }

    match response.text().await {
        Ok(body) => {
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map_or(body, |api_error| api_error.error.message);
            LlmError::Api {
                status: status.as_u16(),
                message,
            }
        }
        Err(e) => LlmError::Http(e),
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_config(base_url: String) -> OpenAiConfig {
        OpenAiConfig {
            api_key: SecretString::from("sk-test-4f9a2c7e1b"),
            model: "gpt-4o-mini".to_string(),
            base_url,
            timeout: Duration::from_secs(5),
        }
    }

    fn text_response(text: &str) -> serde_json::Value {
        serde_json::json!({
            "model": "gpt-4o-mini-2024-07-18",
            "choices": [{
                "message": {"role": "assistant", "content": text},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 4, "total_tokens": 14}
        })
    }

    #[tokio::test]
    async fn test_complete_parses_text_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test-4f9a2c7e1b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("Hi there")))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&test_config(server.uri())).expect("client");
        let reply = client
            .complete(&[ChatMessage::user("hello")], &[])
            .await
            .expect("reply");

        assert_eq!(reply.content.as_deref(), Some("Hi there"));
        assert!(reply.tool_calls.is_empty());
        assert_eq!(reply.usage.total_tokens, 14);
        assert_eq!(reply.model, "gpt-4o-mini-2024-07-18");
    }

    #[tokio::test]
    async fn test_complete_parses_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [
                            {"id": "call_1", "type": "function",
                             "function": {"name": "search_products", "arguments": "{\"keywords\":[\"hoodie\"]}"}},
                            {"id": "call_2", "type": "function",
                             "function": {"name": "display_products", "arguments": "{\"productIds\":[]}"}}
                        ]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&test_config(server.uri())).expect("client");
        let reply = client
            .complete(&[ChatMessage::user("find a hoodie")], &[])
            .await
            .expect("reply");

        assert_eq!(reply.content, None);
        let names: Vec<_> = reply
            .tool_calls
            .iter()
            .map(|c| c.function.name.as_str())
            .collect();
        assert_eq!(names, ["search_products", "display_products"]);
        assert_eq!(reply.model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_complete_retries_once_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "error": {"message": "overloaded", "type": "server_error"}
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("recovered")))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&test_config(server.uri())).expect("client");
        let reply = client
            .complete(&[ChatMessage::user("hello")], &[])
            .await
            .expect("reply after retry");

        assert_eq!(reply.content.as_deref(), Some("recovered"));
    }

    #[tokio::test]
    async fn test_complete_gives_up_after_one_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(2)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&test_config(server.uri())).expect("client");
        let result = client.complete(&[ChatMessage::user("hello")], &[]).await;

        match result {
            Err(LlmError::Api { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_complete_does_not_retry_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&test_config(server.uri())).expect("client");
        let result = client.complete(&[ChatMessage::user("hello")], &[]).await;

        assert!(matches!(result, Err(LlmError::Unauthorized(_))));
    }

    #[test]
    fn test_openai_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<OpenAiClient>();
    }
}
