//! Error types for the model client.

use thiserror::Error;

/// Errors that can occur when calling the model API.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Request exceeded the configured deadline.
    #[error("model call timed out after {0} seconds")]
    Timeout(u64),

    /// The API returned an error status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// Rate limited by the API.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Authentication failed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Failed to parse response.
    #[error("parse error: {0}")]
    Parse(String),

    /// Client could not be constructed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// Whether a retry could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout(_) | Self::RateLimited(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Unauthorized(_) | Self::Parse(_) | Self::Config(_) => false,
        }
    }
}

/// API error envelope (`{"error": {"message": ..., "type": ...}}`).
#[derive(Debug, serde::Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiError,
}

/// Nested error details.
#[derive(Debug, serde::Deserialize)]
pub struct ApiError {
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::RateLimited(20);
        assert_eq!(err.to_string(), "rate limited, retry after 20 seconds");

        let err = LlmError::Api {
            status: 400,
            message: "Invalid tool schema".to_string(),
        };
        assert_eq!(err.to_string(), "API error (400): Invalid tool schema");
    }

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::Timeout(60).is_transient());
        assert!(
            LlmError::Api {
                status: 503,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            !LlmError::Api {
                status: 400,
                message: String::new()
            }
            .is_transient()
        );
        assert!(!LlmError::Unauthorized("bad key".to_string()).is_transient());
    }

    #[test]
    fn test_api_error_deserialization() {
        let json = r#"{"error": {"message": "model not found", "type": "invalid_request_error"}}"#;
        let response: ApiErrorResponse = serde_json::from_str(json).expect("deserialize");
        assert_eq!(response.error.message, "model not found");
        assert_eq!(
            response.error.error_type.as_deref(),
            Some("invalid_request_error")
        );
    }
}
