//! Error types for the CRM client crate.

use thiserror::Error;

use crate::types::ApiErrorResponse;

/// Result type alias for CRM client operations.
pub type Result<T> = std::result::Result<T, CrmClientError>;

const MAX_RAW_BODY_CHARS: usize = 200;

/// Errors that can occur while talking to the remote CRM.
#[derive(Debug, Error)]
pub enum CrmClientError {
    /// Transport failure, including request timeouts
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-2xx answer. `category` and `correlation_id` are taken from the CRM error body.
    #[error(
        "API error ({status}){}: {message}{}",
        category.as_deref().map(|c| format!(" {}", c)).unwrap_or_default(),
        correlation_id.as_deref().map(|id| format!(" [correlationId {}]", id)).unwrap_or_default()
    )]
    Api {
        status: u16,
        category: Option<String>,
        message: String,
        correlation_id: Option<String>,
    },

    /// 2xx answer whose body does not have the expected shape.
    #[error("Unexpected response body ({status}): {source}")]
    Decode {
        status: u16,
        source: serde_json::Error,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or malformed access token
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl CrmClientError {
    /// Builds an API error from a non-2xx response body.
    ///
    /// Structured CRM error bodies keep their category and correlation id; anything else is
    /// kept as a truncated raw message.
    pub fn from_response_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ApiErrorResponse>(body) {
            Ok(error) => Self::Api {
                status,
                category: error.category,
                message: error.message,
                correlation_id: error.correlation_id,
            },
            Err(_) => Self::Api {
                status,
                category: None,
                message: format!(
                    "Request failed: {}",
                    body.chars().take(MAX_RAW_BODY_CHARS).collect::<String>()
                ),
                correlation_id: None,
            },
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status, if the CRM answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } | Self::Decode { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// The engine only sees a status and a message; the message keeps the CRM correlation id
/// so it ends up in `last_sync_error`.
impl From<CrmClientError> for crm_replica_core::Error {
    fn from(err: CrmClientError) -> Self {
        let status = err.status_code();
        crm_replica_core::Error::remote(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_body_keeps_category_and_correlation_id() {
        let err = CrmClientError::from_response_body(
            429,
            r#"{"status":"error","category":"RATE_LIMITS","message":"Daily limit reached","correlationId":"c0ffee"}"#,
        );
        assert_eq!(err.status_code(), Some(429));
        assert_eq!(
            err.to_string(),
            "API error (429) RATE_LIMITS: Daily limit reached [correlationId c0ffee]"
        );
    }

    #[test]
    fn unstructured_body_is_truncated() {
        let body = "x".repeat(1_000);
        let err = CrmClientError::from_response_body(502, &body);
        match &err {
            CrmClientError::Api {
                message, category, ..
            } => {
                assert!(category.is_none());
                assert_eq!(message.len(), "Request failed: ".len() + MAX_RAW_BODY_CHARS);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn decode_failure_keeps_status() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = CrmClientError::Decode {
            status: 200,
            source,
        };
        assert_eq!(err.status_code(), Some(200));
        assert!(err.to_string().starts_with("Unexpected response body (200)"));
    }

    #[test]
    fn converts_into_remote_core_error_with_correlation_id() {
        let core: crm_replica_core::Error = CrmClientError::from_response_body(
            502,
            r#"{"category":"INTERNAL_ERROR","message":"bad gateway","correlationId":"abc-1"}"#,
        )
        .into();
        assert_eq!(core.status_code(), Some(502));
        assert!(core.to_string().contains("bad gateway"));
        assert!(core.to_string().contains("abc-1"));
    }

    #[test]
    fn auth_error_has_no_status() {
        let core: crm_replica_core::Error = CrmClientError::auth("Missing access token").into();
        assert_eq!(core.status_code(), None);
    }
}
