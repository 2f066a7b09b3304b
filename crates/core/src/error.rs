use serde::Deserialize;
use thiserror::Error;

/// Failure reported by a backend call, before any component adds context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("backend is unreachable: {0}")]
    Transport(String),
    #[error("{message}")]
    Backend { status: u16, message: String },
    #[error("malformed backend response: {0}")]
    Parse(String),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    #[must_use]
    pub fn backend(status: u16, message: impl Into<String>) -> Self {
        Self::Backend {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Builds the error for a non-2xx response. Bodies that are not
    /// `{"error": "..."}` degrade to a generic status message.
    #[must_use]
    pub fn from_error_body(status: u16, body: &[u8]) -> Self {
        match serde_json::from_slice::<ErrorBody>(body) {
            Ok(parsed) if !parsed.error.trim().is_empty() => Self::backend(status, parsed.error),
            _ => Self::backend(status, generic_failure_message(status)),
        }
    }

    /// Text shown to the operator. Backend messages pass through verbatim.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Backend { message, .. } => message.clone(),
            Self::Transport(_) | Self::Parse(_) => self.to_string(),
        }
    }
}

#[must_use]
pub fn generic_failure_message(status: u16) -> String {
    format!("request failed with status {status}")
}

#[cfg(test)]
mod tests {
    use super::ApiError;

    #[test]
    fn structured_error_body_is_surfaced_verbatim() {
        let error = ApiError::from_error_body(400, br#"{"error":"duplicate key"}"#);
        assert_eq!(error, ApiError::backend(400, "duplicate key"));
        assert_eq!(error.user_message(), "duplicate key");
    }

    #[test]
    fn unparseable_error_body_degrades_to_generic_message() {
        let error = ApiError::from_error_body(502, b"<html>bad gateway</html>");
        assert_eq!(error.user_message(), "request failed with status 502");

        let missing_field = ApiError::from_error_body(500, br#"{"message":"nope"}"#);
        assert_eq!(
            missing_field.user_message(),
            "request failed with status 500"
        );

        let empty = ApiError::from_error_body(500, b"");
        assert_eq!(empty.user_message(), "request failed with status 500");
    }

    #[test]
    fn transport_and_parse_errors_carry_context() {
        assert_eq!(
            ApiError::transport("connection refused").user_message(),
            "backend is unreachable: connection refused"
        );
        assert_eq!(
            ApiError::parse("expected value at line 1").user_message(),
            "malformed backend response: expected value at line 1"
        );
    }
}
