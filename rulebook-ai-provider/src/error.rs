//! Error types for the provider adapters

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors raised by the embedding and chat adapters.
///
/// HTTP failures keep the status and the response body verbatim so callers
/// can diagnose a failed ingestion or retrieval without re-running it with
/// verbose logging. Nothing in this crate retries.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider answered with a non-2xx status
    #[error("{provider} returned HTTP {status}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    /// The request never produced a response
    #[error("{provider} request failed: {source}")]
    Network {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response body did not match any known envelope
    #[error("could not decode {provider} response: {message}")]
    Decode { provider: String, message: String },

    /// The provider returned a different number of vectors than inputs sent
    #[error("embedding count mismatch: sent {expected} inputs, received {actual} vectors")]
    CountMismatch { expected: usize, actual: usize },

    /// Missing or malformed configuration
    #[error("invalid provider configuration: {message}")]
    InvalidConfig { message: String },
}

impl ProviderError {
    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn decode<P: Into<String>, M: std::fmt::Display>(provider: P, message: M) -> Self {
        Self::Decode {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    /// HTTP status of the failed call, when the provider answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Network { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_keeps_status_and_body() {
        let err = ProviderError::Http {
            provider: "mistral".to_string(),
            status: 429,
            body: r#"{"message":"rate limited"}"#.to_string(),
        };

        assert_eq!(err.status(), Some(429));
        assert_eq!(
            err.to_string(),
            r#"mistral returned HTTP 429: {"message":"rate limited"}"#
        );
    }

    #[test]
    fn test_count_mismatch_is_not_an_http_error() {
        let err = ProviderError::CountMismatch {
            expected: 32,
            actual: 31,
        };
        assert_eq!(err.status(), None);
        assert!(err.to_string().contains("sent 32 inputs, received 31 vectors"));
    }
}
