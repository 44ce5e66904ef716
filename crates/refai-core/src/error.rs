use thiserror::Error;

/// Why a chat turn could not be streamed
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0} is not configured")]
    MissingCredential(&'static str),

    #[error("Rate limit exceeded. Please try again in a moment.")]
    RateLimited,

    #[error("AI credits exhausted. Please contact support.")]
    PaymentRequired,

    #[error("AI service error {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl RelayError {
    /// Map a non-success HTTP status and body to an error.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => RelayError::RateLimited,
            402 => RelayError::PaymentRequired,
            _ => RelayError::Upstream { status, body },
        }
    }

    /// Status the relay answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::RateLimited => 429,
            RelayError::PaymentRequired => 402,
            _ => 500,
        }
    }

    /// Text safe to put in an `{"error": ...}` body.
    ///
    /// Upstream bodies are logged, never forwarded.
    pub fn public_message(&self) -> String {
        match self {
            RelayError::Upstream { .. } => "AI service error".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(RelayError::from_status(429, String::new()), RelayError::RateLimited));
        assert!(matches!(RelayError::from_status(402, String::new()), RelayError::PaymentRequired));
        assert!(matches!(
            RelayError::from_status(503, "overloaded".to_string()),
            RelayError::Upstream { status: 503, .. }
        ));
    }

    #[test]
    fn test_public_message_hides_upstream_body() {
        let err = RelayError::from_status(500, "internal stack trace".to_string());
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.public_message(), "AI service error");

        let err = RelayError::MissingCredential("AI_GATEWAY_API_KEY");
        assert_eq!(err.public_message(), "AI_GATEWAY_API_KEY is not configured");
        assert_eq!(RelayError::RateLimited.status_code(), 429);
        assert_eq!(RelayError::PaymentRequired.status_code(), 402);
    }
}
