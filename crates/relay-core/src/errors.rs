use std::time::Duration;

/// Failures of the operator messaging transport.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("operator API error {code}: {description}")]
    Api {
        code: i64,
        description: String,
        /// Seconds the API asked us to wait before retrying.
        retry_after: Option<u64>,
    },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("timeout")]
    Timeout,
}

impl TransportError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Api { .. } => "api",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Timeout => "timeout",
        }
    }

    /// Classify a non-success API answer.
    pub fn from_status(code: i64, description: impl Into<String>) -> Self {
        Self::Api {
            code,
            description: description.into(),
            retry_after: None,
        }
    }

    /// Attach the server-requested retry delay to an API error.
    pub fn with_retry_after(self, secs: Option<u64>) -> Self {
        match self {
            Self::Api { code, description, .. } => Self::Api {
                code,
                description,
                retry_after: secs,
            },
            other => other,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Api { retry_after: Some(secs), .. } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Errors surfaced to whoever asked the relay to forward a client message.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RelayError {
    /// Missing or empty `clientId` / `text`. Nothing was mutated.
    #[error("{0}")]
    Validation(&'static str),
    /// Forwarding to the operator failed. No correlation was recorded.
    #[error("failed to forward message to operator: {0}")]
    Transport(#[from] TransportError),
}

impl RelayError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Transport(e) => e.error_kind(),
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
