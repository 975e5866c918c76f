use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited by remote")]
    RateLimited,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote returned status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("unsupported by remote API: {0}")]
    Unsupported(String),
}

impl RemoteError {
    /// Transient failures worth another attempt: rate limits, network-level
    /// errors, and server-side 5xx. Other 4xx are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited | Self::Transport(_) => true,
            Self::Status { code, .. } => *code >= 500,
            Self::NotFound(_) | Self::Unsupported(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        match code {
            404 => Self::NotFound(message.into()),
            429 => Self::RateLimited,
            _ => Self::Status { code, message: message.into() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_split() {
        assert!(RemoteError::RateLimited.is_retryable());
        assert!(RemoteError::Transport("timed out".into()).is_retryable());
        assert!(RemoteError::from_status(502, "bad gateway").is_retryable());
        assert!(!RemoteError::from_status(403, "forbidden").is_retryable());
        assert!(!RemoteError::from_status(404, "gone").is_retryable());
        assert!(!RemoteError::Unsupported("clear".into()).is_retryable());
    }

    #[test]
    fn status_mapping() {
        assert!(RemoteError::from_status(404, "user u1").is_not_found());
        assert!(matches!(RemoteError::from_status(429, ""), RemoteError::RateLimited));
    }
}
