//! Provider adapter error types.

/// Errors from a schedule provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Network, DNS or timeout failure
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The provider is throttling us; retry after a backoff
    #[error("rate limited by provider")]
    RateLimited,

    /// The provider has no data for this request
    #[error("not available from provider")]
    NotAvailable,

    /// The provider returned an unexpected status
    #[error("provider error {status}: {message}")]
    Other { status: u16, message: String },
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::ConnectionFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProviderError::ConnectionFailed("dns error".into());
        assert_eq!(err.to_string(), "connection failed: dns error");

        assert_eq!(
            ProviderError::RateLimited.to_string(),
            "rate limited by provider"
        );
        assert_eq!(
            ProviderError::NotAvailable.to_string(),
            "not available from provider"
        );

        let err = ProviderError::Other {
            status: 500,
            message: "Internal Server Error".into(),
        };
        assert_eq!(err.to_string(), "provider error 500: Internal Server Error");
    }
}
