use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    Configuration(String),

    #[error("Token exchange failed ({status}): {message}")]
    AuthExchange { status: u16, message: String },

    #[error("Identity lookup failed ({status}): {message}")]
    IdentityFetch { status: u16, message: String },

    #[error("Publish failed ({status}): {message}")]
    Publish { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected provider response: {0}")]
    UnexpectedResponse(String),
}

impl ProviderError {
    /// HTTP status the provider answered with, when there was one.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            ProviderError::AuthExchange { status, .. }
            | ProviderError::IdentityFetch { status, .. }
            | ProviderError::Publish { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The provider's own wording, without our prefix.
    pub fn detail(&self) -> &str {
        match self {
            ProviderError::AuthExchange { message, .. }
            | ProviderError::IdentityFetch { message, .. }
            | ProviderError::Publish { message, .. } => message,
            ProviderError::Configuration(msg)
            | ProviderError::Network(msg)
            | ProviderError::UnexpectedResponse(msg) => msg,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::UnexpectedResponse(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_strips_the_prefix() {
        let err = ProviderError::Publish {
            status: 422,
            message: "Validation failed: Text can't be blank".to_string(),
        };
        assert_eq!(err.detail(), "Validation failed: Text can't be blank");
        assert_eq!(err.upstream_status(), Some(422));
        assert_eq!(
            err.to_string(),
            "Publish failed (422): Validation failed: Text can't be blank"
        );
    }

    #[test]
    fn network_errors_have_no_status() {
        let err = ProviderError::Network("connection refused".to_string());
        assert_eq!(err.upstream_status(), None);
    }
}
