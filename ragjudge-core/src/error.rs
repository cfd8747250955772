//! Error types for the ragjudge core library.

/// Top-level error type for the ragjudge core library.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Judge error: {0}")]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures talking to the judge backend.
///
/// `RateLimited`, `Timeout` and `Connection` are transient and retried by
/// the provider; the rest are returned to the caller at once.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Judge API request failed: {message}")]
    ApiRequest { message: String },

    #[error("Unreadable judge response: {message}")]
    ResponseParse { message: String },

    #[error("Unsupported judge provider '{provider}'")]
    UnsupportedProvider { provider: String },

    #[error("Judge authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("Judge rate limited; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Timed out after {timeout_secs}s waiting for the judge")]
    Timeout { timeout_secs: u64 },

    #[error("Cannot reach judge endpoint: {message}")]
    Connection { message: String },
}

impl LlmError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Connection { .. } | Self::Timeout { .. }
        )
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_judge_error_wraps_llm() {
        let err = CoreError::Llm(LlmError::ApiRequest {
            message: "HTTP 400: bad model".into(),
        });
        assert_eq!(
            err.to_string(),
            "Judge error: Judge API request failed: HTTP 400: bad model"
        );
    }

    #[test]
    fn test_auth_reason_in_message() {
        let err = LlmError::AuthFailed {
            reason: "env var 'OPENAI_API_KEY' not set".into(),
        };
        assert_eq!(
            err.to_string(),
            "Judge authentication failed: env var 'OPENAI_API_KEY' not set"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::Timeout { timeout_secs: 1 }.is_transient());
        assert!(LlmError::RateLimited { retry_after_secs: 2 }.is_transient());
        assert!(!LlmError::UnsupportedProvider { provider: "x".into() }.is_transient());
        assert!(
            !LlmError::ResponseParse {
                message: "no choices".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_config_error_is_transparent() {
        let err: CoreError = ConfigError::from(figment::Error::from("bad key".to_string())).into();
        assert!(err.to_string().starts_with("Failed to load configuration"));
    }
}
