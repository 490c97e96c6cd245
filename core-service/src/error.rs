use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Authentication error: {0}")]
    Auth(#[from] core_auth::AuthError),

    #[error(transparent)]
    Operation(#[from] core_auth::OperationError),
}

impl From<core_runtime::Error> for CoreError {
    fn from(error: core_runtime::Error) -> Self {
        match error {
            core_runtime::Error::CapabilityMissing {
                capability,
                message,
            } => CoreError::CapabilityMissing {
                capability,
                message,
            },
            core_runtime::Error::Internal(message) => CoreError::InitializationFailed(message),
            other => CoreError::Config(other.to_string()),
        }
    }
}

impl CoreError {
    /// Classification of the failure, when it came from an operation.
    pub fn kind(&self) -> Option<core_auth::ErrorKind> {
        match self {
            CoreError::Operation(e) => Some(e.kind()),
            CoreError::Auth(e) => Some(e.cause()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
