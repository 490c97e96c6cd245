use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Returns `true` when the failure happened before any HTTP response was
    /// received (timeouts, refused connections, DNS failures, broken pipes).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            BridgeError::Timeout
                | BridgeError::ConnectionFailed(_)
                | BridgeError::Transport(_)
                | BridgeError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(BridgeError::Timeout.is_transport());
        assert!(BridgeError::ConnectionFailed("refused".to_string()).is_transport());
        assert!(BridgeError::Transport("dns".to_string()).is_transport());
        assert!(
            BridgeError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe"))
                .is_transport()
        );

        assert!(!BridgeError::OperationFailed("bad json".to_string()).is_transport());
        assert!(!BridgeError::NotAvailable("http".to_string()).is_transport());
    }
}
