//! Error types for the CLI

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] opshub_common::config::ConfigError),

    #[error("logging error: {0}")]
    Telemetry(#[from] opshub_common::telemetry::TelemetryError),

    #[error("ledger error: {0}")]
    Ledger(#[from] opshub_ledger::LedgerError),

    #[error(transparent)]
    Access(#[from] opshub_access::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation error: {message}")]
    Validation { message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// Process exit code: 2 for errors the operator can fix, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Access(e) if e.is_user_correctable() => 2,
            Error::Config(_) | Error::Validation { .. } => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let not_granted = Error::from(opshub_access::Error::NotGranted {
            cluster_id: 1,
            user_id: 7,
        });
        assert_eq!(not_granted.exit_code(), 2);
        assert!(not_granted.to_string().contains("request access first"));

        let upstream = Error::from(opshub_access::Error::upstream(
            "list role bindings",
            opshub_common::ApiError::other("connection refused"),
        ));
        assert_eq!(upstream.exit_code(), 1);
        assert_eq!(Error::validation("bad").exit_code(), 2);
    }
}
