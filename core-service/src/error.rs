use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error(transparent)]
    Auth(#[from] core_auth::AuthError),

    #[error(transparent)]
    Mailbox(#[from] provider_gmail::GmailError),
}

impl CoreError {
    /// Machine-readable code placed in the `error` field of responses.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InitializationFailed(_) => "initialization_failed",
            CoreError::CapabilityMissing { .. } => "capability_missing",
            CoreError::Auth(e) => e.code(),
            CoreError::Mailbox(e) => e.code(),
        }
    }
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
            other => CoreError::InitializationFailed(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
