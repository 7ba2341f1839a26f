use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriveGuardError {
    #[error("Wallet provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Request rejected by user: {0}")]
    UserRejected(String),

    #[error("Network or contract error: {0}")]
    NetworkOrContract(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not logged in")]
    Unauthenticated,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl DriveGuardError {
    /// Stable machine-readable label for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::UserRejected(_) => "user_rejected",
            Self::NetworkOrContract(_) => "network_or_contract",
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Unauthenticated => "unauthenticated",
            Self::AccessDenied(_) => "access_denied",
            Self::SessionNotFound(_) => "session_not_found",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<sqlx::Error> for DriveGuardError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for DriveGuardError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DriveGuardError>;
