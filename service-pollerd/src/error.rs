use tokio::sync::{mpsc, oneshot};

/// Failures of registry operations. Each kind maps to one response code at
/// the API boundary.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("service with name {0:?} already exists")]
    DuplicateName(String),

    #[error("service with name {0:?} does not exist")]
    NotFound(String),

    #[error("invalid service: {0}")]
    Invalid(String),

    #[error("storage failure: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("registry is not running")]
    Closed,
}

pub type RegistryResult<T> = Result<T, RegistryError>;

impl<T> From<mpsc::error::SendError<T>> for RegistryError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        RegistryError::Closed
    }
}

impl From<oneshot::error::RecvError> for RegistryError {
    fn from(_: oneshot::error::RecvError) -> Self {
        RegistryError::Closed
    }
}
