use thiserror::Error;

use crate::core::error::ErrorKind;

/// Errors handed to the controller runtime's error policy.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Reconciliation failed: {0}")]
    ReconcileFailed(#[source] ErrorKind),
    #[error("MissingObjectKey: {0}")]
    MissingObjectKey(&'static str),
}

impl Error {
    pub fn is_permanent(&self) -> bool {
        match self {
            Error::ReconcileFailed(kind) => !kind.is_retryable(),
            Error::MissingObjectKey(_) => true,
        }
    }
}
