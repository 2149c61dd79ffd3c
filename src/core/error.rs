use thiserror::Error;

/// Failures reported by a resource store client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Not Found - {0}")]
    NotFound(String),
    #[error("Already Exists - {0}")]
    AlreadyExists(String),
    #[error("Conflict - {0}")]
    Conflict(String),
    #[error("Rejected by admission - {0}")]
    Rejected(String),
    #[error("Store Error - {0}")]
    Other(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::AlreadyExists(_) => "ALREADY_EXISTS",
            StoreError::Conflict(_) => "CONFLICT",
            StoreError::Rejected(_) => "REJECTED",
            StoreError::Other(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(response) => match (response.code, response.reason.as_str()) {
                (404, _) | (_, "NotFound") => StoreError::NotFound(response.message.clone()),
                (409, "AlreadyExists") => StoreError::AlreadyExists(response.message.clone()),
                (409, _) | (_, "Conflict") => StoreError::Conflict(response.message.clone()),
                (_, "Forbidden") | (_, "Invalid") if response.message.contains("admission webhook") => {
                    StoreError::Rejected(response.message.clone())
                }
                _ => StoreError::Other(err.to_string()),
            },
            _ => StoreError::Other(err.to_string()),
        }
    }
}

/// Error classes a reconciliation pass can end with.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("Unable to scale demo deployment replicas greater than {max} (requested {requested})")]
    PolicyViolation { requested: i32, max: i32 },
    #[error("Write failure - {0}")]
    WriteFailure(String),
    #[error("Fetch failure - {0}")]
    FetchFailure(String),
    #[error("Ownership conflict - {0}")]
    OwnershipConflict(String),
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::PolicyViolation { .. } => "POLICY_VIOLATION",
            ErrorKind::WriteFailure(_) => "WRITE_FAILURE",
            ErrorKind::FetchFailure(_) => "FETCH_FAILURE",
            ErrorKind::OwnershipConflict(_) => "OWNERSHIP_CONFLICT",
        }
    }

    /// Permanent kinds are surfaced and must never be retried automatically.
    pub fn is_retryable(&self) -> bool {
        match self {
            ErrorKind::PolicyViolation { .. } => false,
            ErrorKind::WriteFailure(_) => true,
            ErrorKind::FetchFailure(_) => false,
            ErrorKind::OwnershipConflict(_) => false,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("unable to scale demo deployment replicas greater than {max}")]
    ReplicaCeiling { requested: i32, max: i32 },
    #[error("replicas must not be negative, given {0}")]
    NegativeReplicas(i32),
    #[error("image reference must not be empty")]
    EmptyImage,
}
