use crate::model::ContactId;
use thiserror::Error;

/// Failures surfaced by [`Unicontact::identify`](crate::Unicontact::identify).
#[derive(Error, Debug)]
pub enum IdentifyError {
    #[error("either phoneNumber or email must be provided")]
    InvalidInput,

    #[error("contact {0} not found")]
    NotFound(ContactId),

    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    /// Storage failure, passed through unchanged.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl IdentifyError {
    /// Whether the caller supplied a bad request rather than the system failing.
    pub fn is_client_error(&self) -> bool {
        matches!(self, IdentifyError::InvalidInput)
    }

    /// Faults that indicate corrupted contact chains.
    pub fn is_integrity_fault(&self) -> bool {
        matches!(
            self,
            IdentifyError::NotFound(_) | IdentifyError::DataIntegrity(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, IdentifyError>;
