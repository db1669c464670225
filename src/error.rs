use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Field id must not be empty")]
    EmptyId,
    #[error("Duplicate field id: {0}")]
    DuplicateId(String),
    #[error("Field id is reserved for the session identifier: {0}")]
    ReservedId(String),
}

/// Failure of a single round trip to the collector. Only ever logged; the
/// user sees the configured generic failure message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Invalid collector url: {0}")]
    InvalidUrl(String),
    #[error("Transport failed: {0}")]
    Transport(String),
    #[error("Collector answered with status {0}")]
    Status(u16),
    #[error("Payload could not be encoded: {0}")]
    Encode(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("Unknown field: {0}")]
    UnknownField(String),
    #[error("Form state is already being updated")]
    StateBusy,
    #[error("Submission outcomes come from the collector, not from callers")]
    OutcomeNotDispatchable,
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

pub type Result<T, E = FormError> = std::result::Result<T, E>;
