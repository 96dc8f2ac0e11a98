use thiserror::Error;

#[derive(Error, Debug)]
pub enum OdmError {
    #[error("Document type '{0}' is not registered")]
    UnknownType(String),

    #[error("Field '{0}' not defined for document type '{1}'")]
    UnknownField(String, String),

    #[error("Relation '{0}' not defined for document type '{1}'")]
    UnknownRelation(String, String),

    #[error("Conflicting modification: {0}")]
    ConflictingModification(String),

    #[error("Invalid id: {0}")]
    InvalidId(String),

    #[error("Missing id: {0}")]
    MissingId(String),

    #[error("Document is new: {0}")]
    DocumentIsNew(String),

    #[error("Detached instance: {0}")]
    Detached(String),

    #[error("Pending operations: {0}")]
    PendingOperations(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),
}

pub type Result<T> = std::result::Result<T, OdmError>;

impl From<std::io::Error> for OdmError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
