use thiserror::Error;

/// Failure taxonomy of a tailoring request.
///
/// `StructuralCorruption` is produced by the validator but recovered inside the pipeline;
/// callers only see it when they run the validator directly.
#[derive(Debug, Error)]
pub enum TailorError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("malformed package: {0}")]
    MalformedPackage(String),

    #[error("no text content found in document")]
    NoContentFound,

    #[error("invalid AI response: {0}")]
    InvalidAiResponse(String),

    #[error("structural corruption: {0}")]
    StructuralCorruption(String),

    #[error("collaborator call failed: {0}")]
    CollaboratorFailed(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl TailorError {
    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            TailorError::InvalidInput(_) => "INVALID_INPUT",
            TailorError::MalformedPackage(_) => "MALFORMED_PACKAGE",
            TailorError::NoContentFound => "NO_CONTENT_FOUND",
            TailorError::InvalidAiResponse(_) => "INVALID_AI_RESPONSE",
            TailorError::StructuralCorruption(_) => "STRUCTURAL_CORRUPTION",
            TailorError::CollaboratorFailed(_) => "COLLABORATOR_FAILED",
            TailorError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn malformed(err: anyhow::Error) -> Self {
        TailorError::MalformedPackage(format!("{err:#}"))
    }
}

pub type TailorResult<T> = Result<T, TailorError>;
