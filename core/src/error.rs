use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid reference date '{value}': expected YYYY-MM-DD")]
    InvalidReferenceDate { value: String },

    #[error("Deadline exceeded during {phase}")]
    DeadlineExceeded { phase: &'static str },

    #[error("Client '{client_id}' not found")]
    ClientNotFound { client_id: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
