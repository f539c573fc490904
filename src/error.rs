use thiserror::Error;

/// Main error type for Chatsnip
#[derive(Error, Debug)]
pub enum ChatsnipError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Outbound HTTP transport errors (image retrieval)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Submission carried no API key
    #[error("API key missing.")]
    ApiKeyMissing,

    /// Submission carried an API key no profile owns
    #[error("Invalid API key.")]
    InvalidApiKey,

    /// Referenced chat does not exist
    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    /// Referenced code fragment does not exist
    #[error("Code fragment not found: {0}")]
    FragmentNotFound(i64),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using ChatsnipError
pub type Result<T> = std::result::Result<T, ChatsnipError>;
