use thiserror::Error;

/// Error taxonomy for the quiz server.
///
/// The business-rule variants render as the exact `error` event message the
/// originating client receives; none of them mutate room state.
#[derive(Debug, Error)]
pub enum QuizError {
    #[error("Room not found.")]
    RoomNotFound,

    #[error("A name is required to join.")]
    NameRequired,

    #[error("That name is already taken.")]
    NameTaken,

    #[error("Only the host can do that.")]
    NotHost,

    #[error("Add questions before starting.")]
    NoQuestions,

    #[error("Invalid message.")]
    MalformedMessage,

    /// Store errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize message: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Convenience type alias for Results using QuizError
pub type Result<T> = std::result::Result<T, QuizError>;

impl QuizError {
    /// Business-rule rejections are expected traffic and logged at debug;
    /// everything else is an operational failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            QuizError::RoomNotFound
                | QuizError::NameRequired
                | QuizError::NameTaken
                | QuizError::NotHost
                | QuizError::NoQuestions
                | QuizError::MalformedMessage
        )
    }
}
