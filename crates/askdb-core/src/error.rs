//! Error types for askdb.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AskError {
    /// The text-generation service failed or timed out.
    #[error("Failed to generate a query for this question: {0}")]
    Generation(String),

    #[error("Schema unavailable: {0}")]
    Schema(String),

    /// The reporting database rejected the statement.
    #[error("Query failed: {0}")]
    Execution(String),

    #[error("Failed to record chat: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl AskError {
    /// Text safe to show to the person asking.
    ///
    /// Generation failures stay generic; execution failures carry the
    /// database's own message.
    pub fn user_message(&self) -> String {
        match self {
            AskError::Generation(_) => {
                "Sorry, I couldn't turn that question into a query. Please try rephrasing it."
                    .to_string()
            }
            AskError::Execution(_) => self.to_string(),
            _ => "Something went wrong while answering your question.".to_string(),
        }
    }
}
