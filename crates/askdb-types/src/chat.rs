//! Persisted chat records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One question/answer exchange written to the append-only chat log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    pub session_id: String,
    pub user_message: String,
    /// Statement that was executed, if the exchange got that far.
    pub generated_sql: Option<String>,
    pub ai_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatRecord {
    pub fn new(
        session_id: impl Into<String>,
        user_message: impl Into<String>,
        generated_sql: Option<String>,
        ai_message: Option<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_message: user_message.into(),
            generated_sql,
            ai_message,
            created_at: Utc::now(),
        }
    }
}
