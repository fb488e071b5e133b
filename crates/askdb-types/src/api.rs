//! Request and response bodies for the HTTP surface.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub session_id: String,
}

/// Answer to an analytical question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskResponse {
    pub summary: String,
    #[serde(default)]
    pub insights: Option<String>,
}

impl AskResponse {
    /// A response carrying only a summary line (canned replies, rejections).
    pub fn summary_only(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            insights: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Which path the smart router took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    /// Canned reply, no model involved.
    Static,
    /// Analytical question answered through the SQL pipeline.
    Sql,
    /// Plain conversation with the language model.
    Chat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartResponse {
    pub reply: String,
    pub mode: ReplyMode,
}
