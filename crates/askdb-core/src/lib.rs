//! Core question answering for askdb: sessions, SQL generation and
//! sanitization, and read-only execution against the reporting database.

pub mod context;
mod db;
pub mod entity;
mod error;
mod executor;
pub mod intent;
pub mod llm;
mod pipeline;
pub mod prompt;
pub mod sanitizer;
mod schema;
mod session;
mod sweeper;

pub use db::{ChatLog, ChatLogStore};
pub use error::AskError;
pub use executor::{QueryExecutor, Row, SqliteExecutor};
pub use llm::{GenerationRequest, LanguageModel, LlmConfig, OpenAiClient};
pub use pipeline::{
    PipelineConfig, QueryPipeline, EMPTY_SUMMARY, NO_INSIGHT_FALLBACK, NO_ROWS_INSIGHT,
    RESULTS_SUMMARY,
};
pub use sanitizer::{sanitize, SanitizeOptions, SqlVerdict};
pub use schema::{format_schema, SchemaCache, SchemaSource, DEFAULT_SCHEMA_TTL};
pub use session::{SessionSnapshot, SessionStore};
pub use sweeper::SessionSweeper;

/// Result type for askdb operations.
pub type Result<T> = std::result::Result<T, AskError>;
