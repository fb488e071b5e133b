//! The question-to-answer pipeline.
//!
//! Blocking from end to end: callers on an async runtime run it through
//! `spawn_blocking`. Session state is read and written through the store's
//! per-call API, so no lock is held while the model or database is busy.

use crate::context::ContextScope;
use crate::db::ChatLog;
use crate::entity::{extract_from_sql, extract_from_text};
use crate::executor::QueryExecutor;
use crate::intent::{classify_message, static_reply, MessageKind};
use crate::llm::{GenerationRequest, LanguageModel};
use crate::prompt::DEFAULT_COLUMN_GUIDE;
use crate::sanitizer::{sanitize, SanitizeOptions, SqlVerdict};
use crate::schema::SchemaCache;
use crate::session::SessionStore;
use crate::{AskError, Result};
use askdb_types::{AskResponse, ChatRecord, ReplyMode, Role, SmartResponse};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const NO_ROWS_INSIGHT: &str = "I couldn't find any records matching your request.";
pub const NO_INSIGHT_FALLBACK: &str = "No insights available.";
pub const RESULTS_SUMMARY: &str = "Here are the results.";
pub const EMPTY_SUMMARY: &str = "No matching records found.";

/// Pipeline stages, in the order a question passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Received,
    EntityCaptured,
    StaticShortcut,
    ContextDecided,
    SqlGenerated,
    SqlSanitized,
    Executed,
    Summarized,
    Recorded,
    Responded,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Reporting view the model is told to query.
    pub view: String,
    pub row_limit: usize,
    pub column_guide: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            view: "v_open_order".to_string(),
            row_limit: 100,
            column_guide: DEFAULT_COLUMN_GUIDE.to_string(),
        }
    }
}

/// Turns questions into executed, summarized SQL answers.
pub struct QueryPipeline {
    sessions: Arc<SessionStore>,
    model: Arc<dyn LanguageModel>,
    executor: Arc<dyn QueryExecutor>,
    schema: SchemaCache,
    chat_log: Arc<dyn ChatLog>,
    config: PipelineConfig,
}

impl QueryPipeline {
    pub fn new(
        sessions: Arc<SessionStore>,
        model: Arc<dyn LanguageModel>,
        executor: Arc<dyn QueryExecutor>,
        schema: SchemaCache,
        chat_log: Arc<dyn ChatLog>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            sessions,
            model,
            executor,
            schema,
            chat_log,
            config,
        }
    }

    fn stage(&self, session_id: &str, stage: Stage) {
        debug!(target: "askdb::pipeline", "[{}] {:?}", session_id, stage);
    }

    /// Answer an analytical question within a session.
    ///
    /// A sanitizer rejection is not an error: it comes back as a summary of
    /// the form `Rejected SQL: <reason>`.
    pub fn ask(&self, session_id: &str, question: &str) -> Result<AskResponse> {
        self.stage(session_id, Stage::Received);
        self.sessions.append_turn(session_id, Role::User, question);
        let history = self.sessions.history_text(session_id);

        if let Some(item) = extract_from_text(question) {
            self.sessions.set_last_entity(session_id, &item);
            self.stage(session_id, Stage::EntityCaptured);
        }

        if let Some(reply) = static_reply(question) {
            self.stage(session_id, Stage::StaticShortcut);
            self.sessions.append_turn(session_id, Role::Assistant, reply);
            return Ok(AskResponse::summary_only(reply));
        }

        let last_entity = self.sessions.get_last_entity(session_id);
        let mut scope = ContextScope::decide(question, &history, last_entity.as_deref());
        let effective_question = if scope.uses_context {
            self.rewrite(question, &scope)
        } else {
            debug!(target: "askdb::pipeline", "[{}] No context reference, fresh start", session_id);
            question.to_string()
        };
        self.stage(session_id, Stage::ContextDecided);

        let schema = self.schema.snapshot().map_err(|e| {
            error!(target: "askdb::pipeline", "[{}] {}", session_id, e);
            e
        })?;
        let request = GenerationRequest {
            question: &effective_question,
            schema: &schema,
            view: &self.config.view,
            column_guide: &self.config.column_guide,
            history: &scope.history,
            entity_hint: scope.entity.as_deref(),
            row_limit: self.config.row_limit,
        };
        let candidate = self.model.generate_sql(&request).map_err(|e| {
            error!(target: "askdb::pipeline", "[{}] SQL generation failed: {}", session_id, e);
            match e {
                AskError::Generation(_) => e,
                other => AskError::Generation(other.to_string()),
            }
        })?;
        self.stage(session_id, Stage::SqlGenerated);
        debug!(target: "askdb::pipeline", "[{}] Candidate SQL: {}", session_id, candidate);

        // The item the statement actually filters on wins over the hint.
        if let Some(item) = extract_from_sql(&candidate) {
            debug!(target: "askdb::pipeline", "[{}] SQL filters on {}", session_id, item);
            self.sessions.set_last_entity(session_id, &item);
            scope.entity = Some(item);
        }

        let allowed: Vec<String> = scope.entity.iter().cloned().collect();
        let verdict = sanitize(
            &candidate,
            &SanitizeOptions {
                question,
                allowed_entities: &allowed,
                row_limit: self.config.row_limit,
            },
        );
        self.stage(session_id, Stage::SqlSanitized);

        let sql = match verdict {
            SqlVerdict::Accepted(sql) => sql,
            SqlVerdict::Rejected { reason, .. } => {
                warn!(target: "askdb::pipeline", "[{}] Rejected SQL: {}", session_id, reason);
                let message = format!("Rejected SQL: {}", reason);
                self.sessions
                    .append_turn(session_id, Role::Assistant, &message);
                return Ok(AskResponse::summary_only(message));
            }
        };

        let rows = match self.executor.execute(&sql) {
            Ok(rows) => rows,
            Err(e) => {
                let err = match e {
                    AskError::Execution(_) => e,
                    other => AskError::Execution(other.to_string()),
                };
                error!(target: "askdb::pipeline", "[{}] {} ({})", session_id, err, sql);
                self.sessions
                    .append_turn(session_id, Role::Assistant, &err.to_string());
                return Err(err);
            }
        };
        self.stage(session_id, Stage::Executed);

        let insights = if rows.is_empty() {
            NO_ROWS_INSIGHT.to_string()
        } else {
            self.summarize(question, &sql, &rows)
        };
        self.stage(session_id, Stage::Summarized);

        let record = ChatRecord::new(
            session_id,
            question,
            Some(sql.clone()),
            Some(insights.clone()),
        );
        match self.chat_log.append_record(&record) {
            Ok(()) => self.stage(session_id, Stage::Recorded),
            Err(e) => warn!(target: "askdb::pipeline", "[{}] Chat record not saved: {}", session_id, e),
        }

        self.sessions
            .append_turn(session_id, Role::Assistant, &insights);
        self.stage(session_id, Stage::Responded);
        info!(
            target: "askdb::pipeline",
            "[{}] Answered with {} rows",
            session_id,
            rows.len()
        );

        let summary = if rows.is_empty() {
            EMPTY_SUMMARY
        } else {
            RESULTS_SUMMARY
        };
        Ok(AskResponse {
            summary: summary.to_string(),
            insights: Some(insights),
        })
    }

    fn rewrite(&self, question: &str, scope: &ContextScope) -> String {
        match self
            .model
            .rewrite_question(question, &scope.history, scope.entity.as_deref())
        {
            Ok(rewritten) if !rewritten.trim().is_empty() => {
                debug!(target: "askdb::pipeline", "Rewrote question: {}", rewritten);
                rewritten
            }
            Ok(_) => question.to_string(),
            Err(e) => {
                warn!(target: "askdb::pipeline", "Question rewrite failed, using original: {}", e);
                question.to_string()
            }
        }
    }

    fn summarize(&self, question: &str, sql: &str, rows: &[crate::executor::Row]) -> String {
        let rows_json = match serde_json::to_string(rows) {
            Ok(json) => json,
            Err(e) => {
                warn!(target: "askdb::pipeline", "Could not serialize rows: {}", e);
                return NO_INSIGHT_FALLBACK.to_string();
            }
        };
        match self.model.summarize(question, sql, &rows_json) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => NO_INSIGHT_FALLBACK.to_string(),
            Err(e) => {
                warn!(target: "askdb::pipeline", "Summary failed: {}", e);
                NO_INSIGHT_FALLBACK.to_string()
            }
        }
    }

    /// Free conversation with the session history as context.
    pub fn converse(&self, session_id: &str, message: &str) -> Result<String> {
        let history = self.sessions.get_history(session_id);
        let reply = self.model.chat(&history, message).map_err(|e| {
            error!(target: "askdb::pipeline", "[{}] Chat failed: {}", session_id, e);
            e
        })?;
        self.sessions.append_turn(session_id, Role::User, message);
        self.sessions
            .append_turn(session_id, Role::Assistant, &reply);
        Ok(reply)
    }

    /// Pick a canned reply, the SQL pipeline, or plain chat for a message.
    pub fn route(&self, session_id: &str, message: &str) -> Result<SmartResponse> {
        let text = message.trim();
        if let Some(reply) = static_reply(text) {
            return Ok(SmartResponse {
                reply: reply.to_string(),
                mode: ReplyMode::Static,
            });
        }

        match classify_message(text) {
            MessageKind::Analytical => {
                let resp = self.ask(session_id, text)?;
                Ok(SmartResponse {
                    reply: resp.insights.unwrap_or(resp.summary),
                    mode: ReplyMode::Sql,
                })
            }
            MessageKind::Chat => Ok(SmartResponse {
                reply: self.converse(session_id, text)?,
                mode: ReplyMode::Chat,
            }),
        }
    }
}
