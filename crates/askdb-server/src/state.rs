//! Shared application state.

use crate::config::Config;
use askdb_core::{
    ChatLog, ChatLogStore, LanguageModel, OpenAiClient, PipelineConfig, QueryPipeline,
    SchemaCache, SessionStore, SqliteExecutor, prompt::DEFAULT_COLUMN_GUIDE,
};
use std::sync::Arc;
use tracing::info;

pub struct AppState {
    pub pipeline: Arc<QueryPipeline>,
    pub sessions: Arc<SessionStore>,
    pub config: Config,
}

impl AppState {
    /// Open both databases and build the pipeline with the OpenAI client.
    pub fn new(config: Config) -> askdb_core::Result<Self> {
        let executor = Arc::new(SqliteExecutor::open_read_only(
            &config.reporting_db_path,
            config.view_name.clone(),
        )?);
        info!(
            target: "askdb::startup",
            "Opened reporting database {:?} (view: {})",
            config.reporting_db_path,
            config.view_name
        );

        let chat_log = Arc::new(ChatLogStore::open(&config.chat_db_path)?);
        info!(target: "askdb::startup", "Opened chat log {:?}", config.chat_db_path);

        let model = Arc::new(OpenAiClient::from_env(config.llm.clone()));
        Ok(Self::from_parts(config, model, executor, chat_log))
    }

    /// Assemble state around already-built collaborators.
    pub fn from_parts(
        config: Config,
        model: Arc<dyn LanguageModel>,
        executor: Arc<SqliteExecutor>,
        chat_log: Arc<dyn ChatLog>,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new());
        let schema = SchemaCache::new(executor.clone(), config.schema_cache_ttl());
        let pipeline_config = PipelineConfig {
            view: config.view_name.clone(),
            row_limit: config.row_limit,
            column_guide: config
                .column_guide
                .clone()
                .unwrap_or_else(|| DEFAULT_COLUMN_GUIDE.to_string()),
        };
        let pipeline = Arc::new(QueryPipeline::new(
            sessions.clone(),
            model,
            executor,
            schema,
            chat_log,
            pipeline_config,
        ));

        Self {
            pipeline,
            sessions,
            config,
        }
    }
}
