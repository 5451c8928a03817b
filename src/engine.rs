//! Question answering end to end.
//!
//! ```text
//! question ──▶ AmbiguityDetector ──slot──▶ Answer::NeedsClarification(ctx)
//!                    │                               │ resolve(ctx, choice)
//!                    │ nothing missing               ▼
//!                    ▼                     ClarificationApplier ──▶ (again)
//!          ┌─────────────────────┐
//!          │ LLM (with timeout)  │── fails / unparseable ──┐
//!          └──────────┬──────────┘                         ▼
//!                     │                         RuleBasedGenerator
//!                     ▼                                    │
//!          SqlStructuralValidator ◀────────────────────────┘
//!                     │
//!                     ▼
//!          Answer::Ready(PreparedQuery) ──execute──▶ StorageEngine
//! ```
//!
//! The engine keeps no per-question state. A question waiting on the user
//! lives in the [`ClarificationContext`] handed back to the caller.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::cache::{CacheError, CatalogCache};
use crate::catalog::{self, Catalog, CatalogLoadError, CatalogMode};
use crate::clarify::{
    AmbiguityDetector, ClarificationApplier, ClarificationContext, ClarificationError, SlotKey,
    ALL_REGIONS,
};
use crate::config::{CatalogSettings, ClarificationSettings, Settings, SettingsError};
use crate::generator::RuleBasedGenerator;
use crate::intent::{self, Intent, TimeWindow};
use crate::llm::{build_prompt, clean_sql_output, LlmError, OpenAiCompatibleClient, SqlGenerator};
use crate::sql::MalformedSqlError;
use crate::storage::{ExecutionError, QueryResult, SqliteStorage, StorageEngine};
use crate::validation::{SqlStructuralValidator, ValidatedSql, Warning};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogLoadError),

    #[error("Malformed SQL: {0}")]
    MalformedSql(#[from] MalformedSqlError),

    #[error("Execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Clarification error: {0}")]
    Clarification(#[from] ClarificationError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Settings(#[from] SettingsError),
}

pub type EngineResult<T> = Result<T, EngineError>;

// ============================================================================
// Answers
// ============================================================================

/// How the SQL of a prepared query was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMethod {
    Llm,
    RuleBased,
}

impl fmt::Display for GenerationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationMethod::Llm => write!(f, "LLM"),
            GenerationMethod::RuleBased => write!(f, "Rule-based"),
        }
    }
}

/// Validated SQL for a fully specified question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedQuery {
    /// The question after every clarification was applied.
    pub question: String,
    pub sql: String,
    pub warnings: Vec<Warning>,
    pub method: GenerationMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Answer {
    /// The context's pending slot must be answered first.
    NeedsClarification(ClarificationContext),
    Ready(PreparedQuery),
}

// ============================================================================
// Engine
// ============================================================================

pub struct Engine {
    catalog: Arc<Catalog>,
    storage: Arc<dyn StorageEngine>,
    llm: Option<Arc<dyn SqlGenerator>>,
    llm_timeout: Duration,
    clarification: ClarificationSettings,
}

impl Engine {
    pub fn new(catalog: Arc<Catalog>, storage: Arc<dyn StorageEngine>) -> Self {
        Self {
            catalog,
            storage,
            llm: None,
            llm_timeout: Duration::from_secs(30),
            clarification: ClarificationSettings::default(),
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn SqlGenerator>, timeout: Duration) -> Self {
        self.llm = Some(llm);
        self.llm_timeout = timeout;
        self
    }

    pub fn with_clarification(mut self, settings: ClarificationSettings) -> Self {
        self.clarification = settings;
        self
    }

    /// Open storage, build the catalog and connect the LLM as configured.
    pub async fn from_settings(settings: &Settings) -> EngineResult<Self> {
        let path = settings.storage.resolved_database()?;
        let storage = SqliteStorage::open(&path, settings.storage.row_limit)?;
        tracing::info!(database = %path.display(), "storage opened");

        let cache = if settings.catalog.cache_enabled
            && settings.catalog.mode == CatalogMode::Introspected
        {
            match CatalogCache::open() {
                Ok(cache) => Some(cache),
                Err(e) => {
                    tracing::warn!(error = %e, "catalog cache unavailable");
                    None
                }
            }
        } else {
            None
        };
        let catalog = load_catalog(&settings.catalog, &storage, cache.as_ref()).await?;

        let mut engine = Engine::new(Arc::new(catalog), Arc::new(storage))
            .with_clarification(settings.clarification.clone());

        if settings.llm.enabled {
            match OpenAiCompatibleClient::new(&settings.llm) {
                Ok(client) => {
                    tracing::info!(model = %settings.llm.model, endpoint = %client.endpoint(), "LLM enabled");
                    engine = engine.with_llm(Arc::new(client), settings.llm.timeout());
                }
                Err(e) => tracing::warn!(error = %e, "LLM client unavailable, using rule-based generation"),
            }
        }
        Ok(engine)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Answer a question, or continue one.
    ///
    /// With a context whose slot is pending, `question` is the user's reply
    /// to that slot.
    pub async fn ask(
        &self,
        question: &str,
        context: Option<ClarificationContext>,
    ) -> EngineResult<Answer> {
        match context {
            Some(context) if context.pending.is_some() => self.resolve(context, question).await,
            Some(context) => self.advance(context).await,
            None => self.advance(ClarificationContext::new(question)).await,
        }
    }

    /// Apply the user's choice for the pending slot and continue.
    pub async fn resolve(
        &self,
        mut context: ClarificationContext,
        input: &str,
    ) -> EngineResult<Answer> {
        let applier = ClarificationApplier::new(&self.catalog);
        context.answer(&applier, input)?;
        self.advance(context).await
    }

    /// Run a prepared query.
    pub async fn execute(&self, query: &PreparedQuery) -> EngineResult<QueryResult> {
        let result = self.storage.execute(&query.sql).await?;
        tracing::info!(rows = result.row_count(), truncated = result.truncated, "query executed");
        Ok(result)
    }

    /// Parse and repair SQL text against this engine's catalog.
    pub fn validate(&self, sql: &str) -> EngineResult<ValidatedSql> {
        Ok(SqlStructuralValidator::new(&self.catalog).validate_text(sql)?)
    }

    async fn advance(&self, context: ClarificationContext) -> EngineResult<Answer> {
        if self.clarification.enabled {
            let detector = AmbiguityDetector::new(&self.catalog, &self.clarification);
            let slot = detector
                .next_slot(&context.question, &context.resolved, self.storage.as_ref())
                .await;
            if let Some(slot) = slot {
                tracing::info!(context = %context.id, slot = %slot.key, "asking for clarification");
                return Ok(Answer::NeedsClarification(context.with_pending(slot)));
            }
        }
        Ok(Answer::Ready(self.prepare(&context).await))
    }

    async fn prepare(&self, context: &ClarificationContext) -> PreparedQuery {
        if let Some(llm) = &self.llm {
            match self.generate_with_llm(llm.as_ref(), &context.question).await {
                Ok(validated) => {
                    tracing::info!(method = %GenerationMethod::Llm, "SQL prepared");
                    return PreparedQuery {
                        question: context.question.clone(),
                        sql: validated.sql,
                        warnings: validated.warnings,
                        method: GenerationMethod::Llm,
                    };
                }
                Err(e) => tracing::warn!(error = %e, "LLM generation failed, falling back to rules"),
            }
        }

        let intent = self.intent_for(context);
        let statement = RuleBasedGenerator::generate(&intent, &self.catalog);
        let (statement, warnings) =
            SqlStructuralValidator::new(&self.catalog).validate_and_fix(statement);
        tracing::info!(method = %GenerationMethod::RuleBased, "SQL prepared");
        PreparedQuery {
            question: context.question.clone(),
            sql: statement.to_sql(),
            warnings,
            method: GenerationMethod::RuleBased,
        }
    }

    async fn generate_with_llm(
        &self,
        llm: &dyn SqlGenerator,
        question: &str,
    ) -> Result<ValidatedSql, LlmError> {
        let prompt = build_prompt(&self.catalog, question);
        let raw = tokio::time::timeout(self.llm_timeout, llm.generate(&prompt))
            .await
            .map_err(|_| LlmError::Timeout(self.llm_timeout))??;
        let sql = clean_sql_output(&raw);
        tracing::debug!(%sql, "LLM output");
        SqlStructuralValidator::new(&self.catalog)
            .validate_text(&sql)
            .map_err(|e| LlmError::Unparseable(e.to_string()))
    }

    /// Intent of the clarified question, with resolved slots that the text
    /// alone may not carry.
    fn intent_for(&self, context: &ClarificationContext) -> Intent {
        let mut intent = intent::extract(&context.question, &self.catalog);
        if let Some(window) = context
            .resolved_value(SlotKey::TimeRange)
            .and_then(TimeWindow::from_slot_value)
        {
            intent = intent.with_time_window(window);
        }
        if let Some(region) = context
            .resolved_value(SlotKey::Region)
            .filter(|r| !r.eq_ignore_ascii_case(ALL_REGIONS))
        {
            intent = intent.with_region(region);
        }
        intent
    }
}

// ============================================================================
// Catalog loading
// ============================================================================

/// Build the catalog the settings ask for.
///
/// A saved document is used as is in predefined mode. In introspected mode
/// it is merged over the live schema, so curated entries win and new
/// columns still appear. A cache hit skips column profiling.
pub async fn load_catalog(
    settings: &CatalogSettings,
    storage: &dyn StorageEngine,
    cache: Option<&CatalogCache>,
) -> EngineResult<Catalog> {
    let curated = match settings.resolved_document()? {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading catalog document");
            Some(Catalog::from_json_file(&path)?)
        }
        None => None,
    };

    if settings.mode == CatalogMode::Predefined {
        return match curated {
            Some(catalog) => Ok(catalog),
            None => Ok(catalog::load(CatalogMode::Predefined, storage, &settings.classify_options()).await?),
        };
    }

    let descriptors = storage
        .introspect_schema()
        .await
        .map_err(|e| CatalogLoadError::Introspection(e.to_string()))?;

    let cached = match cache {
        Some(cache) => cache.catalog(&descriptors)?,
        None => None,
    };
    let fresh = match cached {
        Some(catalog) => {
            tracing::info!(tables = catalog.len(), "catalog cache hit");
            catalog
        }
        None => {
            let catalog =
                catalog::introspect_tables(storage, &descriptors, &settings.classify_options()).await?;
            if let Some(cache) = cache {
                if let Err(e) = cache.store_catalog(&descriptors, &catalog) {
                    tracing::warn!(error = %e, "failed to cache catalog");
                }
            }
            catalog
        }
    };

    Ok(match curated {
        Some(curated) => curated.merge(&fresh),
        None => fresh,
    })
}
