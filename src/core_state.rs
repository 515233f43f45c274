//! Shared application state for the HTTP layer.
//!
//! One `CoreState` is built at startup and wrapped in `Arc`. It owns the
//! store, live review sessions and the two job registries.

use std::sync::Arc;

use thiserror::Error;

use crate::config::ServiceConfig;
use crate::db::{DatabaseError, DraftStore, SqliteStore, TemplateStore};
use crate::pipeline::extraction::{DocumentExtractor, NormalizedExtraction, PdfTextLayerExtractor};
use crate::pipeline::jobs::JobRegistry;
use crate::pipeline::render::{RenderContext, RenderedDocument};
use crate::pipeline::validation::ValidationContext;
use crate::workflow::{spawn_autosave, AutosaveHandle, SessionRegistry};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Lock poisoned")]
    LockPoisoned,
}

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    pub config: ServiceConfig,
    store: Arc<SqliteStore>,
    sessions: Arc<SessionRegistry>,
    extractor: Arc<dyn DocumentExtractor>,
    pub extractions: JobRegistry<NormalizedExtraction>,
    pub renders: JobRegistry<RenderedDocument>,
}

impl CoreState {
    /// Open the configured database file.
    pub fn open(config: ServiceConfig) -> Result<Self, CoreError> {
        if let Some(dir) = config.database_path.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                tracing::warn!(path = %dir.display(), error = %e, "Cannot create data directory");
            }
        }
        let store = SqliteStore::open(&config.database_path)?;
        tracing::info!(path = %config.database_path.display(), "Database opened");
        Ok(Self::with_store(config, store, Arc::new(PdfTextLayerExtractor)))
    }

    /// State over an in-memory database.
    pub fn in_memory(config: ServiceConfig) -> Result<Self, CoreError> {
        Ok(Self::with_store(
            config,
            SqliteStore::in_memory()?,
            Arc::new(PdfTextLayerExtractor),
        ))
    }

    pub fn with_store(
        config: ServiceConfig,
        store: SqliteStore,
        extractor: Arc<dyn DocumentExtractor>,
    ) -> Self {
        let store = Arc::new(store);
        let ctx = ValidationContext {
            profile_pharmacist: config.profile_pharmacist.clone(),
        };
        let sessions = Arc::new(
            SessionRegistry::new(store.clone(), ctx).with_idle_timeout(config.session_idle_timeout),
        );
        Self {
            extractions: JobRegistry::new(Some(config.extraction_timeout))
                .with_retention(config.job_retention),
            renders: JobRegistry::new(Some(config.render_timeout))
                .with_retention(config.job_retention),
            config,
            store,
            sessions,
            extractor,
        }
    }

    // ── Accessors ───────────────────────────────────────────

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn drafts(&self) -> &dyn DraftStore {
        self.store.as_ref()
    }

    pub fn templates(&self) -> &dyn TemplateStore {
        self.store.as_ref()
    }

    /// Shared handle for work that outlives the request.
    pub fn template_store(&self) -> Arc<dyn TemplateStore> {
        self.store.clone()
    }

    pub fn extractor(&self) -> Arc<dyn DocumentExtractor> {
        self.extractor.clone()
    }

    pub fn render_context(&self) -> RenderContext {
        RenderContext {
            profile_pharmacist: self.config.profile_pharmacist.clone(),
            static_pharmacist: self.config.default_pharmacist.clone(),
        }
    }

    /// Start the periodic draft flush. Needs a running runtime.
    pub fn start_autosave(&self) -> AutosaveHandle {
        spawn_autosave(self.sessions.clone(), self.config.autosave_interval)
    }
}
