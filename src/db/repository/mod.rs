//! Repository layer: entity-scoped database operations.
//!
//! Free functions take a `&Connection`; the store traits wrap them for
//! callers that hold the database behind shared state.

mod drafts;
mod templates;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use uuid::Uuid;

use super::{open_database, open_memory_database, DatabaseError};
use crate::models::StoredDraft;
use crate::pipeline::template::TemplateDescriptor;

pub use drafts::*;
pub use templates::*;

/// Keyed persistence for review drafts.
pub trait DraftStore: Send + Sync {
    fn put_draft(&self, draft: &StoredDraft) -> Result<(), DatabaseError>;
    fn get_draft(&self, session_id: &str) -> Result<Option<StoredDraft>, DatabaseError>;
    fn list_drafts(&self) -> Result<Vec<StoredDraft>, DatabaseError>;
    fn delete_draft(&self, session_id: &str) -> Result<bool, DatabaseError>;
}

/// Persistence for custom templates and their source documents.
pub trait TemplateStore: Send + Sync {
    fn insert_template(&self, descriptor: &TemplateDescriptor, source: &[u8]) -> Result<(), DatabaseError>;
    fn update_template(
        &self,
        descriptor: &TemplateDescriptor,
        source: Option<&[u8]>,
    ) -> Result<(), DatabaseError>;
    fn get_template(&self, id: &Uuid) -> Result<Option<TemplateDescriptor>, DatabaseError>;
    fn get_template_source(&self, id: &Uuid) -> Result<Option<Vec<u8>>, DatabaseError>;
    fn list_templates(&self, owner_session: &str) -> Result<Vec<TemplateDescriptor>, DatabaseError>;
    fn delete_template(&self, id: &Uuid) -> Result<bool, DatabaseError>;
}

/// SQLite-backed store sharing one connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: Mutex::new(open_database(path)?),
        })
    }

    pub fn in_memory() -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: Mutex::new(open_memory_database()?),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }
}

impl DraftStore for SqliteStore {
    fn put_draft(&self, draft: &StoredDraft) -> Result<(), DatabaseError> {
        upsert_draft(&*self.conn()?, draft)
    }

    fn get_draft(&self, session_id: &str) -> Result<Option<StoredDraft>, DatabaseError> {
        get_draft(&*self.conn()?, session_id)
    }

    fn list_drafts(&self) -> Result<Vec<StoredDraft>, DatabaseError> {
        list_drafts(&*self.conn()?)
    }

    fn delete_draft(&self, session_id: &str) -> Result<bool, DatabaseError> {
        delete_draft(&*self.conn()?, session_id)
    }
}

impl TemplateStore for SqliteStore {
    fn insert_template(&self, descriptor: &TemplateDescriptor, source: &[u8]) -> Result<(), DatabaseError> {
        insert_template(&*self.conn()?, descriptor, source)
    }

    fn update_template(
        &self,
        descriptor: &TemplateDescriptor,
        source: Option<&[u8]>,
    ) -> Result<(), DatabaseError> {
        update_template(&*self.conn()?, descriptor, source)
    }

    fn get_template(&self, id: &Uuid) -> Result<Option<TemplateDescriptor>, DatabaseError> {
        get_template(&*self.conn()?, id)
    }

    fn get_template_source(&self, id: &Uuid) -> Result<Option<Vec<u8>>, DatabaseError> {
        get_template_source(&*self.conn()?, id)
    }

    fn list_templates(&self, owner_session: &str) -> Result<Vec<TemplateDescriptor>, DatabaseError> {
        list_templates(&*self.conn()?, owner_session)
    }

    fn delete_template(&self, id: &Uuid) -> Result<bool, DatabaseError> {
        delete_template(&*self.conn()?, id)
    }
}
