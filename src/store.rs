//! Persistence boundary for documents, jobs, pages, sections and items.
//!
//! The pipeline only needs a handful of writes, each of which is a commit
//! point: job updates, the page batch, the section batch and one item batch
//! per completed section. A write that returned `Ok` is durable; nothing is
//! rolled back when a later step fails.
//!
//! [`MemoryStore`] is the in-process implementation used by the CLI and the
//! tests. A database-backed store implements the same trait.

use crate::error::StoreError;
use crate::model::{BudgetItem, Document, ImportJob, PageRecord, SectionRecord};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Storage used by an import job.
#[async_trait]
pub trait BudgetStore: Send + Sync {
    /// Look up a document by id.
    async fn document(&self, id: Uuid) -> Result<Option<Document>, StoreError>;

    /// Look up an import job by id.
    async fn job(&self, id: Uuid) -> Result<Option<ImportJob>, StoreError>;

    /// Persist the full current state of an existing job.
    async fn save_job(&self, job: &ImportJob) -> Result<(), StoreError>;

    async fn insert_pages(&self, pages: Vec<PageRecord>) -> Result<(), StoreError>;

    async fn insert_sections(&self, sections: Vec<SectionRecord>) -> Result<(), StoreError>;

    /// Commit one section's items, in order.
    async fn insert_items(&self, items: Vec<BudgetItem>) -> Result<(), StoreError>;
}

/// Everything stored for one document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentSnapshot {
    pub document: Option<Document>,
    pub jobs: Vec<ImportJob>,
    pub pages: Vec<PageRecord>,
    pub sections: Vec<SectionRecord>,
    pub items: Vec<BudgetItem>,
}

#[derive(Default)]
struct Tables {
    documents: HashMap<Uuid, Document>,
    jobs: HashMap<Uuid, ImportJob>,
    pages: Vec<PageRecord>,
    sections: Vec<SectionRecord>,
    items: Vec<BudgetItem>,
}

/// Thread-safe in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    /// Register a new document.
    pub fn insert_document(&self, document: Document) -> Result<(), StoreError> {
        let mut t = self.lock()?;
        if t.documents.contains_key(&document.id) {
            return Err(StoreError::Duplicate(format!("document {}", document.id)));
        }
        t.documents.insert(document.id, document);
        Ok(())
    }

    /// Register a new job for an existing document.
    pub fn insert_job(&self, job: ImportJob) -> Result<(), StoreError> {
        let mut t = self.lock()?;
        if t.jobs.contains_key(&job.id) {
            return Err(StoreError::Duplicate(format!("job {}", job.id)));
        }
        t.jobs.insert(job.id, job);
        Ok(())
    }

    /// Copy out every record belonging to `document_id`.
    pub fn snapshot(&self, document_id: Uuid) -> Result<DocumentSnapshot, StoreError> {
        let t = self.lock()?;
        let mut jobs: Vec<ImportJob> = t
            .jobs
            .values()
            .filter(|j| j.document_id == document_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);

        Ok(DocumentSnapshot {
            document: t.documents.get(&document_id).cloned(),
            jobs,
            pages: t
                .pages
                .iter()
                .filter(|p| p.document_id == document_id)
                .cloned()
                .collect(),
            sections: t
                .sections
                .iter()
                .filter(|s| s.document_id == document_id)
                .cloned()
                .collect(),
            items: t
                .items
                .iter()
                .filter(|i| i.document_id == document_id)
                .cloned()
                .collect(),
        })
    }
}

#[async_trait]
impl BudgetStore for MemoryStore {
    async fn document(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        Ok(self.lock()?.documents.get(&id).cloned())
    }

    async fn job(&self, id: Uuid) -> Result<Option<ImportJob>, StoreError> {
        Ok(self.lock()?.jobs.get(&id).cloned())
    }

    async fn save_job(&self, job: &ImportJob) -> Result<(), StoreError> {
        let mut t = self.lock()?;
        match t.jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(format!("job {}", job.id))),
        }
    }

    async fn insert_pages(&self, pages: Vec<PageRecord>) -> Result<(), StoreError> {
        self.lock()?.pages.extend(pages);
        Ok(())
    }

    async fn insert_sections(&self, sections: Vec<SectionRecord>) -> Result<(), StoreError> {
        self.lock()?.sections.extend(sections);
        Ok(())
    }

    async fn insert_items(&self, items: Vec<BudgetItem>) -> Result<(), StoreError> {
        self.lock()?.items.extend(items);
        Ok(())
    }
}
