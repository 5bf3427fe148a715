// Document storage.
//
// `DocumentTx` is one storage transaction: every orchestrator step runs
// through it and nothing is visible to other requests until `commit`.
// Dropping a transaction without committing discards all of its writes.

pub mod memory;
pub mod postgres;

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use docket_common::snapshot::DocumentSnapshot;
use docket_common::types::{Document, DocumentKind, DocumentStatus, Item, Remark, Signature};
use serde_json::{Map, Value};
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::engine::{
    self,
    error::DocumentError,
    reconcile::{CollectionPlan, ItemFields, RemarkFields, SignatureFields},
};
use memory::{MemoryDocumentStore, MemoryTx};
use postgres::PgTx;

/// Root record of a document, without its child collections.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRoot {
    pub id: Uuid,
    pub kind: DocumentKind,
    pub number: String,
    pub name: String,
    pub status: DocumentStatus,
    pub attributes: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Child collections of one document, each sorted by `order`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Children {
    pub items: Vec<Item>,
    pub remarks: Vec<Remark>,
    pub signatures: Vec<Signature>,
}

impl DocumentRoot {
    pub fn into_document(self, children: Children) -> Document {
        Document {
            id: self.id,
            kind: self.kind,
            number: self.number,
            name: self.name,
            status: self.status,
            created_at: self.created_at,
            modified_at: self.modified_at,
            deleted_at: self.deleted_at,
            items: children.items,
            remarks: children.remarks,
            signatures: children.signatures,
            attributes: self.attributes,
        }
    }
}

pub(crate) trait DocumentTx: Send {
    /// Active document, locked against other writers until this transaction ends.
    fn lock_root(
        &mut self,
        kind: DocumentKind,
        id: Uuid,
    ) -> impl Future<Output = anyhow::Result<Option<DocumentRoot>>> + Send;

    /// Active document without taking a write lock.
    fn load_root(
        &mut self,
        kind: DocumentKind,
        id: Uuid,
    ) -> impl Future<Output = anyhow::Result<Option<DocumentRoot>>> + Send;

    fn load_children(
        &mut self,
        document_id: Uuid,
    ) -> impl Future<Output = anyhow::Result<Children>> + Send;

    /// Names of active documents of `kind` equal to `candidate` or starting
    /// with `candidate ` (suffix filtering happens in the caller).
    fn names_in_use(
        &mut self,
        kind: DocumentKind,
        candidate: &str,
        exclude: Option<Uuid>,
    ) -> impl Future<Output = anyhow::Result<Vec<String>>> + Send;

    /// Atomically increment and return the counter for `(kind, year)`.
    fn next_sequence(
        &mut self,
        kind: DocumentKind,
        year: i32,
    ) -> impl Future<Output = anyhow::Result<u32>> + Send;

    fn insert_root(&mut self, root: &DocumentRoot) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn update_root(&mut self, root: &DocumentRoot) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn apply_items(
        &mut self,
        document_id: Uuid,
        plan: &CollectionPlan<ItemFields>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn apply_remarks(
        &mut self,
        document_id: Uuid,
        plan: &CollectionPlan<RemarkFields>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn apply_signatures(
        &mut self,
        document_id: Uuid,
        plan: &CollectionPlan<SignatureFields>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Returns false when no active document matched.
    fn soft_delete(
        &mut self,
        kind: DocumentKind,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = anyhow::Result<bool>> + Send;

    /// Removes the document and all of its children. Returns false when absent.
    fn hard_delete(
        &mut self,
        kind: DocumentKind,
        id: Uuid,
    ) -> impl Future<Output = anyhow::Result<bool>> + Send;

    fn commit(self) -> impl Future<Output = anyhow::Result<()>> + Send;
}

#[derive(Clone)]
pub enum DocumentStore {
    Postgres(PgPool),
    Memory(Arc<RwLock<MemoryDocumentStore>>),
}

impl DocumentStore {
    pub fn memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(MemoryDocumentStore::default())))
    }

    pub async fn create(
        &self,
        kind: DocumentKind,
        snapshot: DocumentSnapshot,
    ) -> Result<Document, DocumentError> {
        match self {
            Self::Postgres(pool) => {
                engine::create_document(PgTx::begin(pool).await?, kind, snapshot).await
            }
            Self::Memory(store) => {
                engine::create_document(MemoryTx::begin(store).await, kind, snapshot).await
            }
        }
    }

    pub async fn get(&self, kind: DocumentKind, id: Uuid) -> Result<Document, DocumentError> {
        match self {
            Self::Postgres(pool) => engine::load_document(PgTx::begin(pool).await?, kind, id).await,
            Self::Memory(store) => {
                store.read().await.document(kind, id).ok_or(DocumentError::NotFound)
            }
        }
    }

    pub async fn update(
        &self,
        kind: DocumentKind,
        id: Uuid,
        snapshot: DocumentSnapshot,
    ) -> Result<Document, DocumentError> {
        match self {
            Self::Postgres(pool) => {
                engine::update_document(PgTx::begin(pool).await?, kind, id, snapshot).await
            }
            Self::Memory(store) => {
                engine::update_document(MemoryTx::begin(store).await, kind, id, snapshot).await
            }
        }
    }

    pub async fn delete(&self, kind: DocumentKind, id: Uuid, hard: bool) -> Result<(), DocumentError> {
        match self {
            Self::Postgres(pool) => {
                engine::delete_document(PgTx::begin(pool).await?, kind, id, hard).await
            }
            Self::Memory(store) => {
                engine::delete_document(MemoryTx::begin(store).await, kind, id, hard).await
            }
        }
    }
}
