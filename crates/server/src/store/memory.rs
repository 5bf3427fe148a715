// In-memory document store.
//
// Tables are flat maps keyed by row id, mirroring the relational schema. A
// transaction holds the write guard for its whole lifetime and works on a
// copy; `commit` swaps the copy in, dropping the transaction discards it.
// Plain reads skip the transaction and share the read guard.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use docket_common::types::{Detail, Document, DocumentKind, Item, Remark, Signature};
use rust_decimal::Decimal;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

use super::{Children, DocumentRoot, DocumentTx};
use crate::engine::reconcile::{CollectionPlan, ItemFields, RemarkFields, SignatureFields};

#[derive(Debug, Clone, PartialEq)]
struct ItemRow {
    document_id: Uuid,
    order: i32,
    product_name: String,
    total: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
struct DetailRow {
    item_id: Uuid,
    order: i32,
    detail: String,
    unit_price: Decimal,
    qty: Decimal,
    amount: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
struct RemarkRow {
    document_id: Uuid,
    order: i32,
    text: String,
    is_completed: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct SignatureRow {
    document_id: Uuid,
    order: i32,
    name: String,
    position: String,
    image_ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryDocumentStore {
    documents: HashMap<Uuid, DocumentRoot>,
    items: HashMap<Uuid, ItemRow>,
    details: HashMap<Uuid, DetailRow>,
    remarks: HashMap<Uuid, RemarkRow>,
    signatures: HashMap<Uuid, SignatureRow>,
    counters: HashMap<(DocumentKind, i32), u32>,
}

impl MemoryDocumentStore {
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// No documents and no child rows. Counters are not considered.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
            && self.items.is_empty()
            && self.details.is_empty()
            && self.remarks.is_empty()
            && self.signatures.is_empty()
    }

    /// Child rows whose owner does not exist.
    pub fn orphan_count(&self) -> usize {
        let items = self
            .items
            .values()
            .filter(|row| !self.documents.contains_key(&row.document_id))
            .count();
        let details =
            self.details.values().filter(|row| !self.items.contains_key(&row.item_id)).count();
        let remarks = self
            .remarks
            .values()
            .filter(|row| !self.documents.contains_key(&row.document_id))
            .count();
        let signatures = self
            .signatures
            .values()
            .filter(|row| !self.documents.contains_key(&row.document_id))
            .count();
        items + details + remarks + signatures
    }

    /// The active document with its children, read in place.
    pub fn document(&self, kind: DocumentKind, id: Uuid) -> Option<Document> {
        self.active_root(kind, id).map(|root| root.clone().into_document(self.children(id)))
    }

    fn active_root(&self, kind: DocumentKind, id: Uuid) -> Option<&DocumentRoot> {
        self.documents
            .get(&id)
            .filter(|root| root.kind == kind && root.deleted_at.is_none())
    }

    fn children(&self, document_id: Uuid) -> Children {
        let mut items: Vec<Item> = self
            .items
            .iter()
            .filter(|(_, row)| row.document_id == document_id)
            .map(|(id, row)| {
                let mut details: Vec<Detail> = self
                    .details
                    .iter()
                    .filter(|(_, detail)| detail.item_id == *id)
                    .map(|(detail_id, detail)| Detail {
                        id: *detail_id,
                        order: detail.order,
                        detail: detail.detail.clone(),
                        unit_price: detail.unit_price,
                        qty: detail.qty,
                        amount: detail.amount,
                    })
                    .collect();
                details.sort_by_key(|detail| detail.order);
                Item {
                    id: *id,
                    order: row.order,
                    product_name: row.product_name.clone(),
                    details,
                    total: row.total,
                }
            })
            .collect();
        items.sort_by_key(|item| item.order);

        let mut remarks: Vec<Remark> = self
            .remarks
            .iter()
            .filter(|(_, row)| row.document_id == document_id)
            .map(|(id, row)| Remark {
                id: *id,
                order: row.order,
                text: row.text.clone(),
                is_completed: row.is_completed,
            })
            .collect();
        remarks.sort_by_key(|remark| remark.order);

        let mut signatures: Vec<Signature> = self
            .signatures
            .iter()
            .filter(|(_, row)| row.document_id == document_id)
            .map(|(id, row)| Signature {
                id: *id,
                order: row.order,
                name: row.name.clone(),
                position: row.position.clone(),
                image_ref: row.image_ref.clone(),
            })
            .collect();
        signatures.sort_by_key(|signature| signature.order);

        Children { items, remarks, signatures }
    }

    fn delete_item(&mut self, item_id: Uuid) {
        self.items.remove(&item_id);
        self.details.retain(|_, detail| detail.item_id != item_id);
    }
}

pub struct MemoryTx {
    guard: OwnedRwLockWriteGuard<MemoryDocumentStore>,
    working: MemoryDocumentStore,
}

impl MemoryTx {
    pub async fn begin(store: &Arc<RwLock<MemoryDocumentStore>>) -> Self {
        let guard = Arc::clone(store).write_owned().await;
        let working = guard.clone();
        Self { guard, working }
    }
}

impl DocumentTx for MemoryTx {
    async fn lock_root(
        &mut self,
        kind: DocumentKind,
        id: Uuid,
    ) -> anyhow::Result<Option<DocumentRoot>> {
        Ok(self.working.active_root(kind, id).cloned())
    }

    async fn load_root(
        &mut self,
        kind: DocumentKind,
        id: Uuid,
    ) -> anyhow::Result<Option<DocumentRoot>> {
        Ok(self.working.active_root(kind, id).cloned())
    }

    async fn load_children(&mut self, document_id: Uuid) -> anyhow::Result<Children> {
        Ok(self.working.children(document_id))
    }

    async fn names_in_use(
        &mut self,
        kind: DocumentKind,
        candidate: &str,
        exclude: Option<Uuid>,
    ) -> anyhow::Result<Vec<String>> {
        let prefix = format!("{candidate} ");
        Ok(self
            .working
            .documents
            .values()
            .filter(|root| root.kind == kind && root.deleted_at.is_none())
            .filter(|root| Some(root.id) != exclude)
            .filter(|root| root.name == candidate || root.name.starts_with(&prefix))
            .map(|root| root.name.clone())
            .collect())
    }

    async fn next_sequence(&mut self, kind: DocumentKind, year: i32) -> anyhow::Result<u32> {
        let counter = self.working.counters.entry((kind, year)).or_insert(0);
        *counter = counter
            .checked_add(1)
            .ok_or_else(|| anyhow::anyhow!("{kind} counter for {year} is exhausted"))?;
        Ok(*counter)
    }

    async fn insert_root(&mut self, root: &DocumentRoot) -> anyhow::Result<()> {
        if self.working.documents.values().any(|existing| existing.number == root.number) {
            anyhow::bail!("document number {} already exists", root.number);
        }
        self.working.documents.insert(root.id, root.clone());
        Ok(())
    }

    async fn update_root(&mut self, root: &DocumentRoot) -> anyhow::Result<()> {
        let stored = self
            .working
            .documents
            .get_mut(&root.id)
            .ok_or_else(|| anyhow::anyhow!("document {} vanished during update", root.id))?;
        *stored = root.clone();
        Ok(())
    }

    async fn apply_items(
        &mut self,
        document_id: Uuid,
        plan: &CollectionPlan<ItemFields>,
    ) -> anyhow::Result<()> {
        for id in &plan.deletes {
            self.working.delete_item(*id);
        }
        for row in &plan.rows {
            self.working.items.insert(
                row.id,
                ItemRow {
                    document_id,
                    order: row.order,
                    product_name: row.fields.product_name.clone(),
                    total: row.fields.total,
                },
            );

            let details = &row.fields.details;
            for id in &details.deletes {
                self.working.details.remove(id);
            }
            for detail in &details.rows {
                self.working.details.insert(
                    detail.id,
                    DetailRow {
                        item_id: row.id,
                        order: detail.order,
                        detail: detail.fields.detail.clone(),
                        unit_price: detail.fields.unit_price,
                        qty: detail.fields.qty,
                        amount: detail.fields.amount,
                    },
                );
            }
        }
        Ok(())
    }

    async fn apply_remarks(
        &mut self,
        document_id: Uuid,
        plan: &CollectionPlan<RemarkFields>,
    ) -> anyhow::Result<()> {
        for id in &plan.deletes {
            self.working.remarks.remove(id);
        }
        for row in &plan.rows {
            self.working.remarks.insert(
                row.id,
                RemarkRow {
                    document_id,
                    order: row.order,
                    text: row.fields.text.clone(),
                    is_completed: row.fields.is_completed,
                },
            );
        }
        Ok(())
    }

    async fn apply_signatures(
        &mut self,
        document_id: Uuid,
        plan: &CollectionPlan<SignatureFields>,
    ) -> anyhow::Result<()> {
        for id in &plan.deletes {
            self.working.signatures.remove(id);
        }
        for row in &plan.rows {
            self.working.signatures.insert(
                row.id,
                SignatureRow {
                    document_id,
                    order: row.order,
                    name: row.fields.name.clone(),
                    position: row.fields.position.clone(),
                    image_ref: row.fields.image_ref.clone(),
                },
            );
        }
        Ok(())
    }

    async fn soft_delete(
        &mut self,
        kind: DocumentKind,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        match self.working.documents.get_mut(&id) {
            Some(root) if root.kind == kind && root.deleted_at.is_none() => {
                root.deleted_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn hard_delete(&mut self, kind: DocumentKind, id: Uuid) -> anyhow::Result<bool> {
        if !self.working.documents.get(&id).is_some_and(|root| root.kind == kind) {
            return Ok(false);
        }
        self.working.documents.remove(&id);
        let item_ids: Vec<Uuid> = self
            .working
            .items
            .iter()
            .filter(|(_, row)| row.document_id == id)
            .map(|(item_id, _)| *item_id)
            .collect();
        for item_id in item_ids {
            self.working.delete_item(item_id);
        }
        self.working.remarks.retain(|_, row| row.document_id != id);
        self.working.signatures.retain(|_, row| row.document_id != id);
        Ok(true)
    }

    async fn commit(self) -> anyhow::Result<()> {
        let Self { mut guard, working } = self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::engine::reconcile::{plan_items, plan_remarks};
    use docket_common::snapshot::{DetailInput, ItemInput, RemarkInput};
    use docket_common::types::DocumentStatus;

    fn shared() -> Arc<RwLock<MemoryDocumentStore>> {
        Arc::new(RwLock::new(MemoryDocumentStore::default()))
    }

    fn root(kind: DocumentKind, name: &str, number: &str) -> DocumentRoot {
        let now = Utc::now();
        DocumentRoot {
            id: Uuid::new_v4(),
            kind,
            number: number.into(),
            name: name.into(),
            status: DocumentStatus::Draft,
            attributes: Map::new(),
            created_at: now,
            modified_at: now,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn uncommitted_writes_are_discarded() {
        let store = shared();
        let mut tx = MemoryTx::begin(&store).await;
        tx.insert_root(&root(DocumentKind::Quotation, "Acme", "QT-2025-0001")).await.unwrap();
        tx.next_sequence(DocumentKind::Quotation, 2025).await.unwrap();
        drop(tx);

        assert_eq!(*store.read().await, MemoryDocumentStore::default());
    }

    #[tokio::test]
    async fn counters_are_scoped_by_kind_and_year() {
        let store = shared();
        let mut tx = MemoryTx::begin(&store).await;
        assert_eq!(tx.next_sequence(DocumentKind::Invoice, 2025).await.unwrap(), 1);
        assert_eq!(tx.next_sequence(DocumentKind::Invoice, 2025).await.unwrap(), 2);
        assert_eq!(tx.next_sequence(DocumentKind::Invoice, 2026).await.unwrap(), 1);
        assert_eq!(tx.next_sequence(DocumentKind::Quotation, 2025).await.unwrap(), 1);
        tx.commit().await.unwrap();

        let mut tx = MemoryTx::begin(&store).await;
        assert_eq!(tx.next_sequence(DocumentKind::Invoice, 2025).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn names_in_use_skips_deleted_other_kinds_and_excluded() {
        let store = shared();
        let mut tx = MemoryTx::begin(&store).await;
        let acme = root(DocumentKind::Quotation, "Acme", "QT-1");
        let mut deleted = root(DocumentKind::Quotation, "Acme 02", "QT-2");
        deleted.deleted_at = Some(Utc::now());
        let invoice = root(DocumentKind::Invoice, "Acme 03", "INV-1");
        let suffixed = root(DocumentKind::Quotation, "Acme 04", "QT-3");
        let unrelated = root(DocumentKind::Quotation, "Acmeco", "QT-4");
        for document in [&acme, &deleted, &invoice, &suffixed, &unrelated] {
            tx.insert_root(document).await.unwrap();
        }

        let mut names = tx.names_in_use(DocumentKind::Quotation, "Acme", Some(suffixed.id)).await.unwrap();
        names.sort();
        assert_eq!(names, vec!["Acme".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_number_is_rejected() {
        let store = shared();
        let mut tx = MemoryTx::begin(&store).await;
        tx.insert_root(&root(DocumentKind::Quotation, "A", "QT-2025-0001")).await.unwrap();
        assert!(tx.insert_root(&root(DocumentKind::Quotation, "B", "QT-2025-0001")).await.is_err());
    }

    #[tokio::test]
    async fn children_come_back_in_planned_order_and_hard_delete_cascades() {
        let store = shared();
        let mut tx = MemoryTx::begin(&store).await;
        let document = root(DocumentKind::Quotation, "Acme", "QT-1");
        tx.insert_root(&document).await.unwrap();

        let items = plan_items(
            &[],
            vec![
                ItemInput { product_name: "first".into(), details: vec![DetailInput::default()], ..ItemInput::default() },
                ItemInput { product_name: "second".into(), ..ItemInput::default() },
            ],
        )
        .unwrap();
        let remarks = plan_remarks(&[], vec![RemarkInput { text: "note".into(), ..RemarkInput::default() }]).unwrap();
        tx.apply_items(document.id, &items).await.unwrap();
        tx.apply_remarks(document.id, &remarks).await.unwrap();

        let children = tx.load_children(document.id).await.unwrap();
        let names: Vec<&str> = children.items.iter().map(|item| item.product_name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(children.items[0].details.len(), 1);
        assert_eq!(children.remarks.len(), 1);

        let emptied = plan_items(&children.items, Vec::new()).unwrap();
        tx.apply_items(document.id, &emptied).await.unwrap();
        assert_eq!(tx.working.orphan_count(), 0);
        assert!(tx.load_children(document.id).await.unwrap().items.is_empty());

        assert!(tx.hard_delete(DocumentKind::Quotation, document.id).await.unwrap());
        assert!(tx.working.is_empty());
    }

    #[tokio::test]
    async fn get_shares_the_lock_with_other_readers() {
        let store = super::super::DocumentStore::memory();
        let created = store
            .create(
                DocumentKind::Quotation,
                serde_json::from_value(serde_json::json!({ "billTo": "Acme" })).unwrap(),
            )
            .await
            .unwrap();
        let super::super::DocumentStore::Memory(inner) = &store else {
            unreachable!("memory() builds the memory store");
        };

        let _reader = inner.read().await;
        let loaded = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            store.get(DocumentKind::Quotation, created.id),
        )
        .await
        .expect("get waited for the write guard")
        .unwrap();
        assert_eq!(loaded, created);

        assert_eq!(inner.read().await.document(DocumentKind::Quotation, Uuid::new_v4()), None);
    }
}
