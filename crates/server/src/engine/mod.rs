// Update orchestration.
//
// One storage transaction per request. Update order:
// lock row -> validate -> optimistic lock -> resolve name -> reconcile each
// present collection -> write root -> reload -> commit. Any error returns
// before commit and the dropped transaction discards every write.

pub mod error;
pub mod ids;
pub mod lock;
pub mod names;
pub mod reconcile;
pub mod rules;

use chrono::{Datelike, Utc};
use docket_common::snapshot::{DocumentSnapshot, RemarkInput};
use docket_common::types::{Document, DocumentKind, DocumentStatus};
use serde_json::{Map, Value};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::store::{DocumentRoot, DocumentTx};
use error::DocumentError;
use lock::LockDecision;
use reconcile::ChangeCounts;
use rules::ValidationSubject;

/// Overlay the snapshot's scalar attributes on `stored`. A `null` value
/// removes the key; envelope keys are never stored.
pub fn merge_attributes(
    stored: &Map<String, Value>,
    snapshot: &DocumentSnapshot,
) -> Map<String, Value> {
    let mut merged = stored.clone();
    for (key, value) in snapshot.scalar_attributes() {
        if value.is_null() {
            merged.remove(&key);
        } else {
            merged.insert(key, value);
        }
    }
    merged
}

/// Text of the kind's name field, as submitted, when it holds a string.
pub fn name_candidate(attributes: &Map<String, Value>, kind: DocumentKind) -> Option<String> {
    attributes.get(kind.name_field()).and_then(Value::as_str).map(str::to_owned)
}

fn open_remark_inputs(remarks: &[RemarkInput]) -> usize {
    remarks.iter().filter(|remark| !remark.is_completed).count()
}

/// Resolve the name field and write the resolved value back into `attributes`.
async fn resolve_name<T: DocumentTx>(
    tx: &mut T,
    kind: DocumentKind,
    attributes: &mut Map<String, Value>,
    exclude: Option<Uuid>,
) -> anyhow::Result<String> {
    let Some(candidate) = name_candidate(attributes, kind) else {
        return Ok(String::new());
    };
    let resolved = names::resolve_unique_name(tx, &candidate, kind, exclude).await?;
    attributes.insert(kind.name_field().to_owned(), Value::String(resolved.clone()));
    Ok(resolved)
}

fn log_outcome(
    operation: &'static str,
    kind: DocumentKind,
    result: Result<(Document, ChangeCounts), DocumentError>,
) -> Result<Document, DocumentError> {
    match result {
        Ok((document, counts)) => {
            tracing::info!(
                operation,
                kind = %kind,
                document_id = %document.id,
                number = %document.number,
                created = counts.created,
                updated = counts.updated,
                deleted = counts.deleted,
                outcome = "committed",
                "document saved"
            );
            Ok(document)
        }
        Err(error) => {
            match &error {
                DocumentError::Storage(_) | DocumentError::SequenceUnavailable(_) => {
                    tracing::warn!(
                        operation,
                        kind = %kind,
                        outcome = "rejected",
                        reason = error.reason(),
                        error = %error,
                        "document save rolled back"
                    );
                }
                _ => {
                    tracing::info!(
                        operation,
                        kind = %kind,
                        outcome = "rejected",
                        reason = error.reason(),
                        "document save rejected"
                    );
                }
            }
            Err(error)
        }
    }
}

pub(crate) async fn create_document<T: DocumentTx>(
    mut tx: T,
    kind: DocumentKind,
    snapshot: DocumentSnapshot,
) -> Result<Document, DocumentError> {
    let result: Result<(Document, ChangeCounts), DocumentError> = async move {
        let mut attributes = merge_attributes(&Map::new(), &snapshot);
        let status = snapshot.status.unwrap_or(DocumentStatus::Draft);
        let items = snapshot.items.unwrap_or_default();
        let remarks = snapshot.remarks.unwrap_or_default();
        let signatures = snapshot.signatures.unwrap_or_default();

        rules::validate(&ValidationSubject {
            kind,
            status,
            attributes: &attributes,
            item_count: items.len(),
            open_remarks: open_remark_inputs(&remarks),
            signature_count: signatures.len(),
        })?;

        let item_plan = reconcile::plan_items(&[], items)?;
        let remark_plan = reconcile::plan_remarks(&[], remarks)?;
        let signature_plan = reconcile::plan_signatures(&[], signatures)?;

        let name = resolve_name(&mut tx, kind, &mut attributes, None).await?;
        let now = lock::truncate_to_millis(Utc::now());
        let number = ids::generate_number(&mut tx, kind, now.year()).await?;

        let root = DocumentRoot {
            id: ids::new_row_id(),
            kind,
            number,
            name,
            status,
            attributes,
            created_at: now,
            modified_at: now,
            deleted_at: None,
        };
        tx.insert_root(&root).await?;
        tx.apply_items(root.id, &item_plan).await?;
        tx.apply_remarks(root.id, &remark_plan).await?;
        tx.apply_signatures(root.id, &signature_plan).await?;

        let mut counts = reconcile::item_change_counts(&item_plan);
        counts += remark_plan.counts();
        counts += signature_plan.counts();

        let children = tx.load_children(root.id).await?;
        tx.commit().await?;
        Ok((root.into_document(children), counts))
    }
    .instrument(info_span!("docket.engine.create_document", kind = %kind))
    .await;

    log_outcome("create", kind, result)
}

pub(crate) async fn update_document<T: DocumentTx>(
    mut tx: T,
    kind: DocumentKind,
    id: Uuid,
    snapshot: DocumentSnapshot,
) -> Result<Document, DocumentError> {
    let result: Result<(Document, ChangeCounts), DocumentError> = async move {
        let stored = tx.lock_root(kind, id).await?.ok_or(DocumentError::NotFound)?;
        let children = tx.load_children(id).await?;

        let mut attributes = merge_attributes(&stored.attributes, &snapshot);
        let status = snapshot.status.unwrap_or(stored.status);
        rules::validate(&ValidationSubject {
            kind,
            status,
            attributes: &attributes,
            item_count: snapshot.items.as_ref().map_or(children.items.len(), Vec::len),
            open_remarks: snapshot.remarks.as_deref().map_or_else(
                || children.remarks.iter().filter(|remark| !remark.is_completed).count(),
                open_remark_inputs,
            ),
            signature_count: snapshot
                .signatures
                .as_ref()
                .map_or(children.signatures.len(), Vec::len),
        })?;

        match snapshot.modified_at {
            Some(client_known) => {
                if lock::check(stored.modified_at, Some(client_known)) == LockDecision::Conflict {
                    return Err(DocumentError::OptimisticLock {
                        stored: stored.modified_at,
                        client_known,
                    });
                }
            }
            None => tracing::warn!(
                kind = %kind,
                document_id = %id,
                "update without modifiedAt, optimistic lock skipped"
            ),
        }

        let name = resolve_name(&mut tx, kind, &mut attributes, Some(id)).await?;

        let DocumentSnapshot { items, remarks, signatures, .. } = snapshot;
        let mut counts = ChangeCounts::default();
        if let Some(items) = items {
            let plan = reconcile::plan_items(&children.items, items)?;
            tx.apply_items(id, &plan).await?;
            counts += reconcile::item_change_counts(&plan);
        }
        if let Some(remarks) = remarks {
            let plan = reconcile::plan_remarks(&children.remarks, remarks)?;
            tx.apply_remarks(id, &plan).await?;
            counts += plan.counts();
        }
        if let Some(signatures) = signatures {
            let plan = reconcile::plan_signatures(&children.signatures, signatures)?;
            tx.apply_signatures(id, &plan).await?;
            counts += plan.counts();
        }

        let modified_at = lock::next_modified_at(stored.modified_at, Utc::now());
        let root = DocumentRoot { name, status, attributes, modified_at, ..stored };
        tx.update_root(&root).await?;

        let children = tx.load_children(id).await?;
        tx.commit().await?;
        Ok((root.into_document(children), counts))
    }
    .instrument(info_span!("docket.engine.update_document", kind = %kind, document_id = %id))
    .await;

    log_outcome("update", kind, result)
}

pub(crate) async fn load_document<T: DocumentTx>(
    mut tx: T,
    kind: DocumentKind,
    id: Uuid,
) -> Result<Document, DocumentError> {
    async move {
        let root = tx.load_root(kind, id).await?.ok_or(DocumentError::NotFound)?;
        let children = tx.load_children(id).await?;
        Ok::<_, DocumentError>(root.into_document(children))
    }
    .instrument(info_span!("docket.engine.load_document", kind = %kind, document_id = %id))
    .await
}

/// Soft delete sets `deletedAt`; hard delete removes the document and its
/// children, including a document that was already soft-deleted.
pub(crate) async fn delete_document<T: DocumentTx>(
    mut tx: T,
    kind: DocumentKind,
    id: Uuid,
    hard: bool,
) -> Result<(), DocumentError> {
    async move {
        let removed = if hard {
            tx.hard_delete(kind, id).await?
        } else {
            tx.soft_delete(kind, id, lock::truncate_to_millis(Utc::now())).await?
        };
        if !removed {
            return Err(DocumentError::NotFound);
        }
        tx.commit().await?;
        tracing::info!(kind = %kind, document_id = %id, hard, outcome = "committed", "document deleted");
        Ok::<_, DocumentError>(())
    }
    .instrument(info_span!("docket.engine.delete_document", kind = %kind, document_id = %id))
    .await
}
