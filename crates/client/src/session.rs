// Per-document editing session.
//
// Holds the server baseline and the last `modifiedAt` this client saw for
// one open document. Every save goes through `prepare`, so the lock token is
// always the session's own and never shared between documents.
//
// Rows the client created carry ids the server does not know. A save
// replaces them with canonical ids; the session remembers each replacement
// so a draft that still holds the local id resubmits the canonical one.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use docket_common::snapshot::DocumentSnapshot;
use docket_common::types::{Document, DocumentKind};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSession {
    kind: DocumentKind,
    id: Uuid,
    known_modified_at: DateTime<Utc>,
    baseline: Document,
    local_ids: LocalIds,
}

/// Client-local row ids the server replaced, per collection. Details are
/// keyed by their item's canonical id.
#[derive(Debug, Clone, Default, PartialEq)]
struct LocalIds {
    items: HashMap<String, Uuid>,
    details: HashMap<(Uuid, String), Uuid>,
    remarks: HashMap<String, Uuid>,
    signatures: HashMap<String, Uuid>,
}

fn remember(aliases: &mut HashMap<String, Uuid>, submitted: Option<&String>, canonical: Uuid) {
    if let Some(local) = submitted {
        if *local != canonical.to_string() {
            aliases.insert(local.clone(), canonical);
        }
    }
}

fn rewrite(aliases: &HashMap<String, Uuid>, id: &mut Option<String>) {
    if let Some(canonical) = id.as_ref().and_then(|local| aliases.get(local)) {
        *id = Some(canonical.to_string());
    }
}

impl LocalIds {
    /// The server answers with each present collection in submitted order.
    fn record(&mut self, submitted: &DocumentSnapshot, saved: &Document) {
        if let Some(items) = &submitted.items {
            for (input, item) in items.iter().zip(&saved.items) {
                remember(&mut self.items, input.id.as_ref(), item.id);
                for (detail_input, detail) in input.details.iter().zip(&item.details) {
                    if let Some(local) = &detail_input.id {
                        if *local != detail.id.to_string() {
                            self.details.insert((item.id, local.clone()), detail.id);
                        }
                    }
                }
            }
        }
        if let Some(remarks) = &submitted.remarks {
            for (input, remark) in remarks.iter().zip(&saved.remarks) {
                remember(&mut self.remarks, input.id.as_ref(), remark.id);
            }
        }
        if let Some(signatures) = &submitted.signatures {
            for (input, signature) in signatures.iter().zip(&saved.signatures) {
                remember(&mut self.signatures, input.id.as_ref(), signature.id);
            }
        }
    }

    fn apply(&self, draft: &mut DocumentSnapshot) {
        for item in draft.items.iter_mut().flatten() {
            rewrite(&self.items, &mut item.id);
            let Some(item_id) = item.id.as_deref().and_then(|id| Uuid::parse_str(id).ok()) else {
                continue;
            };
            for detail in &mut item.details {
                let canonical =
                    detail.id.as_ref().and_then(|local| self.details.get(&(item_id, local.clone())));
                if let Some(canonical) = canonical {
                    detail.id = Some(canonical.to_string());
                }
            }
        }
        for remark in draft.remarks.iter_mut().flatten() {
            rewrite(&self.remarks, &mut remark.id);
        }
        for signature in draft.signatures.iter_mut().flatten() {
            rewrite(&self.signatures, &mut signature.id);
        }
    }
}

impl DocumentSession {
    pub fn open(document: Document) -> Self {
        Self {
            kind: document.kind,
            id: document.id,
            known_modified_at: document.modified_at,
            baseline: document,
            local_ids: LocalIds::default(),
        }
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn known_modified_at(&self) -> DateTime<Utc> {
        self.known_modified_at
    }

    /// The last document the server returned for this session.
    pub fn baseline(&self) -> &Document {
        &self.baseline
    }

    /// Stamp `draft` with the session's lock token and swap local row ids
    /// the server already replaced for their canonical ids.
    pub fn prepare(&self, mut draft: DocumentSnapshot) -> DocumentSnapshot {
        draft.modified_at = Some(self.known_modified_at);
        self.local_ids.apply(&mut draft);
        draft
    }

    /// Adopt the server's answer to `submitted`, remembering which local
    /// row ids it replaced.
    pub fn record_save(&mut self, submitted: &DocumentSnapshot, saved: Document) -> bool {
        if saved.id != self.id || saved.kind != self.kind {
            return false;
        }
        self.local_ids.record(submitted, &saved);
        self.adopt(saved)
    }

    /// Adopt a saved or reloaded document as the new baseline.
    ///
    /// Documents for another id are ignored and reported as `false`.
    pub fn adopt(&mut self, document: Document) -> bool {
        if document.id != self.id || document.kind != self.kind {
            return false;
        }
        self.known_modified_at = document.modified_at;
        self.baseline = document;
        true
    }

    /// Take the server's current timestamp without its content, so the
    /// next save overwrites whatever the other writer stored.
    pub fn accept_overwrite(&mut self, latest_modified_at: DateTime<Utc>) {
        self.known_modified_at = latest_modified_at;
    }

    /// The baseline as a snapshot that can be edited and saved back.
    pub fn baseline_snapshot(&self) -> DocumentSnapshot {
        self.prepare(DocumentSnapshot::from_document(&self.baseline))
    }
}
