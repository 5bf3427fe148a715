// Client-submitted document snapshots.
//
// A snapshot describes the desired end state of a document. Child rows carry
// an optional `id`: either one previously issued by the server or any value
// the client invented for a row it has not saved yet. The server decides
// which is which; nothing here interprets the string.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{Document, DocumentStatus};

/// Keys that are part of the snapshot envelope or the server response and
/// must never be stored as kind-specific attributes.
pub const RESERVED_KEYS: &[&str] = &[
    "id",
    "kind",
    "number",
    "name",
    "status",
    "createdAt",
    "modifiedAt",
    "updatedAt",
    "deletedAt",
    "items",
    "remarks",
    "signatures",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    /// Absent keeps the stored status (drafts on create).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DocumentStatus>,
    /// Last `modifiedAt` the client saw. Absent skips the optimistic lock.
    #[serde(default, alias = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    /// Absent leaves the collection untouched; empty clears it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ItemInput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<Vec<RemarkInput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signatures: Option<Vec<SignatureInput>>,
    /// Kind-specific scalar fields. A `null` value removes the key.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl DocumentSnapshot {
    /// Attributes with envelope keys removed, as they will be stored.
    pub fn scalar_attributes(&self) -> Map<String, Value> {
        self.attributes
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Text value of an attribute, if present and a string.
    pub fn text_attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Build a full snapshot mirroring a reloaded document, lock token included.
    pub fn from_document(document: &Document) -> Self {
        Self {
            status: Some(document.status),
            modified_at: Some(document.modified_at),
            items: Some(document.items.iter().map(ItemInput::from).collect()),
            remarks: Some(document.remarks.iter().map(RemarkInput::from).collect()),
            signatures: Some(document.signatures.iter().map(SignatureInput::from).collect()),
            attributes: document.attributes.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, alias = "name")]
    pub product_name: String,
    #[serde(default)]
    pub details: Vec<DetailInput>,
    /// Ignored by the server; totals are always recomputed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetailInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub unit_price: Decimal,
    #[serde(default)]
    pub qty: Decimal,
    /// Ignored by the server; amounts are always recomputed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemarkInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub is_completed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

impl From<&crate::types::Item> for ItemInput {
    fn from(item: &crate::types::Item) -> Self {
        Self {
            id: Some(item.id.to_string()),
            product_name: item.product_name.clone(),
            details: item.details.iter().map(DetailInput::from).collect(),
            total: Some(item.total),
        }
    }
}

impl From<&crate::types::Detail> for DetailInput {
    fn from(detail: &crate::types::Detail) -> Self {
        Self {
            id: Some(detail.id.to_string()),
            detail: detail.detail.clone(),
            unit_price: detail.unit_price,
            qty: detail.qty,
            amount: Some(detail.amount),
        }
    }
}

impl From<&crate::types::Remark> for RemarkInput {
    fn from(remark: &crate::types::Remark) -> Self {
        Self {
            id: Some(remark.id.to_string()),
            text: remark.text.clone(),
            is_completed: remark.is_completed,
        }
    }
}

impl From<&crate::types::Signature> for SignatureInput {
    fn from(signature: &crate::types::Signature) -> Self {
        Self {
            id: Some(signature.id.to_string()),
            name: signature.name.clone(),
            position: signature.position.clone(),
            image_ref: signature.image_ref.clone(),
        }
    }
}
