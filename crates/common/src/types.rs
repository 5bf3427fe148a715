// Core domain types shared across all Docket crates.
//
// `Document` is the fully reloaded shape returned by the server after a
// create, read or update. Its JSON form can be echoed back as a snapshot.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// The business document families managed by Docket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    #[serde(alias = "quotations")]
    Quotation,
    #[serde(alias = "invoices")]
    Invoice,
    #[serde(alias = "production-tickets", alias = "production_tickets", alias = "production-ticket")]
    ProductionTicket,
}

impl DocumentKind {
    pub const ALL: [Self; 3] = [Self::Quotation, Self::Invoice, Self::ProductionTicket];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quotation => "quotation",
            Self::Invoice => "invoice",
            Self::ProductionTicket => "production_ticket",
        }
    }

    /// Plural URL segment, e.g. `production-tickets`.
    pub const fn path_segment(self) -> &'static str {
        match self {
            Self::Quotation => "quotations",
            Self::Invoice => "invoices",
            Self::ProductionTicket => "production-tickets",
        }
    }

    /// Prefix of the human-readable document number (`PT-2025-0007`).
    pub const fn number_prefix(self) -> &'static str {
        match self {
            Self::Quotation => "QT",
            Self::Invoice => "INV",
            Self::ProductionTicket => "PT",
        }
    }

    /// Attribute key holding the display name that must stay unique.
    pub const fn name_field(self) -> &'static str {
        match self {
            Self::Quotation | Self::Invoice => "billTo",
            Self::ProductionTicket => "projectName",
        }
    }

    pub const fn supports_signatures(self) -> bool {
        matches!(self, Self::Quotation | Self::ProductionTicket)
    }

    pub const fn allowed_statuses(self) -> &'static [DocumentStatus] {
        match self {
            Self::Quotation => &[DocumentStatus::Draft, DocumentStatus::Final],
            Self::Invoice => &[DocumentStatus::Draft, DocumentStatus::Pending, DocumentStatus::Paid],
            Self::ProductionTicket => {
                &[DocumentStatus::Draft, DocumentStatus::Pending, DocumentStatus::Final]
            }
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {what} `{value}`")]
pub struct UnknownVariant {
    what: &'static str,
    value: String,
}

impl FromStr for DocumentKind {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value || kind.path_segment() == value)
            .ok_or_else(|| UnknownVariant { what: "document kind", value: value.to_owned() })
    }
}

/// Workflow status. Which values are legal depends on the kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Pending,
    Final,
    Paid,
}

impl DocumentStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Final => "final",
            Self::Paid => "paid",
        }
    }

    pub const fn is_draft(self) -> bool {
        matches!(self, Self::Draft)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "draft" => Ok(Self::Draft),
            "pending" => Ok(Self::Pending),
            "final" => Ok(Self::Final),
            "paid" => Ok(Self::Paid),
            other => Err(UnknownVariant { what: "document status", value: other.to_owned() }),
        }
    }
}

/// A document as persisted, with canonical child identities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub kind: DocumentKind,
    /// Sequential human-readable identifier, e.g. `QT-2025-0042`.
    pub number: String,
    /// Resolved value of the kind's name field.
    pub name: String,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    /// Optimistic lock token. Echo it back on the next update.
    pub modified_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub remarks: Vec<Remark>,
    #[serde(default)]
    pub signatures: Vec<Signature>,
    /// Kind-specific scalar fields, flattened onto the root object.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: Uuid,
    pub order: i32,
    pub product_name: String,
    pub details: Vec<Detail>,
    /// Sum of the details' amounts.
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Detail {
    pub id: Uuid,
    pub order: i32,
    pub detail: String,
    pub unit_price: Decimal,
    pub qty: Decimal,
    /// `unit_price * qty`, rounded to a whole currency unit.
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Remark {
    pub id: Uuid,
    pub order: i32,
    pub text: String,
    pub is_completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    pub id: Uuid,
    pub order: i32,
    pub name: String,
    /// Signer's job title.
    pub position: String,
    pub image_ref: Option<String>,
}
