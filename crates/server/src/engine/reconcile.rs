// Collection reconciliation.
//
// An incoming row is `Existing` only when its id is a member of the persisted
// id set of that exact collection (for details: of that exact item), fetched
// inside the update transaction. Everything else, including ids that merely
// look like ours, is `New` and receives a fresh id. Persisted rows not
// claimed by an incoming row are deleted. Row order is the incoming order.

use std::collections::{HashMap, HashSet};
use std::ops::AddAssign;

use docket_common::money::{line_amount, sum_amounts};
use docket_common::snapshot::{DetailInput, ItemInput, RemarkInput, SignatureInput};
use docket_common::types::{Item, Remark, Signature};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use super::ids::new_row_id;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("{collection} row {id} appears more than once")]
    DuplicateIdentity { collection: &'static str, id: Uuid },
    #[error("{collection} row {index} has an amount that overflows")]
    AmountOverflow { collection: &'static str, index: usize },
    #[error("{collection} has too many rows")]
    TooManyRows { collection: &'static str },
}

impl ReconcileError {
    pub fn collection(&self) -> &'static str {
        match self {
            Self::DuplicateIdentity { collection, .. }
            | Self::AmountOverflow { collection, .. }
            | Self::TooManyRows { collection } => *collection,
        }
    }
}

/// How an incoming row relates to the persisted rows of its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowIdentity {
    Existing(Uuid),
    New,
}

impl RowIdentity {
    pub fn classify(raw: Option<&str>, persisted: &HashSet<Uuid>) -> Self {
        raw.and_then(|value| Uuid::parse_str(value.trim()).ok())
            .filter(|id| persisted.contains(id))
            .map_or(Self::New, Self::Existing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    Update,
    Create,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRow<F> {
    /// Canonical id: the persisted one for updates, a fresh one for creates.
    pub id: Uuid,
    pub order: i32,
    pub action: RowAction,
    pub fields: F,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionPlan<F> {
    /// Desired end state, in incoming order.
    pub rows: Vec<PlannedRow<F>>,
    /// Persisted ids no incoming row claimed.
    pub deletes: Vec<Uuid>,
}

impl<F> CollectionPlan<F> {
    pub fn updates(&self) -> impl Iterator<Item = &PlannedRow<F>> {
        self.rows.iter().filter(|row| row.action == RowAction::Update)
    }

    pub fn creates(&self) -> impl Iterator<Item = &PlannedRow<F>> {
        self.rows.iter().filter(|row| row.action == RowAction::Create)
    }

    pub fn counts(&self) -> ChangeCounts {
        let created = self.creates().count();
        ChangeCounts {
            updated: self.rows.len() - created,
            created,
            deleted: self.deletes.len(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChangeCounts {
    pub updated: usize,
    pub created: usize,
    pub deleted: usize,
}

impl AddAssign for ChangeCounts {
    fn add_assign(&mut self, other: Self) {
        self.updated += other.updated;
        self.created += other.created;
        self.deleted += other.deleted;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemFields {
    pub product_name: String,
    /// Recomputed from the planned details.
    pub total: Decimal,
    pub details: CollectionPlan<DetailFields>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailFields {
    pub detail: String,
    pub unit_price: Decimal,
    pub qty: Decimal,
    /// Recomputed; whatever the client sent is ignored.
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemarkFields {
    pub text: String,
    pub is_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureFields {
    pub name: String,
    pub position: String,
    pub image_ref: Option<String>,
}

trait IncomingRow {
    fn raw_id(&self) -> Option<&str>;
}

impl IncomingRow for ItemInput {
    fn raw_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl IncomingRow for DetailInput {
    fn raw_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl IncomingRow for RemarkInput {
    fn raw_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl IncomingRow for SignatureInput {
    fn raw_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

fn plan_collection<R, F, B>(
    collection: &'static str,
    persisted: &[Uuid],
    incoming: Vec<R>,
    mut build: B,
) -> Result<CollectionPlan<F>, ReconcileError>
where
    R: IncomingRow,
    B: FnMut(usize, RowIdentity, R) -> Result<F, ReconcileError>,
{
    let known: HashSet<Uuid> = persisted.iter().copied().collect();
    let mut claimed = HashSet::with_capacity(incoming.len());
    let mut rows = Vec::with_capacity(incoming.len());

    for (index, row) in incoming.into_iter().enumerate() {
        let order = i32::try_from(index).map_err(|_| ReconcileError::TooManyRows { collection })?;
        let identity = RowIdentity::classify(row.raw_id(), &known);
        let (id, action) = match identity {
            RowIdentity::Existing(id) => {
                if !claimed.insert(id) {
                    return Err(ReconcileError::DuplicateIdentity { collection, id });
                }
                (id, RowAction::Update)
            }
            RowIdentity::New => (new_row_id(), RowAction::Create),
        };
        let fields = build(index, identity, row)?;
        rows.push(PlannedRow { id, order, action, fields });
    }

    let deletes = persisted.iter().copied().filter(|id| !claimed.contains(id)).collect();

    Ok(CollectionPlan { rows, deletes })
}

/// Plan the item collection, including each item's details, recomputing
/// every detail amount and item total.
pub fn plan_items(
    persisted: &[Item],
    incoming: Vec<ItemInput>,
) -> Result<CollectionPlan<ItemFields>, ReconcileError> {
    let item_ids: Vec<Uuid> = persisted.iter().map(|item| item.id).collect();
    let detail_ids: HashMap<Uuid, Vec<Uuid>> = persisted
        .iter()
        .map(|item| (item.id, item.details.iter().map(|detail| detail.id).collect()))
        .collect();

    plan_collection("items", &item_ids, incoming, |index, identity, input| {
        let persisted_details: &[Uuid] = match identity {
            RowIdentity::Existing(id) => detail_ids.get(&id).map(Vec::as_slice).unwrap_or(&[]),
            RowIdentity::New => &[],
        };
        let details = plan_details(persisted_details, input.details)?;
        let total = sum_amounts(details.rows.iter().map(|row| row.fields.amount))
            .ok_or(ReconcileError::AmountOverflow { collection: "items", index })?;

        Ok(ItemFields { product_name: input.product_name, total, details })
    })
}

fn plan_details(
    persisted: &[Uuid],
    incoming: Vec<DetailInput>,
) -> Result<CollectionPlan<DetailFields>, ReconcileError> {
    plan_collection("details", persisted, incoming, |index, _, input| {
        let amount = line_amount(input.unit_price, input.qty)
            .ok_or(ReconcileError::AmountOverflow { collection: "details", index })?;
        Ok(DetailFields { detail: input.detail, unit_price: input.unit_price, qty: input.qty, amount })
    })
}

pub fn plan_remarks(
    persisted: &[Remark],
    incoming: Vec<RemarkInput>,
) -> Result<CollectionPlan<RemarkFields>, ReconcileError> {
    let ids: Vec<Uuid> = persisted.iter().map(|remark| remark.id).collect();
    plan_collection("remarks", &ids, incoming, |_, _, input| {
        Ok(RemarkFields { text: input.text, is_completed: input.is_completed })
    })
}

pub fn plan_signatures(
    persisted: &[Signature],
    incoming: Vec<SignatureInput>,
) -> Result<CollectionPlan<SignatureFields>, ReconcileError> {
    let ids: Vec<Uuid> = persisted.iter().map(|signature| signature.id).collect();
    plan_collection("signatures", &ids, incoming, |_, _, input| {
        Ok(SignatureFields { name: input.name, position: input.position, image_ref: input.image_ref })
    })
}

/// Item, detail and deletion counts for one item plan.
pub fn item_change_counts(plan: &CollectionPlan<ItemFields>) -> ChangeCounts {
    let mut counts = plan.counts();
    for row in &plan.rows {
        counts += row.fields.details.counts();
    }
    counts
}
