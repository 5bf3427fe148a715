use std::collections::HashMap;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use docket_common::types::{Detail, DocumentKind, DocumentStatus, Item, Remark, Signature};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sqlx::{types::Json, PgPool, Postgres, Transaction};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::{Children, DocumentRoot, DocumentTx};
use crate::engine::reconcile::{
    CollectionPlan, ItemFields, RemarkFields, RowAction, SignatureFields,
};

const UNIQUE_VIOLATION: &str = "23505";

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    kind: String,
    number: String,
    name: String,
    status: String,
    attributes: Json<Map<String, Value>>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<DocumentRow> for DocumentRoot {
    type Error = anyhow::Error;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            kind: row.kind.parse::<DocumentKind>()?,
            number: row.number,
            name: row.name,
            status: row.status.parse::<DocumentStatus>()?,
            attributes: row.attributes.0,
            created_at: row.created_at,
            modified_at: row.modified_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    position: i32,
    product_name: String,
    total: Decimal,
}

#[derive(sqlx::FromRow)]
struct DetailRow {
    id: Uuid,
    item_id: Uuid,
    position: i32,
    detail: String,
    unit_price: Decimal,
    qty: Decimal,
    amount: Decimal,
}

#[derive(sqlx::FromRow)]
struct RemarkRow {
    id: Uuid,
    position: i32,
    text: String,
    is_completed: bool,
}

#[derive(sqlx::FromRow)]
struct SignatureRow {
    id: Uuid,
    position: i32,
    name: String,
    title: String,
    image_ref: Option<String>,
}

const DOCUMENT_COLUMNS: &str =
    "id, kind, number, name, status, attributes, created_at, modified_at, deleted_at";

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl PgTx {
    pub async fn begin(pool: &PgPool) -> anyhow::Result<Self> {
        let tx = pool
            .begin()
            .instrument(info_span!("docket.db.query", query = "begin_document_tx"))
            .await
            .context("failed to open document transaction")?;
        Ok(Self { tx })
    }

    async fn fetch_root(
        &mut self,
        kind: DocumentKind,
        id: Uuid,
        for_update: bool,
    ) -> anyhow::Result<Option<DocumentRoot>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents \
             WHERE id = $1 AND kind = $2 AND deleted_at IS NULL{}",
            if for_update { " FOR UPDATE" } else { "" }
        );
        let query = if for_update { "lock_document" } else { "fetch_document" };
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(id)
            .bind(kind.as_str())
            .fetch_optional(&mut *self.tx)
            .instrument(info_span!("docket.db.query", query))
            .await
            .context("failed to load document")?;

        row.map(DocumentRoot::try_from).transpose()
    }

    async fn write_item_details(&mut self, item_id: Uuid, item: &ItemFields) -> anyhow::Result<()> {
        let plan = &item.details;
        if !plan.deletes.is_empty() {
            sqlx::query("DELETE FROM item_details WHERE item_id = $1 AND id = ANY($2)")
                .bind(item_id)
                .bind(&plan.deletes)
                .execute(&mut *self.tx)
                .instrument(info_span!("docket.db.query", query = "delete_item_details"))
                .await
                .context("failed to delete item details")?;
        }

        for row in &plan.rows {
            let sql = match row.action {
                RowAction::Update => {
                    r#"
                    UPDATE item_details
                    SET position = $3, detail = $4, unit_price = $5, qty = $6, amount = $7
                    WHERE id = $1 AND item_id = $2
                    "#
                }
                RowAction::Create => {
                    r#"
                    INSERT INTO item_details (id, item_id, position, detail, unit_price, qty, amount)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#
                }
            };
            sqlx::query(sql)
                .bind(row.id)
                .bind(item_id)
                .bind(row.order)
                .bind(&row.fields.detail)
                .bind(row.fields.unit_price)
                .bind(row.fields.qty)
                .bind(row.fields.amount)
                .execute(&mut *self.tx)
                .instrument(info_span!("docket.db.query", query = "write_item_detail"))
                .await
                .context("failed to write item detail")?;
        }
        Ok(())
    }
}

impl DocumentTx for PgTx {
    async fn lock_root(
        &mut self,
        kind: DocumentKind,
        id: Uuid,
    ) -> anyhow::Result<Option<DocumentRoot>> {
        self.fetch_root(kind, id, true).await
    }

    async fn load_root(
        &mut self,
        kind: DocumentKind,
        id: Uuid,
    ) -> anyhow::Result<Option<DocumentRoot>> {
        self.fetch_root(kind, id, false).await
    }

    async fn load_children(&mut self, document_id: Uuid) -> anyhow::Result<Children> {
        let item_rows = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, position, product_name, total
            FROM document_items
            WHERE document_id = $1
            ORDER BY position, id
            "#,
        )
        .bind(document_id)
        .fetch_all(&mut *self.tx)
        .instrument(info_span!("docket.db.query", query = "fetch_document_items"))
        .await
        .context("failed to load document items")?;

        let detail_rows = sqlx::query_as::<_, DetailRow>(
            r#"
            SELECT d.id, d.item_id, d.position, d.detail, d.unit_price, d.qty, d.amount
            FROM item_details d
            JOIN document_items i ON i.id = d.item_id
            WHERE i.document_id = $1
            ORDER BY d.position, d.id
            "#,
        )
        .bind(document_id)
        .fetch_all(&mut *self.tx)
        .instrument(info_span!("docket.db.query", query = "fetch_item_details"))
        .await
        .context("failed to load item details")?;

        let remark_rows = sqlx::query_as::<_, RemarkRow>(
            r#"
            SELECT id, position, text, is_completed
            FROM document_remarks
            WHERE document_id = $1
            ORDER BY position, id
            "#,
        )
        .bind(document_id)
        .fetch_all(&mut *self.tx)
        .instrument(info_span!("docket.db.query", query = "fetch_document_remarks"))
        .await
        .context("failed to load document remarks")?;

        let signature_rows = sqlx::query_as::<_, SignatureRow>(
            r#"
            SELECT id, position, name, title, image_ref
            FROM document_signatures
            WHERE document_id = $1
            ORDER BY position, id
            "#,
        )
        .bind(document_id)
        .fetch_all(&mut *self.tx)
        .instrument(info_span!("docket.db.query", query = "fetch_document_signatures"))
        .await
        .context("failed to load document signatures")?;

        let mut details_by_item: HashMap<Uuid, Vec<Detail>> = HashMap::new();
        for row in detail_rows {
            details_by_item.entry(row.item_id).or_default().push(Detail {
                id: row.id,
                order: row.position,
                detail: row.detail,
                unit_price: row.unit_price,
                qty: row.qty,
                amount: row.amount,
            });
        }

        let items = item_rows
            .into_iter()
            .map(|row| Item {
                id: row.id,
                order: row.position,
                product_name: row.product_name,
                details: details_by_item.remove(&row.id).unwrap_or_default(),
                total: row.total,
            })
            .collect();
        let remarks = remark_rows
            .into_iter()
            .map(|row| Remark {
                id: row.id,
                order: row.position,
                text: row.text,
                is_completed: row.is_completed,
            })
            .collect();
        let signatures = signature_rows
            .into_iter()
            .map(|row| Signature {
                id: row.id,
                order: row.position,
                name: row.name,
                position: row.title,
                image_ref: row.image_ref,
            })
            .collect();

        Ok(Children { items, remarks, signatures })
    }

    async fn names_in_use(
        &mut self,
        kind: DocumentKind,
        candidate: &str,
        exclude: Option<Uuid>,
    ) -> anyhow::Result<Vec<String>> {
        // Serializes concurrent writers resolving the same candidate until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1 || ':' || $2))")
            .bind(kind.as_str())
            .bind(candidate)
            .execute(&mut *self.tx)
            .instrument(info_span!("docket.db.query", query = "lock_document_name"))
            .await
            .context("failed to lock document name")?;

        sqlx::query_scalar::<_, String>(
            r#"
            SELECT name
            FROM documents
            WHERE kind = $1
              AND deleted_at IS NULL
              AND ($3::uuid IS NULL OR id <> $3)
              AND (name = $2 OR left(name, char_length($2) + 1) = $2 || ' ')
            "#,
        )
        .bind(kind.as_str())
        .bind(candidate)
        .bind(exclude)
        .fetch_all(&mut *self.tx)
        .instrument(info_span!("docket.db.query", query = "fetch_names_in_use"))
        .await
        .context("failed to load names in use")
    }

    async fn next_sequence(&mut self, kind: DocumentKind, year: i32) -> anyhow::Result<u32> {
        let value = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO document_counters (kind, year, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (kind, year)
            DO UPDATE SET last_value = document_counters.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(kind.as_str())
        .bind(year)
        .fetch_one(&mut *self.tx)
        .instrument(info_span!("docket.db.query", query = "increment_document_counter"))
        .await
        .context("failed to increment document counter")?;

        u32::try_from(value).with_context(|| format!("counter value {value} out of range"))
    }

    async fn insert_root(&mut self, root: &DocumentRoot) -> anyhow::Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents
                (id, kind, number, name, status, attributes, created_at, modified_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(root.id)
        .bind(root.kind.as_str())
        .bind(&root.number)
        .bind(&root.name)
        .bind(root.status.as_str())
        .bind(Json(&root.attributes))
        .bind(root.created_at)
        .bind(root.modified_at)
        .bind(root.deleted_at)
        .execute(&mut *self.tx)
        .instrument(info_span!("docket.db.query", query = "insert_document"))
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_error))
                if db_error.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                Err(anyhow!("document number {} was already issued", root.number))
            }
            Err(error) => Err(error).context("failed to insert document"),
        }
    }

    async fn update_root(&mut self, root: &DocumentRoot) -> anyhow::Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET name = $2, status = $3, attributes = $4, modified_at = $5
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(root.id)
        .bind(&root.name)
        .bind(root.status.as_str())
        .bind(Json(&root.attributes))
        .bind(root.modified_at)
        .execute(&mut *self.tx)
        .instrument(info_span!("docket.db.query", query = "update_document"))
        .await
        .context("failed to update document")?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("document {} vanished during update", root.id));
        }
        Ok(())
    }

    async fn apply_items(
        &mut self,
        document_id: Uuid,
        plan: &CollectionPlan<ItemFields>,
    ) -> anyhow::Result<()> {
        if !plan.deletes.is_empty() {
            sqlx::query("DELETE FROM document_items WHERE document_id = $1 AND id = ANY($2)")
                .bind(document_id)
                .bind(&plan.deletes)
                .execute(&mut *self.tx)
                .instrument(info_span!("docket.db.query", query = "delete_document_items"))
                .await
                .context("failed to delete document items")?;
        }

        for row in &plan.rows {
            let sql = match row.action {
                RowAction::Update => {
                    r#"
                    UPDATE document_items
                    SET position = $3, product_name = $4, total = $5
                    WHERE id = $1 AND document_id = $2
                    "#
                }
                RowAction::Create => {
                    r#"
                    INSERT INTO document_items (id, document_id, position, product_name, total)
                    VALUES ($1, $2, $3, $4, $5)
                    "#
                }
            };
            sqlx::query(sql)
                .bind(row.id)
                .bind(document_id)
                .bind(row.order)
                .bind(&row.fields.product_name)
                .bind(row.fields.total)
                .execute(&mut *self.tx)
                .instrument(info_span!("docket.db.query", query = "write_document_item"))
                .await
                .context("failed to write document item")?;

            self.write_item_details(row.id, &row.fields).await?;
        }
        Ok(())
    }

    async fn apply_remarks(
        &mut self,
        document_id: Uuid,
        plan: &CollectionPlan<RemarkFields>,
    ) -> anyhow::Result<()> {
        if !plan.deletes.is_empty() {
            sqlx::query("DELETE FROM document_remarks WHERE document_id = $1 AND id = ANY($2)")
                .bind(document_id)
                .bind(&plan.deletes)
                .execute(&mut *self.tx)
                .instrument(info_span!("docket.db.query", query = "delete_document_remarks"))
                .await
                .context("failed to delete document remarks")?;
        }

        for row in &plan.rows {
            let sql = match row.action {
                RowAction::Update => {
                    r#"
                    UPDATE document_remarks
                    SET position = $3, text = $4, is_completed = $5
                    WHERE id = $1 AND document_id = $2
                    "#
                }
                RowAction::Create => {
                    r#"
                    INSERT INTO document_remarks (id, document_id, position, text, is_completed)
                    VALUES ($1, $2, $3, $4, $5)
                    "#
                }
            };
            sqlx::query(sql)
                .bind(row.id)
                .bind(document_id)
                .bind(row.order)
                .bind(&row.fields.text)
                .bind(row.fields.is_completed)
                .execute(&mut *self.tx)
                .instrument(info_span!("docket.db.query", query = "write_document_remark"))
                .await
                .context("failed to write document remark")?;
        }
        Ok(())
    }

    async fn apply_signatures(
        &mut self,
        document_id: Uuid,
        plan: &CollectionPlan<SignatureFields>,
    ) -> anyhow::Result<()> {
        if !plan.deletes.is_empty() {
            sqlx::query("DELETE FROM document_signatures WHERE document_id = $1 AND id = ANY($2)")
                .bind(document_id)
                .bind(&plan.deletes)
                .execute(&mut *self.tx)
                .instrument(info_span!("docket.db.query", query = "delete_document_signatures"))
                .await
                .context("failed to delete document signatures")?;
        }

        for row in &plan.rows {
            let sql = match row.action {
                RowAction::Update => {
                    r#"
                    UPDATE document_signatures
                    SET position = $3, name = $4, title = $5, image_ref = $6
                    WHERE id = $1 AND document_id = $2
                    "#
                }
                RowAction::Create => {
                    r#"
                    INSERT INTO document_signatures (id, document_id, position, name, title, image_ref)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#
                }
            };
            sqlx::query(sql)
                .bind(row.id)
                .bind(document_id)
                .bind(row.order)
                .bind(&row.fields.name)
                .bind(&row.fields.position)
                .bind(row.fields.image_ref.as_deref())
                .execute(&mut *self.tx)
                .instrument(info_span!("docket.db.query", query = "write_document_signature"))
                .await
                .context("failed to write document signature")?;
        }
        Ok(())
    }

    async fn soft_delete(
        &mut self,
        kind: DocumentKind,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET deleted_at = $3
            WHERE id = $1 AND kind = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(kind.as_str())
        .bind(at)
        .execute(&mut *self.tx)
        .instrument(info_span!("docket.db.query", query = "soft_delete_document"))
        .await
        .context("failed to soft delete document")?;

        Ok(result.rows_affected() > 0)
    }

    async fn hard_delete(&mut self, kind: DocumentKind, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1 AND kind = $2")
            .bind(id)
            .bind(kind.as_str())
            .execute(&mut *self.tx)
            .instrument(info_span!("docket.db.query", query = "hard_delete_document"))
            .await
            .context("failed to hard delete document")?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self) -> anyhow::Result<()> {
        self.tx
            .commit()
            .instrument(info_span!("docket.db.query", query = "commit_document_tx"))
            .await
            .context("failed to commit document transaction")
    }
}
