//! # Sale Repository
//!
//! Writes for the finalize flow and the read-backs the retransmit and
//! receipt paths need.
//!
//! ## Write Sequence During Finalize
//! ```text
//! insert_sale() → insert_item() × N (+ insert_item_option() × M)
//!              → insert_payment() × P
//!              → (verification probe reads)
//!              → set_fiscal_authorized() | set_fiscal_pending()
//! ```
//!
//! Each call is a distinct store interaction by design: the
//! orchestrator owns the failure semantics between them, including the
//! verify-after-write gate. There is no wrapping transaction; that is
//! the inherited behavior the verification probe exists to police.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use caixa_core::types::{FiscalStatus, PaymentClass, PaymentEntry, Sale, SaleItem, SaleItemOption};

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: String,
    company_id: String,
    document_model: i64,
    series: i64,
    number: i64,
    subtotal_cents: i64,
    global_discount_cents: i64,
    term_discount_cents: i64,
    value_tier_discount_cents: i64,
    total_cents: i64,
    paid_cents: i64,
    change_cents: i64,
    customer_id: Option<String>,
    buyer_document: Option<String>,
    fiscal_status: FiscalStatus,
    fiscal_error: Option<String>,
    fiscal_key: Option<String>,
    fiscal_protocol: Option<String>,
    authorized_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<SaleRow> for Sale {
    fn from(r: SaleRow) -> Self {
        Sale {
            id: r.id,
            company_id: r.company_id,
            document_model: r.document_model,
            series: r.series,
            number: r.number,
            subtotal_cents: r.subtotal_cents,
            global_discount_cents: r.global_discount_cents,
            term_discount_cents: r.term_discount_cents,
            value_tier_discount_cents: r.value_tier_discount_cents,
            total_cents: r.total_cents,
            paid_cents: r.paid_cents,
            change_cents: r.change_cents,
            customer_id: r.customer_id,
            buyer_document: r.buyer_document,
            fiscal_status: r.fiscal_status,
            fiscal_error: r.fiscal_error,
            fiscal_key: r.fiscal_key,
            fiscal_protocol: r.fiscal_protocol,
            authorized_at: r.authorized_at,
            created_at: r.created_at,
            completed_at: r.completed_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SaleItemRow {
    id: String,
    sale_id: String,
    product_id: String,
    sku_snapshot: String,
    name_snapshot: String,
    unit_price_cents: i64,
    original_price_cents: i64,
    quantity: i64,
    line_total_cents: i64,
    ncm: String,
    cfop: String,
    csosn: String,
    unit: String,
    staff_id: Option<String>,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<SaleItemRow> for SaleItem {
    fn from(r: SaleItemRow) -> Self {
        SaleItem {
            id: r.id,
            sale_id: r.sale_id,
            product_id: r.product_id,
            sku_snapshot: r.sku_snapshot,
            name_snapshot: r.name_snapshot,
            unit_price_cents: r.unit_price_cents,
            original_price_cents: r.original_price_cents,
            quantity: r.quantity,
            line_total_cents: r.line_total_cents,
            ncm: r.ncm,
            cfop: r.cfop,
            csosn: r.csosn,
            unit: r.unit,
            staff_id: r.staff_id,
            note: r.note,
            created_at: r.created_at,
        }
    }
}

const SALE_COLUMNS: &str = "id, company_id, document_model, series, number, \
     subtotal_cents, global_discount_cents, term_discount_cents, value_tier_discount_cents, \
     total_cents, paid_cents, change_cents, customer_id, buyer_document, \
     fiscal_status, fiscal_error, fiscal_key, fiscal_protocol, authorized_at, \
     created_at, completed_at";

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let row: Option<SaleRow> =
            sqlx::query_as(&format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(Sale::from))
    }

    /// Inserts a sale header.
    ///
    /// The reserved document number is part of the row from the start,
    /// so even a sale whose later steps fail carries its reservation.
    pub async fn insert_sale(&self, sale: &Sale) -> DbResult<()> {
        debug!(id = %sale.id, number = sale.number, series = sale.series, "Inserting sale");

        sqlx::query(
            "INSERT INTO sales ( \
                id, company_id, document_model, series, number, \
                subtotal_cents, global_discount_cents, term_discount_cents, \
                value_tier_discount_cents, total_cents, paid_cents, change_cents, \
                customer_id, buyer_document, fiscal_status, fiscal_error, fiscal_key, \
                fiscal_protocol, authorized_at, created_at, completed_at \
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
        )
        .bind(&sale.id)
        .bind(&sale.company_id)
        .bind(sale.document_model)
        .bind(sale.series)
        .bind(sale.number)
        .bind(sale.subtotal_cents)
        .bind(sale.global_discount_cents)
        .bind(sale.term_discount_cents)
        .bind(sale.value_tier_discount_cents)
        .bind(sale.total_cents)
        .bind(sale.paid_cents)
        .bind(sale.change_cents)
        .bind(&sale.customer_id)
        .bind(&sale.buyer_document)
        .bind(sale.fiscal_status)
        .bind(&sale.fiscal_error)
        .bind(&sale.fiscal_key)
        .bind(&sale.fiscal_protocol)
        .bind(sale.authorized_at)
        .bind(sale.created_at)
        .bind(sale.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts a sale item (denormalized snapshot of one cart line).
    pub async fn insert_item(&self, item: &SaleItem) -> DbResult<()> {
        debug!(sale_id = %item.sale_id, product_id = %item.product_id, "Inserting sale item");

        sqlx::query(
            "INSERT INTO sale_items ( \
                id, sale_id, product_id, sku_snapshot, name_snapshot, \
                unit_price_cents, original_price_cents, quantity, line_total_cents, \
                ncm, cfop, csosn, unit, staff_id, note, created_at \
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        )
        .bind(&item.id)
        .bind(&item.sale_id)
        .bind(&item.product_id)
        .bind(&item.sku_snapshot)
        .bind(&item.name_snapshot)
        .bind(item.unit_price_cents)
        .bind(item.original_price_cents)
        .bind(item.quantity)
        .bind(item.line_total_cents)
        .bind(&item.ncm)
        .bind(&item.cfop)
        .bind(&item.csosn)
        .bind(&item.unit)
        .bind(&item.staff_id)
        .bind(&item.note)
        .bind(item.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts an additional-selection row for a sale item.
    pub async fn insert_item_option(&self, option: &SaleItemOption) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO sale_item_options (id, sale_item_id, name, price_cents, quantity) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&option.id)
        .bind(&option.sale_item_id)
        .bind(&option.name)
        .bind(option.price_cents)
        .bind(option.quantity)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records one payment entry for a sale.
    pub async fn insert_payment(
        &self,
        id: &str,
        sale_id: &str,
        entry: &PaymentEntry,
        created_at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO sale_payments (id, sale_id, method_id, class, amount_cents, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(id)
        .bind(sale_id)
        .bind(&entry.method_id)
        .bind(entry.class)
        .bind(entry.amount_cents)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets all items for a sale, in insertion order.
    pub async fn get_items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let rows: Vec<SaleItemRow> = sqlx::query_as(
            "SELECT id, sale_id, product_id, sku_snapshot, name_snapshot, \
                    unit_price_cents, original_price_cents, quantity, line_total_cents, \
                    ncm, cfop, csosn, unit, staff_id, note, created_at \
             FROM sale_items WHERE sale_id = ?1 ORDER BY created_at, id",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SaleItem::from).collect())
    }

    /// Gets the additional-selection rows for every item of a sale.
    pub async fn get_options_for_sale(&self, sale_id: &str) -> DbResult<Vec<SaleItemOption>> {
        #[derive(sqlx::FromRow)]
        struct OptionRow {
            id: String,
            sale_item_id: String,
            name: String,
            price_cents: i64,
            quantity: i64,
        }

        let rows: Vec<OptionRow> = sqlx::query_as(
            "SELECT o.id, o.sale_item_id, o.name, o.price_cents, o.quantity \
             FROM sale_item_options o \
             JOIN sale_items i ON i.id = o.sale_item_id \
             WHERE i.sale_id = ?1 ORDER BY o.sale_item_id, o.id",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| SaleItemOption {
                id: r.id,
                sale_item_id: r.sale_item_id,
                name: r.name,
                price_cents: r.price_cents,
                quantity: r.quantity,
            })
            .collect())
    }

    /// Gets all payments for a sale.
    pub async fn get_payments(&self, sale_id: &str) -> DbResult<Vec<PaymentEntry>> {
        #[derive(sqlx::FromRow)]
        struct PaymentRow {
            method_id: String,
            class: PaymentClass,
            amount_cents: i64,
        }

        let rows: Vec<PaymentRow> = sqlx::query_as(
            "SELECT method_id, class, amount_cents FROM sale_payments \
             WHERE sale_id = ?1 ORDER BY created_at, id",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| PaymentEntry {
                method_id: r.method_id,
                class: r.class,
                amount_cents: r.amount_cents,
            })
            .collect())
    }

    /// Marks a sale fiscally authorized, attaching key/protocol.
    pub async fn set_fiscal_authorized(
        &self,
        sale_id: &str,
        key: &str,
        protocol: &str,
        authorized_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE sales SET fiscal_status = 'authorized', fiscal_key = ?2, \
             fiscal_protocol = ?3, authorized_at = ?4, fiscal_error = NULL \
             WHERE id = ?1",
        )
        .bind(sale_id)
        .bind(key)
        .bind(protocol)
        .bind(authorized_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", sale_id));
        }

        Ok(())
    }

    /// Downgrades a sale to fiscal-pending with the gateway error text
    /// attached for later operator review.
    pub async fn set_fiscal_pending(&self, sale_id: &str, error: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE sales SET fiscal_status = 'pending', fiscal_error = ?2 WHERE id = ?1",
        )
        .bind(sale_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", sale_id));
        }

        Ok(())
    }

    /// Marks a sale fiscally cancelled after a successful gateway
    /// cancellation.
    pub async fn set_fiscal_cancelled(&self, sale_id: &str, reason: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE sales SET fiscal_status = 'cancelled', fiscal_error = ?2 WHERE id = ?1",
        )
        .bind(sale_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", sale_id));
        }

        Ok(())
    }

    /// Stamps the completion time once the flow reaches its terminal
    /// phase.
    pub async fn set_completed_at(
        &self,
        sale_id: &str,
        completed_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query("UPDATE sales SET completed_at = ?2 WHERE id = ?1")
            .bind(sale_id)
            .bind(completed_at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", sale_id));
        }

        Ok(())
    }

    /// Replaces the items of a sale (the edit-and-retransmit path).
    ///
    /// Deletes the current item/option rows and inserts the corrected
    /// ones; the header keeps its reservation untouched.
    pub async fn replace_items(&self, sale_id: &str, items: &[SaleItem]) -> DbResult<()> {
        debug!(sale_id = %sale_id, count = items.len(), "Replacing sale items");

        sqlx::query(
            "DELETE FROM sale_item_options WHERE sale_item_id IN \
             (SELECT id FROM sale_items WHERE sale_id = ?1)",
        )
        .bind(sale_id)
        .execute(&self.pool)
        .await?;

        sqlx::query("DELETE FROM sale_items WHERE sale_id = ?1")
            .bind(sale_id)
            .execute(&self.pool)
            .await?;

        for item in items {
            self.insert_item(item).await?;
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
