//! # Product Repository
//!
//! Catalog reads for the checkout, plus the inserts the seed tool and
//! tests use. Catalog *search* is a UI concern handled elsewhere; the
//! checkout only ever looks products up by id or barcode.
//!
//! ## Row Mapping
//! The promotion and quantity-discount rules live in nullable column
//! pairs (`promo_kind`/`promo_value`, ...); this module is the only
//! place that folds them into the typed `DiscountValue` the pricing
//! engine consumes.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use caixa_core::types::{DiscountValue, Product, QuantityDiscount};

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

/// Raw row shape; converted to the domain `Product` on the way out.
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    sku: String,
    barcode: Option<String>,
    name: String,
    price_cents: i64,
    promo_kind: Option<String>,
    promo_value: Option<i64>,
    qty_discount_min: Option<i64>,
    qty_discount_kind: Option<String>,
    qty_discount_value: Option<i64>,
    ncm: String,
    cfop: String,
    csosn: String,
    unit: String,
    track_stock: bool,
    allow_negative_stock: bool,
    current_stock: Option<i64>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Rebuilds a `DiscountValue` from its column pair. An unknown kind or
/// missing value yields `None` (no discount), consistent with the
/// pricing engine's treat-malformed-as-zero rule.
fn discount_value(kind: Option<&str>, value: Option<i64>) -> Option<DiscountValue> {
    match (kind, value) {
        (Some("percent"), Some(v)) => Some(DiscountValue::Percent(u32::try_from(v).unwrap_or(0))),
        (Some("fixed"), Some(v)) => Some(DiscountValue::Fixed(v)),
        _ => None,
    }
}

/// Splits a `DiscountValue` into its column pair for binding.
fn discount_columns(value: Option<DiscountValue>) -> (Option<&'static str>, Option<i64>) {
    match value {
        Some(DiscountValue::Percent(bps)) => (Some("percent"), Some(bps as i64)),
        Some(DiscountValue::Fixed(cents)) => (Some("fixed"), Some(cents)),
        None => (None, None),
    }
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        let promotion = discount_value(row.promo_kind.as_deref(), row.promo_value);
        let quantity_discount = match (
            row.qty_discount_min,
            discount_value(row.qty_discount_kind.as_deref(), row.qty_discount_value),
        ) {
            (Some(min_qty), Some(value)) => Some(QuantityDiscount { min_qty, value }),
            _ => None,
        };

        Product {
            id: row.id,
            sku: row.sku,
            barcode: row.barcode,
            name: row.name,
            price_cents: row.price_cents,
            promotion,
            quantity_discount,
            ncm: row.ncm,
            cfop: row.cfop,
            csosn: row.csosn,
            unit: row.unit,
            track_stock: row.track_stock,
            allow_negative_stock: row.allow_negative_stock,
            current_stock: row.current_stock,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const PRODUCT_COLUMNS: &str = "id, sku, barcode, name, price_cents, \
     promo_kind, promo_value, qty_discount_min, qty_discount_kind, qty_discount_value, \
     ncm, cfop, csosn, unit, track_stock, allow_negative_stock, current_stock, is_active, \
     created_at, updated_at";

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Product::from))
    }

    /// Gets an active product by barcode (the scan path).
    pub async fn get_by_barcode(&self, barcode: &str) -> DbResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE barcode = ?1 AND is_active = 1"
        ))
        .bind(barcode)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Product::from))
    }

    /// Lists active products, newest first.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active = 1 \
             ORDER BY created_at DESC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Inserts a product.
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, sku = %product.sku, "Inserting product");

        let (promo_kind, promo_value) = discount_columns(product.promotion);
        let (qty_kind, qty_value) =
            discount_columns(product.quantity_discount.map(|q| q.value));
        let qty_min = product.quantity_discount.map(|q| q.min_qty);

        sqlx::query(
            "INSERT INTO products ( \
                id, sku, barcode, name, price_cents, \
                promo_kind, promo_value, qty_discount_min, qty_discount_kind, qty_discount_value, \
                ncm, cfop, csosn, unit, track_stock, allow_negative_stock, current_stock, \
                is_active, created_at, updated_at \
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(promo_kind)
        .bind(promo_value)
        .bind(qty_min)
        .bind(qty_kind)
        .bind(qty_value)
        .bind(&product.ncm)
        .bind(&product.cfop)
        .bind(&product.csosn)
        .bind(&product.unit)
        .bind(product.track_stock)
        .bind(product.allow_negative_stock)
        .bind(product.current_stock)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns the current stock level for a product.
    pub async fn current_stock(&self, id: &str) -> DbResult<Option<i64>> {
        let stock: Option<Option<i64>> =
            sqlx::query_scalar("SELECT current_stock FROM products WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        stock.ok_or_else(|| DbError::not_found("Product", id))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
