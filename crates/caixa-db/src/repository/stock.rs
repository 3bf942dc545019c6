//! # Stock Ledger Repository
//!
//! Observation-tagged stock movements. Every finalize writes one entry
//! per cart line (negative delta) tagged with the sale's document
//! number; the tag is what reconciliation keys on when the allocator's
//! best-effort numbering needs untangling.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use caixa_core::types::StockEntry;

/// Repository for stock-ledger operations.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    /// Creates a new StockRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Applies one signed stock adjustment.
    ///
    /// Inserts the ledger row and updates the product's cached
    /// `current_stock` in the same call. Products that don't track
    /// stock still get the ledger row (the movement happened), but no
    /// counter update.
    pub async fn apply_adjustment(
        &self,
        product_id: &str,
        quantity_delta: i64,
        observation: &str,
    ) -> DbResult<StockEntry> {
        debug!(
            product_id = %product_id,
            delta = quantity_delta,
            observation = %observation,
            "Applying stock adjustment"
        );

        let entry = StockEntry {
            id: Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            quantity_delta,
            observation: observation.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO stock_entries (id, product_id, quantity_delta, observation, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&entry.id)
        .bind(&entry.product_id)
        .bind(entry.quantity_delta)
        .bind(&entry.observation)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        let result = sqlx::query(
            "UPDATE products SET \
                current_stock = current_stock + ?2, \
                updated_at = ?3 \
             WHERE id = ?1 AND track_stock = 1",
        )
        .bind(product_id)
        .bind(quantity_delta)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        // Zero rows is fine for non-tracked products; a missing product
        // would already have failed the ledger insert's FK.
        let _ = result;

        Ok(entry)
    }

    /// Lists the ledger entries carrying an observation tag.
    pub async fn entries_by_observation(&self, observation: &str) -> DbResult<Vec<StockEntry>> {
        #[derive(sqlx::FromRow)]
        struct Row {
            id: String,
            product_id: String,
            quantity_delta: i64,
            observation: String,
            created_at: chrono::DateTime<Utc>,
        }

        let rows: Vec<Row> = sqlx::query_as(
            "SELECT id, product_id, quantity_delta, observation, created_at \
             FROM stock_entries WHERE observation = ?1 ORDER BY created_at, id",
        )
        .bind(observation)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| StockEntry {
                id: r.id,
                product_id: r.product_id,
                quantity_delta: r.quantity_delta,
                observation: r.observation,
                created_at: r.created_at,
            })
            .collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};
    use caixa_core::types::Product;

    async fn db_with_product(track_stock: bool) -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = Product {
            id: "p1".to_string(),
            sku: "SKU-1".to_string(),
            barcode: None,
            name: "Produto".to_string(),
            price_cents: 5000,
            promotion: None,
            quantity_discount: None,
            ncm: "22021000".to_string(),
            cfop: "5102".to_string(),
            csosn: "102".to_string(),
            unit: "UN".to_string(),
            track_stock,
            allow_negative_stock: false,
            current_stock: Some(10),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        db.products().insert(&product).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_adjustment_updates_ledger_and_counter() {
        let db = db_with_product(true).await;

        db.stock()
            .apply_adjustment("p1", -3, "NFC-e 65/1-000001")
            .await
            .unwrap();

        let stock = db.products().current_stock("p1").await.unwrap();
        assert_eq!(stock, Some(7));

        let entries = db
            .stock()
            .entries_by_observation("NFC-e 65/1-000001")
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].quantity_delta, -3);
    }

    #[tokio::test]
    async fn test_untracked_product_gets_ledger_row_only() {
        let db = db_with_product(false).await;

        db.stock()
            .apply_adjustment("p1", -3, "NFC-e 65/1-000002")
            .await
            .unwrap();

        // Counter untouched, ledger row present.
        assert_eq!(db.products().current_stock("p1").await.unwrap(), Some(10));
        assert_eq!(
            db.stock()
                .entries_by_observation("NFC-e 65/1-000002")
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_missing_product_fails_fk() {
        let db = db_with_product(true).await;
        let err = db
            .stock()
            .apply_adjustment("ghost", -1, "NFC-e 65/1-000003")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }
}
