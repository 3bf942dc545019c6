//! # Verification Probe
//!
//! Read-after-write consistency checks. After the finalize flow's
//! writes report success, the probe re-reads what actually landed; the
//! orchestrator compares the snapshot against what it submitted and
//! treats any mismatch as an inconsistent write.
//!
//! The probe performs no writes.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

/// What the store says it holds for one sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSnapshot {
    /// Whether the sale header row exists under the expected id AND
    /// reservation number.
    pub header_found: bool,
    /// Stored total on the header, for cross-checking the breakdown.
    pub total_cents: i64,
    /// Number of item rows.
    pub item_rows: i64,
    /// Sum of item quantities.
    pub quantity_sum: i64,
    /// Number of additional-selection rows across all items.
    pub option_rows: i64,
    /// Number of stock-ledger rows tagged with the sale's observation.
    pub stock_rows: i64,
}

/// Read-only probe over the persisted sale rows.
#[derive(Debug, Clone)]
pub struct VerificationProbe {
    pool: SqlitePool,
}

impl VerificationProbe {
    /// Creates a new VerificationProbe.
    pub fn new(pool: SqlitePool) -> Self {
        VerificationProbe { pool }
    }

    /// Snapshots the persisted state of a sale, looked up by id and by
    /// the reserved number (both must agree for the header to count).
    pub async fn snapshot(
        &self,
        sale_id: &str,
        number: i64,
        observation: &str,
    ) -> DbResult<ProbeSnapshot> {
        debug!(sale_id = %sale_id, number, "Probing persisted sale");

        let header: Option<(i64,)> =
            sqlx::query_as("SELECT total_cents FROM sales WHERE id = ?1 AND number = ?2")
                .bind(sale_id)
                .bind(number)
                .fetch_optional(&self.pool)
                .await?;

        let (item_rows, quantity_sum): (i64, Option<i64>) = sqlx::query_as(
            "SELECT COUNT(*), SUM(quantity) FROM sale_items WHERE sale_id = ?1",
        )
        .bind(sale_id)
        .fetch_one(&self.pool)
        .await?;

        let option_rows: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sale_item_options o \
             JOIN sale_items i ON i.id = o.sale_item_id \
             WHERE i.sale_id = ?1",
        )
        .bind(sale_id)
        .fetch_one(&self.pool)
        .await?;

        let stock_rows: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stock_entries WHERE observation = ?1")
                .bind(observation)
                .fetch_one(&self.pool)
                .await?;

        Ok(ProbeSnapshot {
            header_found: header.is_some(),
            total_cents: header.map(|(t,)| t).unwrap_or(0),
            item_rows,
            quantity_sum: quantity_sum.unwrap_or(0),
            option_rows,
            stock_rows,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
