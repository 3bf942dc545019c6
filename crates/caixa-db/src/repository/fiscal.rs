//! # Fiscal Number Reservation
//!
//! Obtains the next fiscal document number for a (company, model,
//! series) triple before any persistence happens.
//!
//! ## Best-Effort Allocator
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  SELECT MAX(number) over ALL fiscal statuses  →  max + 1 (or 1)     │
//! │                                                                     │
//! │  Including every status matters: a previously failed or pending    │
//! │  attempt already owns its number and must not be reused.           │
//! │                                                                     │
//! │  This is read-then-increment with NO unique-sequence guarantee.    │
//! │  Two truly concurrent finalizations against the same series can    │
//! │  reserve the same number; downstream reconciliation must tolerate  │
//! │  gaps and duplicates rather than assume them impossible.           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use caixa_core::types::ReservationToken;

/// The fiscal document number allocator.
#[derive(Debug, Clone)]
pub struct FiscalNumberRepository {
    pool: SqlitePool,
}

impl FiscalNumberRepository {
    /// Creates a new FiscalNumberRepository.
    pub fn new(pool: SqlitePool) -> Self {
        FiscalNumberRepository { pool }
    }

    /// Reserves the next document number for the triple.
    ///
    /// Returns `max + 1` over existing sales in **any** fiscal status,
    /// or `1` when the series is empty. The returned token is immutable
    /// and seeds exactly one sale.
    pub async fn reserve_next(
        &self,
        company_id: &str,
        model: i64,
        series: i64,
    ) -> DbResult<ReservationToken> {
        let max: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(number) FROM sales \
             WHERE company_id = ?1 AND document_model = ?2 AND series = ?3",
        )
        .bind(company_id)
        .bind(model)
        .bind(series)
        .fetch_one(&self.pool)
        .await?;

        let number = max.unwrap_or(0) + 1;

        debug!(
            company_id = %company_id,
            model,
            series,
            number,
            "Reserved fiscal document number"
        );

        Ok(ReservationToken {
            company_id: company_id.to_string(),
            model,
            series,
            number,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
