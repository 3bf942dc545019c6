//! # Checkout Store Seams
//!
//! The persistence traits the orchestrator sequences through, and
//! their SQLite implementation over `caixa-db`. The traits exist so
//! the state machine's failure semantics can be tested against a
//! scripted store; production wires `SqliteStore`.
//!
//! The orchestrator is the only component that talks to more than one
//! collaborator; each trait here covers exactly one concern.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use caixa_core::types::{PaymentEntry, ReservationToken, Sale, SaleItem, SaleItemOption};
use caixa_db::{Database, DbError, ProbeSnapshot};
use caixa_fiscal::Authorization;

// =============================================================================
// Traits
// =============================================================================

/// Writes (and the reservation read) the finalize flow performs, plus
/// the read-backs the retransmit path needs.
#[allow(async_fn_in_trait)]
pub trait CheckoutStore {
    /// Reserves the next fiscal document number for the triple.
    async fn reserve_next(
        &self,
        company_id: &str,
        model: i64,
        series: i64,
    ) -> Result<ReservationToken, DbError>;

    /// Creates the sale header row.
    async fn insert_sale(&self, sale: &Sale) -> Result<(), DbError>;

    /// Creates the item, option and payment rows for a sale.
    async fn insert_items(
        &self,
        items: &[SaleItem],
        options: &[SaleItemOption],
        sale_id: &str,
        payments: &[PaymentEntry],
    ) -> Result<(), DbError>;

    /// Applies one signed stock adjustment with an observation tag.
    async fn adjust_stock(
        &self,
        product_id: &str,
        quantity_delta: i64,
        observation: &str,
    ) -> Result<(), DbError>;

    /// Loads a sale with its items (retransmit/cancel paths).
    async fn load_sale(&self, sale_id: &str) -> Result<Option<(Sale, Vec<SaleItem>)>, DbError>;

    /// Replaces a sale's items (edit-and-retransmit), header untouched.
    async fn replace_items(&self, sale_id: &str, items: &[SaleItem]) -> Result<(), DbError>;

    async fn set_fiscal_authorized(
        &self,
        sale_id: &str,
        authorization: &Authorization,
    ) -> Result<(), DbError>;

    async fn set_fiscal_pending(&self, sale_id: &str, error: &str) -> Result<(), DbError>;

    async fn set_fiscal_cancelled(&self, sale_id: &str, reason: &str) -> Result<(), DbError>;

    async fn set_completed_at(
        &self,
        sale_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), DbError>;
}

/// The read-only verification probe seam.
#[allow(async_fn_in_trait)]
pub trait SaleProbe {
    /// Snapshots what the store actually holds for a sale.
    async fn snapshot(
        &self,
        sale_id: &str,
        number: i64,
        observation: &str,
    ) -> Result<ProbeSnapshot, DbError>;
}

// =============================================================================
// SQLite Implementation
// =============================================================================

/// The production store: repositories from `caixa-db`.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        SqliteStore { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl CheckoutStore for SqliteStore {
    async fn reserve_next(
        &self,
        company_id: &str,
        model: i64,
        series: i64,
    ) -> Result<ReservationToken, DbError> {
        self.db
            .fiscal_numbers()
            .reserve_next(company_id, model, series)
            .await
    }

    async fn insert_sale(&self, sale: &Sale) -> Result<(), DbError> {
        self.db.sales().insert_sale(sale).await
    }

    async fn insert_items(
        &self,
        items: &[SaleItem],
        options: &[SaleItemOption],
        sale_id: &str,
        payments: &[PaymentEntry],
    ) -> Result<(), DbError> {
        let sales = self.db.sales();
        for item in items {
            sales.insert_item(item).await?;
        }
        for option in options {
            sales.insert_item_option(option).await?;
        }
        let now = Utc::now();
        for entry in payments {
            sales
                .insert_payment(&Uuid::new_v4().to_string(), sale_id, entry, now)
                .await?;
        }
        Ok(())
    }

    async fn adjust_stock(
        &self,
        product_id: &str,
        quantity_delta: i64,
        observation: &str,
    ) -> Result<(), DbError> {
        self.db
            .stock()
            .apply_adjustment(product_id, quantity_delta, observation)
            .await
            .map(|_| ())
    }

    async fn load_sale(&self, sale_id: &str) -> Result<Option<(Sale, Vec<SaleItem>)>, DbError> {
        let sales = self.db.sales();
        let Some(sale) = sales.get_by_id(sale_id).await? else {
            return Ok(None);
        };
        let items = sales.get_items(sale_id).await?;
        Ok(Some((sale, items)))
    }

    async fn replace_items(&self, sale_id: &str, items: &[SaleItem]) -> Result<(), DbError> {
        self.db.sales().replace_items(sale_id, items).await
    }

    async fn set_fiscal_authorized(
        &self,
        sale_id: &str,
        authorization: &Authorization,
    ) -> Result<(), DbError> {
        self.db
            .sales()
            .set_fiscal_authorized(
                sale_id,
                &authorization.access_key,
                &authorization.protocol,
                authorization.authorized_at,
            )
            .await
    }

    async fn set_fiscal_pending(&self, sale_id: &str, error: &str) -> Result<(), DbError> {
        self.db.sales().set_fiscal_pending(sale_id, error).await
    }

    async fn set_fiscal_cancelled(&self, sale_id: &str, reason: &str) -> Result<(), DbError> {
        self.db.sales().set_fiscal_cancelled(sale_id, reason).await
    }

    async fn set_completed_at(
        &self,
        sale_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.db.sales().set_completed_at(sale_id, completed_at).await
    }
}

impl SaleProbe for SqliteStore {
    async fn snapshot(
        &self,
        sale_id: &str,
        number: i64,
        observation: &str,
    ) -> Result<ProbeSnapshot, DbError> {
        self.db.probe().snapshot(sale_id, number, observation).await
    }
}
