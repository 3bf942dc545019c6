//! # Customer Repository
//!
//! Loads customer master data together with the discount tier tables
//! the checkout reads: term tiers ("prazo", operator-selected) and
//! value tiers (matched automatically against the running total).

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use caixa_core::types::{Customer, LayerSign, TermTier, ValueTier};

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: String,
    name: String,
    document: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct TermTierRow {
    days: i64,
    bps: i64,
    sign: LayerSign,
}

#[derive(Debug, sqlx::FromRow)]
struct ValueTierRow {
    minimum_cents: i64,
    bps: i64,
    sign: LayerSign,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Gets a customer with both tier tables loaded.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let row: Option<CustomerRow> =
            sqlx::query_as("SELECT id, name, document FROM customers WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let term_rows: Vec<TermTierRow> = sqlx::query_as(
            "SELECT days, bps, sign FROM customer_term_tiers \
             WHERE customer_id = ?1 ORDER BY days",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let value_rows: Vec<ValueTierRow> = sqlx::query_as(
            "SELECT minimum_cents, bps, sign FROM customer_value_tiers \
             WHERE customer_id = ?1 ORDER BY minimum_cents",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Customer {
            id: row.id,
            name: row.name,
            document: row.document,
            term_tiers: term_rows
                .into_iter()
                .map(|t| TermTier {
                    days: t.days as u32,
                    bps: t.bps as u32,
                    sign: t.sign,
                })
                .collect(),
            value_tiers: value_rows
                .into_iter()
                .map(|t| ValueTier {
                    minimum_cents: t.minimum_cents,
                    bps: t.bps as u32,
                    sign: t.sign,
                })
                .collect(),
        }))
    }

    /// Inserts a customer with its tiers.
    pub async fn insert(&self, customer: &Customer) -> DbResult<()> {
        debug!(id = %customer.id, "Inserting customer");

        sqlx::query("INSERT INTO customers (id, name, document) VALUES (?1, ?2, ?3)")
            .bind(&customer.id)
            .bind(&customer.name)
            .bind(&customer.document)
            .execute(&self.pool)
            .await?;

        for tier in &customer.term_tiers {
            sqlx::query(
                "INSERT INTO customer_term_tiers (customer_id, days, bps, sign) \
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&customer.id)
            .bind(tier.days as i64)
            .bind(tier.bps as i64)
            .bind(tier.sign)
            .execute(&self.pool)
            .await?;
        }

        for tier in &customer.value_tiers {
            sqlx::query(
                "INSERT INTO customer_value_tiers (customer_id, minimum_cents, bps, sign) \
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&customer.id)
            .bind(tier.minimum_cents)
            .bind(tier.bps as i64)
            .bind(tier.sign)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_insert_and_load_with_tiers() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.customers();

        let customer = Customer {
            id: "c1".to_string(),
            name: "Mercado do Bairro".to_string(),
            document: Some("12345678000199".to_string()),
            term_tiers: vec![
                TermTier {
                    days: 30,
                    bps: 500,
                    sign: LayerSign::Discount,
                },
                TermTier {
                    days: 60,
                    bps: 300,
                    sign: LayerSign::Surcharge,
                },
            ],
            value_tiers: vec![ValueTier {
                minimum_cents: 8000,
                bps: 500,
                sign: LayerSign::Discount,
            }],
        };
        repo.insert(&customer).await.unwrap();

        let loaded = repo.get_by_id("c1").await.unwrap().unwrap();
        assert_eq!(loaded.term_tiers.len(), 2);
        assert_eq!(loaded.term_tiers[1].sign, LayerSign::Surcharge);
        assert_eq!(loaded.value_tiers[0].minimum_cents, 8000);
    }

    #[tokio::test]
    async fn test_missing_customer_is_none() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.customers().get_by_id("nope").await.unwrap().is_none());
    }
}
