//! # caixa-db: Database Layer for Caixa POS
//!
//! SQLite persistence for the checkout: connection pool, embedded
//! migrations and the repositories the finalize orchestrator writes
//! through.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  caixa-checkout (orchestration)                                     │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  ┌───────────────────────────────────────────────────────────────┐  │
//! │  │                  caixa-db (THIS CRATE)                        │  │
//! │  │                                                               │  │
//! │  │  Database (pool.rs)   repositories/   migrations (embedded)   │  │
//! │  │  SqlitePool, WAL      sale, product,  001_initial_schema.sql  │  │
//! │  │                       customer, stock,                        │  │
//! │  │                       fiscal, verify                          │  │
//! │  └───────────────────────────────────────────────────────────────┘  │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  SQLite database file (WAL mode)                                    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use caixa_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("caixa.db")).await?;
//! let token = db.fiscal_numbers().reserve_next("company", 65, 1).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::customer::CustomerRepository;
pub use repository::fiscal::FiscalNumberRepository;
pub use repository::product::ProductRepository;
pub use repository::sale::SaleRepository;
pub use repository::stock::StockRepository;
pub use repository::verify::{ProbeSnapshot, VerificationProbe};
