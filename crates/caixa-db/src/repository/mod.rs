//! # Repository Module
//!
//! Database repositories for Caixa POS. Each repository owns the SQL
//! for one aggregate; the checkout orchestrator never writes SQL.
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - catalog reads and seed inserts
//! - [`customer::CustomerRepository`] - customers with discount tiers
//! - [`sale::SaleRepository`] - sale/item/option/payment writes and
//!   fiscal status updates
//! - [`stock::StockRepository`] - observation-tagged stock ledger
//! - [`fiscal::FiscalNumberRepository`] - best-effort number allocator
//! - [`verify::VerificationProbe`] - read-after-write snapshots

pub mod customer;
pub mod fiscal;
pub mod product;
pub mod sale;
pub mod stock;
pub mod verify;
