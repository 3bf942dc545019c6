//! # Seed Data Generator
//!
//! Populates the database with development products and customers.
//!
//! ## Usage
//! ```bash
//! cargo run -p caixa-db --bin seed
//! cargo run -p caixa-db --bin seed -- --db ./data/caixa.db
//! ```

use chrono::Utc;
use std::env;
use uuid::Uuid;

use caixa_core::types::{
    Customer, DiscountValue, LayerSign, Product, QuantityDiscount, TermTier, ValueTier,
};
use caixa_db::{Database, DbConfig};

/// (sku, name, price_cents, promotion, quantity rule)
const PRODUCTS: &[(
    &str,
    &str,
    i64,
    Option<DiscountValue>,
    Option<QuantityDiscount>,
)] = &[
    (
        "REFRI-2L",
        "Refrigerante Cola 2L",
        899,
        Some(DiscountValue::Percent(1000)),
        None,
    ),
    (
        "AGUA-500",
        "Água Mineral 500ml",
        250,
        None,
        Some(QuantityDiscount {
            min_qty: 6,
            value: DiscountValue::Fixed(50),
        }),
    ),
    ("CAFE-500", "Café Torrado 500g", 1890, None, None),
    (
        "ARROZ-5KG",
        "Arroz Tipo 1 5kg",
        2490,
        Some(DiscountValue::Fixed(200)),
        None,
    ),
    ("FEIJAO-1KG", "Feijão Carioca 1kg", 849, None, None),
    (
        "CERV-350",
        "Cerveja Pilsen 350ml",
        399,
        None,
        Some(QuantityDiscount {
            min_qty: 12,
            value: DiscountValue::Percent(500),
        }),
    ),
    ("LEITE-1L", "Leite Integral 1L", 549, None, None),
    ("ACUCAR-1KG", "Açúcar Refinado 1kg", 479, None, None),
];

fn parse_db_path() -> String {
    let args: Vec<String> = env::args().collect();
    args.iter()
        .position(|a| a.as_str() == "--db")
        .and_then(|i| args.get(i + 1))
        .cloned()
        .unwrap_or_else(|| "./caixa.db".to_string())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let db_path = parse_db_path();
    let db = Database::new(DbConfig::new(&db_path))
        .await
        .expect("failed to open database");

    let now = Utc::now();
    let products = db.products();
    for (sku, name, price_cents, promotion, quantity_discount) in PRODUCTS {
        let product = Product {
            id: Uuid::new_v4().to_string(),
            sku: sku.to_string(),
            barcode: Some(format!("7890000{:06}", price_cents)),
            name: name.to_string(),
            price_cents: *price_cents,
            promotion: *promotion,
            quantity_discount: *quantity_discount,
            ncm: "22021000".to_string(),
            cfop: "5102".to_string(),
            csosn: "102".to_string(),
            unit: "UN".to_string(),
            track_stock: true,
            allow_negative_stock: false,
            current_stock: Some(100),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        match products.insert(&product).await {
            Ok(()) => tracing::info!(sku = %product.sku, "Seeded product"),
            Err(e) => tracing::warn!(sku = %product.sku, error = %e, "Skipping product"),
        }
    }

    let customer = Customer {
        id: Uuid::new_v4().to_string(),
        name: "Mercado do Bairro Ltda".to_string(),
        document: Some("12345678000199".to_string()),
        term_tiers: vec![
            TermTier {
                days: 30,
                bps: 500,
                sign: LayerSign::Discount,
            },
            TermTier {
                days: 60,
                bps: 200,
                sign: LayerSign::Surcharge,
            },
        ],
        value_tiers: vec![
            ValueTier {
                minimum_cents: 5000,
                bps: 200,
                sign: LayerSign::Discount,
            },
            ValueTier {
                minimum_cents: 8000,
                bps: 500,
                sign: LayerSign::Discount,
            },
        ],
    };

    match db.customers().insert(&customer).await {
        Ok(()) => tracing::info!(name = %customer.name, "Seeded customer"),
        Err(e) => tracing::warn!(error = %e, "Skipping customer"),
    }

    tracing::info!(db = %db_path, "Seed complete");
}
