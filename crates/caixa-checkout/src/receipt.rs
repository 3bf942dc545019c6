//! # Receipt Structure
//!
//! The flattened structure the printing service consumes: header
//! totals, per-layer discount breakdown, item lines with their
//! additional selections, payment entries with change, and the fiscal
//! stamp when the sale was authorized.
//!
//! Rendering (HTML/ESC-POS/whatever) is the printing service's
//! problem; this module only flattens.

use serde::{Deserialize, Serialize};

use caixa_core::types::{PaymentEntry, Sale, SaleItem, SaleItemOption};
use caixa_fiscal::Authorization;

/// One additional selection under a receipt item line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptOption {
    pub name: String,
    pub price_cents: i64,
    pub quantity: i64,
}

/// One item line on the receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptItem {
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// Price before the manual discount, shown struck-through when it
    /// differs from `unit_price_cents`.
    pub original_price_cents: i64,
    pub line_total_cents: i64,
    pub options: Vec<ReceiptOption>,
    pub staff_id: Option<String>,
    pub note: Option<String>,
}

/// One payment entry on the receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptPayment {
    pub method_id: String,
    pub amount_cents: i64,
}

/// Fiscal authorization stamp, present only on authorized sales.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiscalStamp {
    pub access_key: String,
    pub protocol: String,
    pub authorized_at: String,
}

/// The complete flattened receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub sale_id: String,
    pub store_name: String,
    /// "NFC-e 65/1-000042" style reference.
    pub document_reference: String,
    pub timestamp: String,

    pub items: Vec<ReceiptItem>,

    pub subtotal_cents: i64,
    /// Signed per-layer deductions (positive reduces the total).
    pub global_discount_cents: i64,
    pub term_discount_cents: i64,
    pub value_tier_discount_cents: i64,
    pub total_cents: i64,

    pub payments: Vec<ReceiptPayment>,
    pub change_cents: i64,

    pub fiscal: Option<FiscalStamp>,
}

/// Flattens a persisted sale into its printable receipt.
pub fn build_receipt(
    store_name: &str,
    sale: &Sale,
    items: &[SaleItem],
    options: &[SaleItemOption],
    payments: &[PaymentEntry],
    fiscal: Option<&Authorization>,
) -> Receipt {
    let items = items
        .iter()
        .map(|item| ReceiptItem {
            name: item.name_snapshot.clone(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price_cents,
            original_price_cents: item.original_price_cents,
            line_total_cents: item.line_total_cents,
            options: options
                .iter()
                .filter(|o| o.sale_item_id == item.id)
                .map(|o| ReceiptOption {
                    name: o.name.clone(),
                    price_cents: o.price_cents,
                    quantity: o.quantity,
                })
                .collect(),
            staff_id: item.staff_id.clone(),
            note: item.note.clone(),
        })
        .collect();

    Receipt {
        sale_id: sale.id.clone(),
        store_name: store_name.to_string(),
        document_reference: format!(
            "NFC-e {}/{}-{:06}",
            sale.document_model, sale.series, sale.number
        ),
        timestamp: sale
            .completed_at
            .unwrap_or(sale.created_at)
            .to_rfc3339(),
        items,
        subtotal_cents: sale.subtotal_cents,
        global_discount_cents: sale.global_discount_cents,
        term_discount_cents: sale.term_discount_cents,
        value_tier_discount_cents: sale.value_tier_discount_cents,
        total_cents: sale.total_cents,
        payments: payments
            .iter()
            .map(|p| ReceiptPayment {
                method_id: p.method_id.clone(),
                amount_cents: p.amount_cents,
            })
            .collect(),
        change_cents: sale.change_cents,
        fiscal: fiscal.map(|a| FiscalStamp {
            access_key: a.access_key.clone(),
            protocol: a.protocol.clone(),
            authorized_at: a.authorized_at.to_rfc3339(),
        }),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
