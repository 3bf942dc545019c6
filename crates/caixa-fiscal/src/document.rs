//! # NFC-e Document Model
//!
//! The document sent to the fiscal authority: company registration,
//! the reserved number/series, the optional buyer document and the
//! item list with its tax codes (NCM/CFOP/CSOSN/unit).
//!
//! Built from the **persisted** sale rows, not the live cart: the sale
//! item snapshot already froze every code the document needs, which is
//! what lets the retransmit path rebuild an identical document later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use caixa_core::types::{Sale, SaleItem};

use crate::error::{FiscalError, FiscalResult};

// =============================================================================
// Company Registration
// =============================================================================

/// The emitter's fiscal registration, carried on every document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRegistration {
    pub cnpj: String,
    /// State registration ("inscrição estadual").
    pub ie: String,
    pub corporate_name: String,
}

// =============================================================================
// Document
// =============================================================================

/// One item line of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfceItem {
    /// Item code (the SKU snapshot).
    pub code: String,
    pub description: String,
    pub ncm: String,
    pub cfop: String,
    pub csosn: String,
    pub unit: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_cents: i64,
}

/// A consumer electronic fiscal receipt (NFC-e, model 65) ready to
/// emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfceDocument {
    pub company: CompanyRegistration,

    pub model: i64,
    pub series: i64,
    pub number: i64,

    /// Buyer CPF/CNPJ, printed when the customer asks for it.
    pub buyer_document: Option<String>,

    pub items: Vec<NfceItem>,
    pub total_cents: i64,

    pub issued_at: DateTime<Utc>,
}

impl NfceDocument {
    /// Builds the document from a persisted sale and its item rows.
    ///
    /// Fails only on structural problems the gateway would reject
    /// anyway: an empty item list or a blank company registration.
    pub fn from_sale(
        company: &CompanyRegistration,
        sale: &Sale,
        items: &[SaleItem],
        issued_at: DateTime<Utc>,
    ) -> FiscalResult<Self> {
        if company.cnpj.trim().is_empty() {
            return Err(FiscalError::InvalidDocument(
                "company CNPJ is required".to_string(),
            ));
        }
        if items.is_empty() {
            return Err(FiscalError::InvalidDocument(
                "document has no items".to_string(),
            ));
        }

        Ok(NfceDocument {
            company: company.clone(),
            model: sale.document_model,
            series: sale.series,
            number: sale.number,
            buyer_document: sale.buyer_document.clone(),
            items: items
                .iter()
                .map(|item| NfceItem {
                    code: item.sku_snapshot.clone(),
                    description: item.name_snapshot.clone(),
                    ncm: item.ncm.clone(),
                    cfop: item.cfop.clone(),
                    csosn: item.csosn.clone(),
                    unit: item.unit.clone(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price_cents,
                    total_cents: item.line_total_cents,
                })
                .collect(),
            total_cents: sale.total_cents,
            issued_at,
        })
    }

    /// Human-readable document reference, also used as the stock
    /// ledger observation tag.
    pub fn reference(&self) -> String {
        format!("NFC-e {}/{}-{:06}", self.model, self.series, self.number)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
