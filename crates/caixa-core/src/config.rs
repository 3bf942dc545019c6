//! # Checkout Configuration
//!
//! One typed configuration struct with named options and explicit
//! defaults, loaded once per session and treated as immutable
//! afterwards. Replaces the "large dynamic object with dozens of
//! booleans" shape with something the compiler can check.
//!
//! ## Sources (priority order)
//! 1. Environment variables (`CAIXA_*`)
//! 2. Defaults (this file)

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::NFCE_MODEL;

/// Checkout configuration.
///
/// Read-only after initialization; no mutex needed.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutConfig {
    /// Company (emitter) id the sales belong to.
    pub company_id: String,

    /// Company fiscal registration, carried onto every NFC-e.
    pub cnpj: String,
    /// State registration ("inscrição estadual").
    pub ie: String,
    pub corporate_name: String,

    /// Store name shown on receipts.
    pub store_name: String,

    /// Fiscal document model to emit (65 = NFC-e).
    pub document_model: i64,

    /// Fiscal series this terminal reserves numbers in.
    pub series: i64,

    /// Whether finalize requests emit a fiscal document by default.
    pub emit_fiscal_default: bool,

    /// Whether every cart line must have a staff member assigned
    /// before finalize (drives the pending-input queue).
    pub require_staff_on_items: bool,

    /// Authority-imposed cancellation window, in minutes since
    /// emission.
    pub cancel_window_minutes: i64,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        CheckoutConfig {
            company_id: "00000000-0000-0000-0000-000000000001".to_string(),
            cnpj: "00000000000000".to_string(),
            ie: "ISENTO".to_string(),
            corporate_name: "Caixa POS Dev Ltda".to_string(),
            store_name: "Caixa POS Dev".to_string(),
            document_model: NFCE_MODEL,
            series: 1,
            emit_fiscal_default: true,
            require_staff_on_items: false,
            cancel_window_minutes: 30,
        }
    }
}

impl CheckoutConfig {
    /// Builds a configuration from environment variables over defaults.
    ///
    /// ## Environment Variables
    /// - `CAIXA_COMPANY_ID`, `CAIXA_CNPJ`, `CAIXA_IE`,
    ///   `CAIXA_CORPORATE_NAME`, `CAIXA_STORE_NAME`
    /// - `CAIXA_SERIES` (integer)
    /// - `CAIXA_EMIT_FISCAL` ("true"/"false")
    pub fn from_env() -> Self {
        let mut config = CheckoutConfig::default();

        if let Ok(v) = std::env::var("CAIXA_COMPANY_ID") {
            config.company_id = v;
        }
        if let Ok(v) = std::env::var("CAIXA_CNPJ") {
            config.cnpj = v;
        }
        if let Ok(v) = std::env::var("CAIXA_IE") {
            config.ie = v;
        }
        if let Ok(v) = std::env::var("CAIXA_CORPORATE_NAME") {
            config.corporate_name = v;
        }
        if let Ok(v) = std::env::var("CAIXA_STORE_NAME") {
            config.store_name = v;
        }
        if let Ok(v) = std::env::var("CAIXA_SERIES") {
            if let Ok(series) = v.parse::<i64>() {
                config.series = series;
            }
        }
        if let Ok(v) = std::env::var("CAIXA_EMIT_FISCAL") {
            config.emit_fiscal_default = v == "true" || v == "1";
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CheckoutConfig::default();
        assert_eq!(config.document_model, NFCE_MODEL);
        assert_eq!(config.series, 1);
        assert!(config.emit_fiscal_default);
        assert_eq!(config.cancel_window_minutes, 30);
    }
}
