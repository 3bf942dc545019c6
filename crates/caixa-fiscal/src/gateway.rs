//! # Fiscal Gateway Seam
//!
//! The trait the orchestrator emits and cancels through. The real
//! implementation wraps the authority round trip (an external
//! collaborator); tests script it.
//!
//! ## Contract
//! - `emit` either returns an [`Authorization`] (access key, protocol,
//!   timestamp) or an error. The caller decides what a failure means;
//!   for finalize it never rolls back the local sale.
//! - `cancel` reverses an authorized document. The authority imposes a
//!   time window; the emitting side must check [`CancelPolicy`]
//!   **before** calling.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::document::NfceDocument;
use crate::error::{FiscalError, FiscalResult};

// =============================================================================
// Authorization
// =============================================================================

/// A successful emission: what the authority handed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    /// NFC-e access key (44 digits in production).
    pub access_key: String,
    /// Authorization protocol number.
    pub protocol: String,
    pub authorized_at: DateTime<Utc>,
}

// =============================================================================
// Gateway Trait
// =============================================================================

/// The emit/cancel seam to the fiscal authority.
#[allow(async_fn_in_trait)]
pub trait FiscalGateway {
    /// Emits a document. A `Rejected` error is a business refusal the
    /// operator must fix; a `Transport` error is retryable as-is.
    async fn emit(&self, document: &NfceDocument) -> FiscalResult<Authorization>;

    /// Cancels an authorized document, within the authority window.
    async fn cancel(&self, access_key: &str, protocol: &str, reason: &str) -> FiscalResult<()>;
}

// =============================================================================
// Cancellation Window
// =============================================================================

/// The authority-imposed cancellation window, enforced on the emitting
/// side before any cancel call goes out.
#[derive(Debug, Clone, Copy)]
pub struct CancelPolicy {
    window_minutes: i64,
}

impl CancelPolicy {
    pub fn from_minutes(window_minutes: i64) -> Self {
        CancelPolicy { window_minutes }
    }

    /// Checks that `now` is still within the window after
    /// `authorized_at`.
    pub fn check(&self, authorized_at: DateTime<Utc>, now: DateTime<Utc>) -> FiscalResult<()> {
        let elapsed = now.signed_duration_since(authorized_at);
        if elapsed > Duration::minutes(self.window_minutes) {
            return Err(FiscalError::WindowExpired {
                elapsed_minutes: elapsed.num_minutes(),
                window_minutes: self.window_minutes,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
