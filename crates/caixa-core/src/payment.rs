//! # Payment Ledger
//!
//! Records payment entries against the payable total and computes the
//! remaining balance and change.
//!
//! ## Tender Rules
//! - Split mode accumulates entries; re-using a method merges (sums)
//!   into the existing entry instead of duplicating it.
//! - An empty/zero entered amount defaults to the remaining balance.
//! - Electronic entries must not exceed the remaining balance.
//! - Cash entries may exceed it; the excess becomes change.
//! - Finalization is blocked while any balance remains.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{PaymentClass, PaymentEntry};

// =============================================================================
// Tender Outcome
// =============================================================================

/// What one accepted tender did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TenderOutcome {
    /// Amount actually recorded for this tender.
    pub amount_cents: i64,
    /// Balance still owed after this tender.
    pub remaining_cents: i64,
    /// Total change owed to the customer so far.
    pub change_cents: i64,
}

// =============================================================================
// Payment Ledger
// =============================================================================

/// The payments collected towards one sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentLedger {
    total_due_cents: i64,
    entries: Vec<PaymentEntry>,
}

impl PaymentLedger {
    /// Creates an empty ledger for the given payable total.
    pub fn new(total_due: Money) -> Self {
        PaymentLedger {
            total_due_cents: total_due.cents(),
            entries: Vec::new(),
        }
    }

    /// Single-payment mode: one method covers the total exactly.
    ///
    /// Fails when no method was chosen.
    pub fn single(total_due: Money, method_id: &str, class: PaymentClass) -> CoreResult<Self> {
        let mut ledger = PaymentLedger::new(total_due);
        ledger.add_entry(method_id, class, None)?;
        Ok(ledger)
    }

    /// Records a tender.
    ///
    /// ## Arguments
    /// * `amount` - `None` or zero means "the remaining balance".
    ///
    /// ## Behavior
    /// - Same method id merges into the existing entry (amounts sum).
    /// - Electronic tender above the remaining balance is rejected.
    /// - Cash tender above the remaining balance is accepted; the
    ///   excess shows up in [`PaymentLedger::change`].
    pub fn add_entry(
        &mut self,
        method_id: &str,
        class: PaymentClass,
        amount: Option<Money>,
    ) -> CoreResult<TenderOutcome> {
        let method_id = method_id.trim();
        if method_id.is_empty() {
            return Err(ValidationError::Required {
                field: "payment method".to_string(),
            }
            .into());
        }

        let remaining = self.remaining();

        // Empty/zero entered amount defaults to the remaining balance.
        let amount = match amount {
            Some(m) if !m.is_zero() => m,
            _ => remaining,
        };

        if amount.is_negative() || amount.is_zero() {
            return Err(ValidationError::MustBePositive {
                field: "payment amount".to_string(),
            }
            .into());
        }

        if class == PaymentClass::Electronic && amount > remaining {
            return Err(CoreError::ElectronicOverpayment {
                method_id: method_id.to_string(),
                amount_cents: amount.cents(),
                remaining_cents: remaining.cents(),
            });
        }

        // Merge into an existing entry for the same method.
        match self.entries.iter_mut().find(|e| e.method_id == method_id) {
            Some(entry) => entry.amount_cents += amount.cents(),
            None => self.entries.push(PaymentEntry {
                method_id: method_id.to_string(),
                class,
                amount_cents: amount.cents(),
            }),
        }

        Ok(TenderOutcome {
            amount_cents: amount.cents(),
            remaining_cents: self.remaining().cents(),
            change_cents: self.change().cents(),
        })
    }

    /// The payable total this ledger settles.
    #[inline]
    pub fn total_due(&self) -> Money {
        Money::from_cents(self.total_due_cents)
    }

    /// Sum of all recorded tenders.
    pub fn paid(&self) -> Money {
        Money::from_cents(self.entries.iter().map(|e| e.amount_cents).sum())
    }

    /// Balance still owed (never negative).
    pub fn remaining(&self) -> Money {
        (self.total_due() - self.paid()).clamp_non_negative()
    }

    /// Change owed to the customer (never negative).
    ///
    /// Only cash can overpay, so any excess is cash excess by
    /// construction.
    pub fn change(&self) -> Money {
        (self.paid() - self.total_due()).clamp_non_negative()
    }

    /// The recorded entries, in tender order.
    #[inline]
    pub fn entries(&self) -> &[PaymentEntry] {
        &self.entries
    }

    /// Whether the total is fully covered by at least one entry.
    pub fn is_settled(&self) -> bool {
        !self.entries.is_empty() && self.remaining().is_zero()
    }

    /// Finalization gate: at least one method chosen and no balance
    /// remaining.
    pub fn ensure_settled(&self) -> CoreResult<()> {
        if self.entries.is_empty() {
            return Err(CoreError::NoPaymentMethod);
        }

        let remaining = self.remaining();
        if !remaining.is_zero() {
            return Err(CoreError::BalanceNotCovered {
                remaining_cents: remaining.cents(),
            });
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
