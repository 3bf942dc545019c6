//! # Sale Session
//!
//! The finalize-sale aggregate and its phase machine.
//!
//! ## One Aggregate, Pure Reducers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Idle → Validating → NumberReserved → SalePersisted                 │
//! │            │              │                │                        │
//! │            ▼              ▼                ▼                        │
//! │         Aborted ◄──── (any pre-Verified failure)                    │
//! │                                                                     │
//! │  → ItemsPersisted → StockAdjusted → Verified                        │
//! │                                        │                            │
//! │              ┌─────────────────────────┼──────────────┐             │
//! │              ▼                         ▼              ▼             │
//! │        FiscalSkipped            FiscalEmitting ──► FiscalFailed     │
//! │              │                         │              │             │
//! │              │                         ▼              │             │
//! │              │                  FiscalConfirmed       │             │
//! │              └───────────────┬─────────┴──────────────┘             │
//! │                              ▼                                      │
//! │                          Completed                                  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every checkout fact (cart snapshot, chosen discounts, ledger,
//! reservation, totals breakdown, terminal message) lives on one
//! `SaleSession` value instead of a cloud of independent flags. Each
//! transition is a pure reducer: it consumes the session, checks the
//! edge is legal, and returns the advanced session. All I/O stays in
//! the orchestration crate.
//!
//! Once `Verified` is reached the sale is durably recorded and the
//! machine can no longer abort; a fiscal failure downgrades to
//! `FiscalFailed` but still completes.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::cart::Cart;
use crate::discount::{payable_total, TotalBreakdown};
use crate::error::{CoreError, CoreResult};
use crate::payment::PaymentLedger;
use crate::types::{Customer, DiscountValue, ReservationToken, TermTier};

// =============================================================================
// Finalize Phase
// =============================================================================

/// The phase the finalize flow is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum FinalizePhase {
    Idle,
    Validating,
    NumberReserved,
    SalePersisted,
    ItemsPersisted,
    StockAdjusted,
    Verified,
    FiscalSkipped,
    FiscalEmitting,
    FiscalConfirmed,
    FiscalFailed,
    Completed,
    Aborted,
}

impl FinalizePhase {
    pub const fn name(&self) -> &'static str {
        match self {
            FinalizePhase::Idle => "idle",
            FinalizePhase::Validating => "validating",
            FinalizePhase::NumberReserved => "number_reserved",
            FinalizePhase::SalePersisted => "sale_persisted",
            FinalizePhase::ItemsPersisted => "items_persisted",
            FinalizePhase::StockAdjusted => "stock_adjusted",
            FinalizePhase::Verified => "verified",
            FinalizePhase::FiscalSkipped => "fiscal_skipped",
            FinalizePhase::FiscalEmitting => "fiscal_emitting",
            FinalizePhase::FiscalConfirmed => "fiscal_confirmed",
            FinalizePhase::FiscalFailed => "fiscal_failed",
            FinalizePhase::Completed => "completed",
            FinalizePhase::Aborted => "aborted",
        }
    }

    /// Terminal phases end the flow; every exit path lands on one.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, FinalizePhase::Completed | FinalizePhase::Aborted)
    }

    /// Phases from which the flow may still abort. After `Verified`
    /// the sale is durable and abort is no longer a legal edge.
    pub const fn can_abort(&self) -> bool {
        matches!(
            self,
            FinalizePhase::Idle
                | FinalizePhase::Validating
                | FinalizePhase::NumberReserved
                | FinalizePhase::SalePersisted
                | FinalizePhase::ItemsPersisted
                | FinalizePhase::StockAdjusted
        )
    }

    /// Legal forward edges of the machine.
    fn can_advance_to(&self, next: FinalizePhase) -> bool {
        use FinalizePhase::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, NumberReserved)
                | (NumberReserved, SalePersisted)
                | (SalePersisted, ItemsPersisted)
                | (ItemsPersisted, StockAdjusted)
                | (StockAdjusted, Verified)
                | (Verified, FiscalSkipped)
                | (Verified, FiscalEmitting)
                | (FiscalEmitting, FiscalConfirmed)
                | (FiscalEmitting, FiscalFailed)
                | (FiscalSkipped, Completed)
                | (FiscalConfirmed, Completed)
                | (FiscalFailed, Completed)
        )
    }
}

// =============================================================================
// Sale Session
// =============================================================================

/// Everything one finalize invocation works on, read once at
/// validation time and owned by the orchestrator until a terminal
/// phase is reached.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleSession {
    pub phase: FinalizePhase,

    /// Cart snapshot taken at validation time.
    pub cart: Cart,
    pub customer: Option<Customer>,

    /// Operator-entered discount on total.
    pub global_discount: Option<DiscountValue>,
    /// Operator-selected customer term tier.
    pub term_tier: Option<TermTier>,

    pub ledger: PaymentLedger,

    /// Whether fiscal emission was requested for this sale.
    pub emit_fiscal: bool,
    /// Buyer document (CPF/CNPJ) for the fiscal receipt, if given.
    pub buyer_document: Option<String>,

    /// Set by `validate`.
    pub breakdown: Option<TotalBreakdown>,
    /// Set by `number_reserved`.
    pub reservation: Option<ReservationToken>,

    /// Last gateway error, set by `fiscal_failed`.
    pub fiscal_error: Option<String>,

    /// Terminal, user-visible message. Exactly one per exit path.
    pub message: Option<String>,
}

impl SaleSession {
    /// Creates an idle session from the UI-submitted facts.
    pub fn new(
        cart: Cart,
        customer: Option<Customer>,
        global_discount: Option<DiscountValue>,
        term_tier: Option<TermTier>,
        ledger: PaymentLedger,
        emit_fiscal: bool,
        buyer_document: Option<String>,
    ) -> Self {
        SaleSession {
            phase: FinalizePhase::Idle,
            cart,
            customer,
            global_discount,
            term_tier,
            ledger,
            emit_fiscal,
            buyer_document,
            breakdown: None,
            reservation: None,
            fiscal_error: None,
            message: None,
        }
    }

    fn advance(mut self, next: FinalizePhase) -> CoreResult<Self> {
        if !self.phase.can_advance_to(next) {
            return Err(CoreError::IllegalTransition {
                from: self.phase.name(),
                to: next.name(),
            });
        }
        self.phase = next;
        Ok(self)
    }

    /// Idle → Validating.
    ///
    /// Checks the cart is non-empty, recomputes the payable total (the
    /// operator discount is validated here, before any side effect) and
    /// checks the ledger settles it. Any failure leaves no side effect;
    /// the caller aborts the session with the error.
    pub fn validate(self) -> CoreResult<Self> {
        let mut session = self.advance(FinalizePhase::Validating)?;

        if session.cart.is_empty() {
            return Err(CoreError::EmptyCart);
        }

        let breakdown = payable_total(
            session.cart.subtotal(),
            session.global_discount,
            session.term_tier.as_ref(),
            session
                .customer
                .as_ref()
                .map(|c| c.value_tiers.as_slice())
                .unwrap_or(&[]),
        )?;

        // The ledger must have been built against this exact total.
        if session.ledger.total_due().cents() != breakdown.total_cents {
            return Err(CoreError::BalanceNotCovered {
                remaining_cents: breakdown.total_cents - session.ledger.paid().cents(),
            });
        }
        session.ledger.ensure_settled()?;

        session.breakdown = Some(breakdown);
        Ok(session)
    }

    /// Validating → NumberReserved. The token is fixed before any
    /// persistence so the number is embedded in the stored sale even if
    /// later steps fail.
    pub fn number_reserved(self, token: ReservationToken) -> CoreResult<Self> {
        let mut session = self.advance(FinalizePhase::NumberReserved)?;
        session.reservation = Some(token);
        Ok(session)
    }

    pub fn sale_persisted(self) -> CoreResult<Self> {
        self.advance(FinalizePhase::SalePersisted)
    }

    pub fn items_persisted(self) -> CoreResult<Self> {
        self.advance(FinalizePhase::ItemsPersisted)
    }

    pub fn stock_adjusted(self) -> CoreResult<Self> {
        self.advance(FinalizePhase::StockAdjusted)
    }

    pub fn verified(self) -> CoreResult<Self> {
        self.advance(FinalizePhase::Verified)
    }

    pub fn fiscal_skipped(self) -> CoreResult<Self> {
        self.advance(FinalizePhase::FiscalSkipped)
    }

    pub fn fiscal_emitting(self) -> CoreResult<Self> {
        self.advance(FinalizePhase::FiscalEmitting)
    }

    pub fn fiscal_confirmed(self) -> CoreResult<Self> {
        self.advance(FinalizePhase::FiscalConfirmed)
    }

    /// FiscalEmitting → FiscalFailed. The error text is kept on the
    /// session (and the stored sale) for later operator review; the
    /// flow still completes.
    pub fn fiscal_failed(self, error: impl Into<String>) -> CoreResult<Self> {
        let mut session = self.advance(FinalizePhase::FiscalFailed)?;
        session.fiscal_error = Some(error.into());
        Ok(session)
    }

    /// Any fiscal-terminal phase → Completed.
    pub fn completed(self, message: impl Into<String>) -> CoreResult<Self> {
        let mut session = self.advance(FinalizePhase::Completed)?;
        session.message = Some(message.into());
        Ok(session)
    }

    /// Aborts the flow. Legal only before `Verified`: once the sale is
    /// durably recorded there is no rollback, only the fiscal leg may
    /// still degrade.
    pub fn abort(mut self, message: impl Into<String>) -> CoreResult<Self> {
        if !self.phase.can_abort() {
            return Err(CoreError::IllegalTransition {
                from: self.phase.name(),
                to: FinalizePhase::Aborted.name(),
            });
        }
        self.phase = FinalizePhase::Aborted;
        self.message = Some(message.into());
        Ok(self)
    }
}

// =============================================================================
// Pending Inputs
// =============================================================================

/// A required input the UI must resolve before finalize can start
/// (assign a staff member, confirm a quantity, pick a term tier).
///
/// Modeled as an explicit ordered queue resolved one at a time,
/// instead of a combination of "waiting for X" booleans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PendingInput {
    AssignStaff { product_id: String },
    ConfirmQuantity { product_id: String },
    SelectTermTier,
}

/// Ordered queue of pending required inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InputQueue {
    #[ts(as = "Vec<PendingInput>")]
    queue: VecDeque<PendingInput>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a required input, skipping exact duplicates.
    pub fn push(&mut self, input: PendingInput) {
        if !self.queue.contains(&input) {
            self.queue.push_back(input);
        }
    }

    /// The input that must be resolved next, if any.
    pub fn current(&self) -> Option<&PendingInput> {
        self.queue.front()
    }

    /// Marks the current input resolved and moves to the next.
    pub fn resolve(&mut self) -> Option<PendingInput> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::types::{PaymentClass, Product};
    use chrono::Utc;

    fn product(price_cents: i64) -> Product {
        Product {
            id: "p1".to_string(),
            sku: "SKU-1".to_string(),
            barcode: None,
            name: "Produto".to_string(),
            price_cents,
            promotion: None,
            quantity_discount: None,
            ncm: "22021000".to_string(),
            cfop: "5102".to_string(),
            csosn: "102".to_string(),
            unit: "UN".to_string(),
            track_stock: false,
            allow_negative_stock: false,
            current_stock: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn settled_session(emit_fiscal: bool) -> SaleSession {
        let mut cart = Cart::new();
        cart.add_item(&product(10_000), 1).unwrap();
        let ledger =
            PaymentLedger::single(Money::from_cents(10_000), "pix", PaymentClass::Electronic)
                .unwrap();
        SaleSession::new(cart, None, None, None, ledger, emit_fiscal, None)
    }

    fn token() -> ReservationToken {
        ReservationToken {
            company_id: "c1".to_string(),
            model: 65,
            series: 1,
            number: 7,
        }
    }

    #[test]
    fn test_happy_path_without_fiscal() {
        let session = settled_session(false)
            .validate()
            .unwrap()
            .number_reserved(token())
            .unwrap()
            .sale_persisted()
            .unwrap()
            .items_persisted()
            .unwrap()
            .stock_adjusted()
            .unwrap()
            .verified()
            .unwrap()
            .fiscal_skipped()
            .unwrap()
            .completed("Venda finalizada")
            .unwrap();

        assert_eq!(session.phase, FinalizePhase::Completed);
        assert!(session.breakdown.is_some());
        assert_eq!(session.message.as_deref(), Some("Venda finalizada"));
    }

    #[test]
    fn test_fiscal_failure_still_completes() {
        let session = settled_session(true)
            .validate()
            .unwrap()
            .number_reserved(token())
            .unwrap()
            .sale_persisted()
            .unwrap()
            .items_persisted()
            .unwrap()
            .stock_adjusted()
            .unwrap()
            .verified()
            .unwrap()
            .fiscal_emitting()
            .unwrap()
            .fiscal_failed("rejeição 539")
            .unwrap()
            .completed("Venda gravada; NFC-e pendente")
            .unwrap();

        assert_eq!(session.phase, FinalizePhase::Completed);
        assert_eq!(session.fiscal_error.as_deref(), Some("rejeição 539"));
    }

    #[test]
    fn test_validate_rejects_empty_cart() {
        let ledger = PaymentLedger::new(Money::zero());
        let session = SaleSession::new(Cart::new(), None, None, None, ledger, false, None);
        assert!(matches!(
            session.validate().unwrap_err(),
            CoreError::EmptyCart
        ));
    }

    #[test]
    fn test_validate_rejects_unsettled_ledger() {
        let mut cart = Cart::new();
        cart.add_item(&product(10_000), 1).unwrap();
        // Ledger built for the right total but only partially paid.
        let mut ledger = PaymentLedger::new(Money::from_cents(10_000));
        ledger
            .add_entry("pix", PaymentClass::Electronic, Some(Money::from_cents(4000)))
            .unwrap();

        let session = SaleSession::new(cart, None, None, None, ledger, false, None);
        assert!(matches!(
            session.validate().unwrap_err(),
            CoreError::BalanceNotCovered { .. }
        ));
    }

    #[test]
    fn test_validate_rejects_stale_ledger_total() {
        let mut cart = Cart::new();
        cart.add_item(&product(10_000), 1).unwrap();
        // Ledger settled against a stale total.
        let ledger =
            PaymentLedger::single(Money::from_cents(9000), "pix", PaymentClass::Electronic)
                .unwrap();

        let session = SaleSession::new(cart, None, None, None, ledger, false, None);
        assert!(matches!(
            session.validate().unwrap_err(),
            CoreError::BalanceNotCovered { .. }
        ));
    }

    #[test]
    fn test_skipping_phases_is_illegal() {
        let session = settled_session(false).validate().unwrap();
        // Jumping from Validating straight to SalePersisted must fail.
        assert!(matches!(
            session.sale_persisted().unwrap_err(),
            CoreError::IllegalTransition { .. }
        ));
    }

    #[test]
    fn test_abort_is_illegal_after_verified() {
        let session = settled_session(false)
            .validate()
            .unwrap()
            .number_reserved(token())
            .unwrap()
            .sale_persisted()
            .unwrap()
            .items_persisted()
            .unwrap()
            .stock_adjusted()
            .unwrap()
            .verified()
            .unwrap();

        assert!(matches!(
            session.abort("too late").unwrap_err(),
            CoreError::IllegalTransition { .. }
        ));
    }

    #[test]
    fn test_abort_before_verified_sets_message() {
        let session = settled_session(false)
            .validate()
            .unwrap()
            .number_reserved(token())
            .unwrap()
            .abort("Falha ao gravar venda")
            .unwrap();

        assert_eq!(session.phase, FinalizePhase::Aborted);
        assert_eq!(session.message.as_deref(), Some("Falha ao gravar venda"));
    }

    #[test]
    fn test_input_queue_resolves_in_order() {
        let mut queue = InputQueue::new();
        queue.push(PendingInput::AssignStaff {
            product_id: "p1".to_string(),
        });
        queue.push(PendingInput::SelectTermTier);
        // Duplicate is ignored.
        queue.push(PendingInput::SelectTermTier);

        assert_eq!(queue.len(), 2);
        assert!(matches!(
            queue.current(),
            Some(PendingInput::AssignStaff { .. })
        ));

        queue.resolve();
        assert!(matches!(queue.current(), Some(PendingInput::SelectTermTier)));

        queue.resolve();
        assert!(queue.is_empty());
    }
}
