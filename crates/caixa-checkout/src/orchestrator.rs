//! # Sale Finalization Orchestrator
//!
//! Turns a cart into a persisted, optionally fiscally-authorized sale.
//!
//! ## The Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  finalize(cart, request)                                            │
//! │       │                                                             │
//! │       ├─ busy? ──────────────► rejected immediately (not queued)    │
//! │       ▼                                                             │
//! │  Validate (cart, ledger, discount bounds)     ── fail: Abort,       │
//! │       ▼                                          NO side effect     │
//! │  Reserve fiscal number (before any write!)                          │
//! │       ▼                                                             │
//! │  Insert sale header ── Insert items/options/payments ── Adjust      │
//! │  stock                        ── any fail: Abort, retry re-reserves │
//! │       ▼                                                             │
//! │  Verify: re-read rows, counts must match      ── mismatch: Abort    │
//! │       ▼                                          (orphan flagged)   │
//! │  ── sale is now durable; no rollback below this line ──             │
//! │       ▼                                                             │
//! │  Emit NFC-e (if requested)                                          │
//! │    ok   → authorized, stamp key/protocol                            │
//! │    fail → fiscal status = pending, error kept, STILL completes      │
//! │       ▼                                                             │
//! │  Complete: stamp time, clear cart, publish SaleFinalized            │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every step is one awaited call; nothing runs in parallel within a
//! finalize, and there is no cancellation once the number is reserved.
//! The local-commit-wins asymmetry is deliberate: the money already
//! changed hands, fiscal emission is a separate retryable obligation
//! repaired through [`SaleFinalizer::retransmit_fiscal`].

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use caixa_core::config::CheckoutConfig;
use caixa_core::payment::PaymentLedger;
use caixa_core::session::{InputQueue, PendingInput, SaleSession};
use caixa_core::types::{
    Customer, DiscountValue, FiscalStatus, Sale, SaleItem, SaleItemOption, TermTier,
};
use caixa_core::ValidationError;
use caixa_fiscal::{Authorization, CancelPolicy, CompanyRegistration, FiscalGateway, NfceDocument};

use crate::error::FinalizeError;
use crate::events::{CheckoutEvent, EventBus};
use crate::receipt::{build_receipt, Receipt};
use crate::state::CartHandle;
use crate::store::{CheckoutStore, SaleProbe};

// =============================================================================
// Request / Outcome
// =============================================================================

/// What the UI submits to finalize the current cart.
#[derive(Debug, Clone)]
pub struct FinalizeRequest {
    pub customer: Option<Customer>,
    /// Operator-entered discount on total.
    pub global_discount: Option<DiscountValue>,
    /// Operator-selected customer term tier.
    pub term_tier: Option<TermTier>,
    /// Payments collected against the payable total.
    pub ledger: PaymentLedger,
    /// Overrides the configured default when set.
    pub emit_fiscal: Option<bool>,
    /// Buyer CPF/CNPJ for the fiscal receipt.
    pub buyer_document: Option<String>,
}

/// How the fiscal leg ended.
#[derive(Debug, Clone)]
pub enum FiscalResolution {
    /// No emission was requested (or no gateway is configured).
    Skipped,
    Authorized(Authorization),
    /// Emission failed; the sale is durable with status pending and
    /// the error text attached for the retransmit path.
    Pending { error: String },
}

/// The terminal success outcome: a durable sale, its receipt and one
/// user-visible message.
#[derive(Debug, Clone)]
pub struct CompletedSale {
    pub sale: Sale,
    pub receipt: Receipt,
    pub fiscal: FiscalResolution,
    pub message: String,
}

// =============================================================================
// Finalizer
// =============================================================================

/// The orchestrator. One instance per terminal; holds the store, the
/// probe, the optional gateway, the event bus and the busy flag.
pub struct SaleFinalizer<S, P, G> {
    config: CheckoutConfig,
    store: S,
    probe: P,
    gateway: Option<G>,
    cancel_policy: CancelPolicy,
    events: EventBus,
    busy: AtomicBool,
}

/// Clears the busy flag on every exit path.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<S, P, G> SaleFinalizer<S, P, G>
where
    S: CheckoutStore,
    P: SaleProbe,
    G: FiscalGateway,
{
    pub fn new(config: CheckoutConfig, store: S, probe: P, gateway: Option<G>) -> Self {
        let cancel_policy = CancelPolicy::from_minutes(config.cancel_window_minutes);
        SaleFinalizer {
            config,
            store,
            probe,
            gateway,
            cancel_policy,
            events: EventBus::default(),
            busy: AtomicBool::new(false),
        }
    }

    /// The event bus UI layers subscribe to.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The required inputs still blocking finalize for this cart.
    ///
    /// Resolved one at a time by the UI before submitting; finalize
    /// itself re-checks and rejects while any remain.
    pub fn pending_inputs(&self, cart_state: &CartHandle) -> InputQueue {
        let mut queue = InputQueue::new();
        if self.config.require_staff_on_items {
            cart_state.with_cart(|cart| {
                for item in &cart.items {
                    if item.staff_id.is_none() {
                        queue.push(PendingInput::AssignStaff {
                            product_id: item.product_id.clone(),
                        });
                    }
                }
            });
        }
        queue
    }

    // =========================================================================
    // Finalize
    // =========================================================================

    /// Runs the whole finalize sequence.
    ///
    /// On success the cart is cleared and the sale is durable; a fiscal
    /// failure is reported inside [`CompletedSale::fiscal`], not as an
    /// error. Every `Err` is an abort: nothing was confirmed (except
    /// the stock/verification cases documented on [`FinalizeError`]).
    pub async fn finalize(
        &self,
        cart_state: &CartHandle,
        request: FinalizeRequest,
    ) -> Result<CompletedSale, FinalizeError> {
        // One finalize at a time; a concurrent attempt is rejected
        // immediately, never queued.
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(FinalizeError::Busy);
        }
        let _guard = BusyGuard(&self.busy);

        // ---- Validating ----------------------------------------------------
        // The cart snapshot is read once, here; the live cart is not
        // touched again until completion.
        let cart = cart_state.with_cart(|c| c.clone());

        let pending = self.pending_inputs(cart_state);
        if let Some(input) = pending.current() {
            return Err(FinalizeError::Validation(
                ValidationError::Required {
                    field: match input {
                        PendingInput::AssignStaff { product_id } => {
                            format!("staff for item {product_id}")
                        }
                        PendingInput::ConfirmQuantity { product_id } => {
                            format!("quantity for item {product_id}")
                        }
                        PendingInput::SelectTermTier => "term tier".to_string(),
                    },
                }
                .into(),
            ));
        }

        let emit_fiscal = request
            .emit_fiscal
            .unwrap_or(self.config.emit_fiscal_default);
        // Emission needs both the request and a configured gateway;
        // the inserted row's fiscal status depends on this.
        let will_emit = emit_fiscal && self.gateway.is_some();

        let session = SaleSession::new(
            cart,
            request.customer,
            request.global_discount,
            request.term_tier,
            request.ledger,
            emit_fiscal,
            request.buyer_document,
        );

        let session = match session.validate() {
            Ok(session) => session,
            Err(e) => {
                // No side effect has happened; plain validation abort.
                debug!(error = %e, "Finalize validation failed");
                return Err(FinalizeError::Validation(e));
            }
        };

        // ---- NumberReserved ------------------------------------------------
        // Before persistence, so the number is embedded in the stored
        // sale row even if a later step fails.
        let token = match self
            .store
            .reserve_next(
                &self.config.company_id,
                self.config.document_model,
                self.config.series,
            )
            .await
        {
            Ok(token) => token,
            Err(source) => {
                let err = FinalizeError::Persistence {
                    step: "reserve_number",
                    source,
                };
                Self::abort_session(session, &err);
                return Err(err);
            }
        };
        let session = session.number_reserved(token).map_err(FinalizeError::Validation)?;

        let (sale, items, options) = self.build_rows(&session, will_emit);
        let observation = document_reference(&sale);

        info!(
            sale_id = %sale.id,
            number = sale.number,
            series = sale.series,
            total = sale.total_cents,
            "Finalizing sale"
        );

        // ---- SalePersisted -------------------------------------------------
        if let Err(source) = self.store.insert_sale(&sale).await {
            let err = FinalizeError::Persistence {
                step: "insert_sale",
                source,
            };
            Self::abort_session(session, &err);
            return Err(err);
        }
        let session = session.sale_persisted().map_err(FinalizeError::Validation)?;

        // ---- ItemsPersisted ------------------------------------------------
        if let Err(source) = self
            .store
            .insert_items(&items, &options, &sale.id, session.ledger.entries())
            .await
        {
            let err = FinalizeError::Persistence {
                step: "insert_items",
                source,
            };
            Self::abort_session(session, &err);
            return Err(err);
        }
        let session = session.items_persisted().map_err(FinalizeError::Validation)?;

        // ---- StockAdjusted -------------------------------------------------
        // A failure here still aborts the whole flow even though the
        // sale/item rows above are durable; the orphaned sale is left
        // for manual inspection. There is no automated repair path.
        for item in &items {
            if let Err(source) = self
                .store
                .adjust_stock(&item.product_id, -item.quantity, &observation)
                .await
            {
                let err = FinalizeError::StockAdjustment { source };
                Self::abort_session(session, &err);
                return Err(err);
            }
        }
        let session = session.stock_adjusted().map_err(FinalizeError::Validation)?;

        // ---- Verified ------------------------------------------------------
        // Not cosmetic: the store said yes to every write above; this
        // re-reads and compares before the sale counts as recorded.
        if let Err(err) = self.verify_writes(&sale, &items, &options, &observation).await {
            Self::abort_session(session, &err);
            return Err(err);
        }
        let session = session.verified().map_err(FinalizeError::Validation)?;

        // ---- Fiscal leg ----------------------------------------------------
        // From here on the sale is durably recorded and nothing rolls
        // it back.
        let (session, mut sale, resolution) = self
            .run_fiscal_leg(session, sale, &items, will_emit)
            .await?;

        // ---- Completed -----------------------------------------------------
        let completed_at = Utc::now();
        if let Err(e) = self.store.set_completed_at(&sale.id, completed_at).await {
            // The sale is durable; a failed timestamp update is not
            // worth surfacing as a failed sale.
            warn!(sale_id = %sale.id, error = %e, "Could not stamp completion time");
        } else {
            sale.completed_at = Some(completed_at);
        }

        cart_state.with_cart_mut(|c| c.clear());

        let message = match &resolution {
            FiscalResolution::Skipped => format!("Sale {observation} completed"),
            FiscalResolution::Authorized(_) => {
                format!("Sale {observation} completed, NFC-e authorized")
            }
            FiscalResolution::Pending { error } => {
                format!("Sale {observation} recorded; fiscal emission pending: {error}")
            }
        };
        let session = session
            .completed(message.clone())
            .map_err(FinalizeError::Validation)?;
        debug!(phase = session.phase.name(), "Finalize reached terminal phase");

        self.events.publish(CheckoutEvent::SaleFinalized {
            sale_id: sale.id.clone(),
            series: sale.series,
            number: sale.number,
            total_cents: sale.total_cents,
        });

        let receipt = build_receipt(
            &self.config.store_name,
            &sale,
            &items,
            &options,
            session.ledger.entries(),
            match &resolution {
                FiscalResolution::Authorized(auth) => Some(auth),
                _ => None,
            },
        );

        info!(sale_id = %sale.id, message = %message, "Sale finalized");

        Ok(CompletedSale {
            sale,
            receipt,
            fiscal: resolution,
            message,
        })
    }

    // =========================================================================
    // Manual fiscal actions
    // =========================================================================

    /// The edit-and-retransmit path for `FiscalFailed` sales.
    ///
    /// Reuses the already-reserved number/series (never re-reserves);
    /// corrected items, when given, replace the stored rows first.
    /// Success moves the sale to `authorized`; failure refreshes the
    /// stored error text and keeps it pending.
    pub async fn retransmit_fiscal(
        &self,
        sale_id: &str,
        corrected_items: Option<Vec<SaleItem>>,
    ) -> Result<Authorization, FinalizeError> {
        let gateway = self.gateway.as_ref().ok_or_else(|| FinalizeError::FiscalState {
            detail: "no fiscal gateway configured".to_string(),
        })?;

        let (sale, stored_items) = self
            .store
            .load_sale(sale_id)
            .await
            .map_err(|source| FinalizeError::Persistence {
                step: "load_sale",
                source,
            })?
            .ok_or_else(|| FinalizeError::SaleNotFound(sale_id.to_string()))?;

        if !matches!(
            sale.fiscal_status,
            FiscalStatus::Pending | FiscalStatus::Rejected
        ) {
            return Err(FinalizeError::FiscalState {
                detail: format!(
                    "sale is {:?}; only pending or rejected sales can be retransmitted",
                    sale.fiscal_status
                ),
            });
        }

        let items = match corrected_items {
            Some(corrected) => {
                self.store
                    .replace_items(sale_id, &corrected)
                    .await
                    .map_err(|source| FinalizeError::Persistence {
                        step: "replace_items",
                        source,
                    })?;
                corrected
            }
            None => stored_items,
        };

        let document = NfceDocument::from_sale(&self.company(), &sale, &items, Utc::now())?;

        info!(sale_id = %sale_id, reference = %document.reference(), "Retransmitting NFC-e");

        match gateway.emit(&document).await {
            Ok(authorization) => {
                self.store
                    .set_fiscal_authorized(sale_id, &authorization)
                    .await
                    .map_err(|source| FinalizeError::Persistence {
                        step: "set_fiscal_authorized",
                        source,
                    })?;
                self.events.publish(CheckoutEvent::FiscalStatusChanged {
                    sale_id: sale_id.to_string(),
                    status: FiscalStatus::Authorized,
                });
                info!(sale_id = %sale_id, "NFC-e authorized on retransmit");
                Ok(authorization)
            }
            Err(e) => {
                // Refresh the stored error for the operator; the sale
                // stays pending.
                if let Err(store_err) =
                    self.store.set_fiscal_pending(sale_id, &e.to_string()).await
                {
                    warn!(sale_id = %sale_id, error = %store_err, "Could not update fiscal error");
                }
                Err(FinalizeError::Fiscal(e))
            }
        }
    }

    /// Cancels an authorized document within the authority window.
    pub async fn cancel_fiscal(
        &self,
        sale_id: &str,
        reason: &str,
    ) -> Result<(), FinalizeError> {
        let gateway = self.gateway.as_ref().ok_or_else(|| FinalizeError::FiscalState {
            detail: "no fiscal gateway configured".to_string(),
        })?;

        let (sale, _) = self
            .store
            .load_sale(sale_id)
            .await
            .map_err(|source| FinalizeError::Persistence {
                step: "load_sale",
                source,
            })?
            .ok_or_else(|| FinalizeError::SaleNotFound(sale_id.to_string()))?;

        let (Some(key), Some(protocol), Some(authorized_at)) = (
            sale.fiscal_key.as_deref(),
            sale.fiscal_protocol.as_deref(),
            sale.authorized_at,
        ) else {
            return Err(FinalizeError::FiscalState {
                detail: "sale has no fiscal authorization to cancel".to_string(),
            });
        };

        if sale.fiscal_status != FiscalStatus::Authorized {
            return Err(FinalizeError::FiscalState {
                detail: format!("sale is {:?}, not authorized", sale.fiscal_status),
            });
        }

        // The authority window is enforced on this side, before the
        // call goes out.
        self.cancel_policy.check(authorized_at, Utc::now())?;

        gateway.cancel(key, protocol, reason).await?;

        self.store
            .set_fiscal_cancelled(sale_id, reason)
            .await
            .map_err(|source| FinalizeError::Persistence {
                step: "set_fiscal_cancelled",
                source,
            })?;

        self.events.publish(CheckoutEvent::FiscalStatusChanged {
            sale_id: sale_id.to_string(),
            status: FiscalStatus::Cancelled,
        });
        info!(sale_id = %sale_id, "NFC-e cancelled");

        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn company(&self) -> CompanyRegistration {
        CompanyRegistration {
            cnpj: self.config.cnpj.clone(),
            ie: self.config.ie.clone(),
            corporate_name: self.config.corporate_name.clone(),
        }
    }

    /// Materializes the rows to persist from the validated session.
    fn build_rows(
        &self,
        session: &SaleSession,
        will_emit: bool,
    ) -> (Sale, Vec<SaleItem>, Vec<SaleItemOption>) {
        // validate() and number_reserved() ran before this is called.
        let breakdown = session
            .breakdown
            .as_ref()
            .copied()
            .unwrap_or_else(|| caixa_core::discount::TotalBreakdown {
                subtotal_cents: 0,
                global_cents: 0,
                term_cents: 0,
                value_tier_cents: 0,
                total_cents: 0,
                selected_value_tier: None,
            });
        let reservation = session.reservation.clone().unwrap_or(
            caixa_core::types::ReservationToken {
                company_id: self.config.company_id.clone(),
                model: self.config.document_model,
                series: self.config.series,
                number: 0,
            },
        );

        let now = Utc::now();
        let sale_id = Uuid::new_v4().to_string();

        let sale = Sale {
            id: sale_id.clone(),
            company_id: reservation.company_id,
            document_model: reservation.model,
            series: reservation.series,
            number: reservation.number,
            subtotal_cents: breakdown.subtotal_cents,
            global_discount_cents: breakdown.global_cents,
            term_discount_cents: breakdown.term_cents,
            value_tier_discount_cents: breakdown.value_tier_cents,
            total_cents: breakdown.total_cents,
            paid_cents: session.ledger.paid().cents(),
            change_cents: session.ledger.change().cents(),
            customer_id: session.customer.as_ref().map(|c| c.id.clone()),
            buyer_document: session.buyer_document.clone(),
            // A fiscal-requested sale starts pending: if the process
            // dies mid-flow the row already tells the retransmit path
            // the truth.
            fiscal_status: if will_emit {
                FiscalStatus::Pending
            } else {
                FiscalStatus::None
            },
            fiscal_error: None,
            fiscal_key: None,
            fiscal_protocol: None,
            authorized_at: None,
            created_at: now,
            completed_at: None,
        };

        let mut items = Vec::with_capacity(session.cart.items.len());
        let mut options = Vec::new();
        for cart_item in &session.cart.items {
            let item_id = Uuid::new_v4().to_string();
            for option in &cart_item.options {
                options.push(SaleItemOption {
                    id: Uuid::new_v4().to_string(),
                    sale_item_id: item_id.clone(),
                    name: option.name.clone(),
                    price_cents: option.price_cents,
                    quantity: option.quantity,
                });
            }
            items.push(SaleItem {
                id: item_id,
                sale_id: sale_id.clone(),
                product_id: cart_item.product_id.clone(),
                sku_snapshot: cart_item.sku.clone(),
                name_snapshot: cart_item.name.clone(),
                unit_price_cents: cart_item.unit_price_cents,
                original_price_cents: cart_item.computed_price_cents,
                quantity: cart_item.quantity,
                line_total_cents: cart_item.line_total_cents(),
                ncm: cart_item.ncm.clone(),
                cfop: cart_item.cfop.clone(),
                csosn: cart_item.csosn.clone(),
                unit: cart_item.unit.clone(),
                staff_id: cart_item.staff_id.clone(),
                note: cart_item.note.clone(),
                created_at: now,
            });
        }

        (sale, items, options)
    }

    /// The correctness gate: what landed must match what was sent.
    async fn verify_writes(
        &self,
        sale: &Sale,
        items: &[SaleItem],
        options: &[SaleItemOption],
        observation: &str,
    ) -> Result<(), FinalizeError> {
        let snapshot = self
            .probe
            .snapshot(&sale.id, sale.number, observation)
            .await
            .map_err(|e| FinalizeError::Verification {
                detail: format!("probe read failed: {e}"),
            })?;

        let expected_quantity: i64 = items.iter().map(|i| i.quantity).sum();

        if !snapshot.header_found {
            return Err(FinalizeError::Verification {
                detail: format!(
                    "sale header {} with number {} not found on read-back",
                    sale.id, sale.number
                ),
            });
        }
        if snapshot.total_cents != sale.total_cents {
            return Err(FinalizeError::Verification {
                detail: format!(
                    "stored total {} does not match submitted total {}",
                    snapshot.total_cents, sale.total_cents
                ),
            });
        }
        if snapshot.item_rows != items.len() as i64 {
            return Err(FinalizeError::Verification {
                detail: format!(
                    "expected {} item rows, found {}",
                    items.len(),
                    snapshot.item_rows
                ),
            });
        }
        if snapshot.quantity_sum != expected_quantity {
            return Err(FinalizeError::Verification {
                detail: format!(
                    "expected quantity sum {}, found {}",
                    expected_quantity, snapshot.quantity_sum
                ),
            });
        }
        if snapshot.option_rows != options.len() as i64 {
            return Err(FinalizeError::Verification {
                detail: format!(
                    "expected {} option rows, found {}",
                    options.len(),
                    snapshot.option_rows
                ),
            });
        }
        if snapshot.stock_rows != items.len() as i64 {
            return Err(FinalizeError::Verification {
                detail: format!(
                    "expected {} stock entries, found {}",
                    items.len(),
                    snapshot.stock_rows
                ),
            });
        }

        Ok(())
    }

    /// Runs the fiscal leg after `Verified`. Never fails the sale: a
    /// gateway error degrades the sale to pending and the flow keeps
    /// going.
    async fn run_fiscal_leg(
        &self,
        session: SaleSession,
        mut sale: Sale,
        items: &[SaleItem],
        will_emit: bool,
    ) -> Result<(SaleSession, Sale, FiscalResolution), FinalizeError> {
        let gateway = match (&self.gateway, will_emit) {
            (Some(gateway), true) => gateway,
            _ => {
                let session = session.fiscal_skipped().map_err(FinalizeError::Validation)?;
                return Ok((session, sale, FiscalResolution::Skipped));
            }
        };

        let session = session.fiscal_emitting().map_err(FinalizeError::Validation)?;

        let emission = match NfceDocument::from_sale(&self.company(), &sale, items, Utc::now()) {
            Ok(document) => gateway.emit(&document).await,
            // An unbuildable document is a fiscal-leg failure like any
            // other: the local sale stays committed.
            Err(e) => Err(e),
        };

        match emission {
            Ok(authorization) => {
                match self.store.set_fiscal_authorized(&sale.id, &authorization).await {
                    Ok(()) => {
                        sale.fiscal_status = FiscalStatus::Authorized;
                        sale.fiscal_key = Some(authorization.access_key.clone());
                        sale.fiscal_protocol = Some(authorization.protocol.clone());
                        sale.authorized_at = Some(authorization.authorized_at);
                        sale.fiscal_error = None;

                        self.events.publish(CheckoutEvent::FiscalStatusChanged {
                            sale_id: sale.id.clone(),
                            status: FiscalStatus::Authorized,
                        });

                        let session =
                            session.fiscal_confirmed().map_err(FinalizeError::Validation)?;
                        Ok((session, sale, FiscalResolution::Authorized(authorization)))
                    }
                    Err(store_err) => {
                        // Authorized at the authority but not recorded
                        // locally: keep the sale pending with the store
                        // error so the operator reconciles it.
                        error!(
                            sale_id = %sale.id,
                            error = %store_err,
                            "Authorized but could not record authorization"
                        );
                        let text = format!("authorization not recorded: {store_err}");
                        self.degrade_to_pending(&mut sale, &text).await;
                        let session = session
                            .fiscal_failed(text.clone())
                            .map_err(FinalizeError::Validation)?;
                        Ok((session, sale, FiscalResolution::Pending { error: text }))
                    }
                }
            }
            Err(e) => {
                let text = e.to_string();
                warn!(sale_id = %sale.id, error = %text, "Fiscal emission failed");
                self.degrade_to_pending(&mut sale, &text).await;
                let session = session
                    .fiscal_failed(text.clone())
                    .map_err(FinalizeError::Validation)?;
                Ok((session, sale, FiscalResolution::Pending { error: text }))
            }
        }
    }

    /// Best-effort downgrade to pending with the error text attached.
    async fn degrade_to_pending(&self, sale: &mut Sale, error_text: &str) {
        sale.fiscal_status = FiscalStatus::Pending;
        sale.fiscal_error = Some(error_text.to_string());

        if let Err(store_err) = self.store.set_fiscal_pending(&sale.id, error_text).await {
            // The in-memory outcome still carries the text; the row
            // was inserted as pending already, so status is right.
            warn!(sale_id = %sale.id, error = %store_err, "Could not attach fiscal error");
        }
        self.events.publish(CheckoutEvent::FiscalStatusChanged {
            sale_id: sale.id.clone(),
            status: FiscalStatus::Pending,
        });
    }

    /// Logs the abort transition; the error itself is the caller's
    /// terminal status.
    fn abort_session(session: SaleSession, err: &FinalizeError) {
        match session.abort(err.to_string()) {
            Ok(aborted) => {
                warn!(message = %err, "Finalize aborted");
                debug!(phase = aborted.phase.name(), "Session terminal phase");
            }
            Err(transition_err) => {
                // Abort is only requested from pre-Verified phases;
                // reaching this arm is a sequencing bug.
                error!(error = %transition_err, "Abort from non-abortable phase");
            }
        }
    }
}

/// "NFC-e 65/1-000042" style reference; doubles as the stock ledger
/// observation tag.
fn document_reference(sale: &Sale) -> String {
    format!(
        "NFC-e {}/{}-{:06}",
        sale.document_model, sale.series, sale.number
    )
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    use caixa_core::money::Money;
    use caixa_core::types::{PaymentClass, PaymentEntry, Product, ReservationToken};
    use caixa_db::{DbError, ProbeSnapshot};
    use caixa_fiscal::FiscalError;

    // -------------------------------------------------------------------------
    // Scripted store
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct MockInner {
        sales: HashMap<String, Sale>,
        items: Vec<SaleItem>,
        options: Vec<SaleItemOption>,
        payments: Vec<PaymentEntry>,
        stock: Vec<(String, i64, String)>,
        fail_insert_sale: bool,
        fail_insert_items: bool,
        fail_stock: bool,
        lie_on_probe: bool,
        yield_in_insert_sale: bool,
    }

    #[derive(Clone, Default)]
    struct MockStore {
        inner: Arc<Mutex<MockInner>>,
    }

    impl MockStore {
        fn with<R>(&self, f: impl FnOnce(&mut MockInner) -> R) -> R {
            f(&mut self.inner.lock().unwrap())
        }
    }

    impl CheckoutStore for MockStore {
        async fn reserve_next(
            &self,
            company_id: &str,
            model: i64,
            series: i64,
        ) -> Result<ReservationToken, DbError> {
            self.with(|inner| {
                let number = inner.sales.values().map(|s| s.number).max().unwrap_or(0) + 1;
                Ok(ReservationToken {
                    company_id: company_id.to_string(),
                    model,
                    series,
                    number,
                })
            })
        }

        async fn insert_sale(&self, sale: &Sale) -> Result<(), DbError> {
            let should_yield = self.with(|inner| inner.yield_in_insert_sale);
            if should_yield {
                tokio::task::yield_now().await;
            }
            self.with(|inner| {
                if inner.fail_insert_sale {
                    return Err(DbError::QueryFailed("injected insert_sale failure".into()));
                }
                inner.sales.insert(sale.id.clone(), sale.clone());
                Ok(())
            })
        }

        async fn insert_items(
            &self,
            items: &[SaleItem],
            options: &[SaleItemOption],
            _sale_id: &str,
            payments: &[PaymentEntry],
        ) -> Result<(), DbError> {
            self.with(|inner| {
                if inner.fail_insert_items {
                    return Err(DbError::QueryFailed("injected insert_items failure".into()));
                }
                inner.items.extend_from_slice(items);
                inner.options.extend_from_slice(options);
                inner.payments.extend_from_slice(payments);
                Ok(())
            })
        }

        async fn adjust_stock(
            &self,
            product_id: &str,
            quantity_delta: i64,
            observation: &str,
        ) -> Result<(), DbError> {
            self.with(|inner| {
                if inner.fail_stock {
                    return Err(DbError::QueryFailed("injected stock failure".into()));
                }
                inner.stock.push((
                    product_id.to_string(),
                    quantity_delta,
                    observation.to_string(),
                ));
                Ok(())
            })
        }

        async fn load_sale(
            &self,
            sale_id: &str,
        ) -> Result<Option<(Sale, Vec<SaleItem>)>, DbError> {
            self.with(|inner| {
                Ok(inner.sales.get(sale_id).cloned().map(|sale| {
                    let items = inner
                        .items
                        .iter()
                        .filter(|i| i.sale_id == sale_id)
                        .cloned()
                        .collect();
                    (sale, items)
                }))
            })
        }

        async fn replace_items(&self, sale_id: &str, items: &[SaleItem]) -> Result<(), DbError> {
            self.with(|inner| {
                inner.items.retain(|i| i.sale_id != sale_id);
                inner.items.extend_from_slice(items);
                Ok(())
            })
        }

        async fn set_fiscal_authorized(
            &self,
            sale_id: &str,
            authorization: &Authorization,
        ) -> Result<(), DbError> {
            self.with(|inner| {
                let sale = inner
                    .sales
                    .get_mut(sale_id)
                    .ok_or_else(|| DbError::not_found("Sale", sale_id))?;
                sale.fiscal_status = FiscalStatus::Authorized;
                sale.fiscal_key = Some(authorization.access_key.clone());
                sale.fiscal_protocol = Some(authorization.protocol.clone());
                sale.authorized_at = Some(authorization.authorized_at);
                sale.fiscal_error = None;
                Ok(())
            })
        }

        async fn set_fiscal_pending(&self, sale_id: &str, error: &str) -> Result<(), DbError> {
            self.with(|inner| {
                let sale = inner
                    .sales
                    .get_mut(sale_id)
                    .ok_or_else(|| DbError::not_found("Sale", sale_id))?;
                sale.fiscal_status = FiscalStatus::Pending;
                sale.fiscal_error = Some(error.to_string());
                Ok(())
            })
        }

        async fn set_fiscal_cancelled(&self, sale_id: &str, reason: &str) -> Result<(), DbError> {
            self.with(|inner| {
                let sale = inner
                    .sales
                    .get_mut(sale_id)
                    .ok_or_else(|| DbError::not_found("Sale", sale_id))?;
                sale.fiscal_status = FiscalStatus::Cancelled;
                sale.fiscal_error = Some(reason.to_string());
                Ok(())
            })
        }

        async fn set_completed_at(
            &self,
            sale_id: &str,
            completed_at: chrono::DateTime<Utc>,
        ) -> Result<(), DbError> {
            self.with(|inner| {
                let sale = inner
                    .sales
                    .get_mut(sale_id)
                    .ok_or_else(|| DbError::not_found("Sale", sale_id))?;
                sale.completed_at = Some(completed_at);
                Ok(())
            })
        }
    }

    impl SaleProbe for MockStore {
        async fn snapshot(
            &self,
            sale_id: &str,
            number: i64,
            observation: &str,
        ) -> Result<ProbeSnapshot, DbError> {
            self.with(|inner| {
                let header = inner
                    .sales
                    .get(sale_id)
                    .filter(|s| s.number == number);
                let item_rows = inner.items.iter().filter(|i| i.sale_id == sale_id).count() as i64;
                let quantity_sum: i64 = inner
                    .items
                    .iter()
                    .filter(|i| i.sale_id == sale_id)
                    .map(|i| i.quantity)
                    .sum();
                let option_rows = inner
                    .options
                    .iter()
                    .filter(|o| inner.items.iter().any(|i| i.id == o.sale_item_id))
                    .count() as i64;
                let stock_rows = inner
                    .stock
                    .iter()
                    .filter(|(_, _, obs)| obs == observation)
                    .count() as i64;

                let lie = inner.lie_on_probe;
                Ok(ProbeSnapshot {
                    header_found: header.is_some(),
                    total_cents: header.map(|s| s.total_cents).unwrap_or(0),
                    item_rows: if lie { item_rows + 1 } else { item_rows },
                    quantity_sum,
                    option_rows,
                    stock_rows,
                })
            })
        }
    }

    // -------------------------------------------------------------------------
    // Scripted gateway
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct GatewayInner {
        script: VecDeque<Result<Authorization, FiscalError>>,
        cancels: Vec<(String, String, String)>,
    }

    #[derive(Clone, Default)]
    struct MockGateway {
        inner: Arc<Mutex<GatewayInner>>,
    }

    impl MockGateway {
        fn scripted(responses: Vec<Result<Authorization, FiscalError>>) -> Self {
            MockGateway {
                inner: Arc::new(Mutex::new(GatewayInner {
                    script: responses.into(),
                    cancels: Vec::new(),
                })),
            }
        }

        fn authorizing() -> Self {
            Self::scripted(vec![Ok(authorization())])
        }

        fn cancel_count(&self) -> usize {
            self.inner.lock().unwrap().cancels.len()
        }
    }

    impl FiscalGateway for MockGateway {
        async fn emit(&self, _document: &NfceDocument) -> Result<Authorization, FiscalError> {
            self.inner
                .lock()
                .unwrap()
                .script
                .pop_front()
                .unwrap_or_else(|| Err(FiscalError::Transport("no scripted response".into())))
        }

        async fn cancel(
            &self,
            access_key: &str,
            protocol: &str,
            reason: &str,
        ) -> Result<(), FiscalError> {
            self.inner.lock().unwrap().cancels.push((
                access_key.to_string(),
                protocol.to_string(),
                reason.to_string(),
            ));
            Ok(())
        }
    }

    // -------------------------------------------------------------------------
    // Fixtures
    // -------------------------------------------------------------------------

    fn authorization() -> Authorization {
        Authorization {
            access_key: "3526ABC0000042".to_string(),
            protocol: "135260000042".to_string(),
            authorized_at: Utc::now(),
        }
    }

    fn product(id: &str, price_cents: i64) -> Product {
        Product {
            id: id.to_string(),
            sku: format!("SKU-{id}"),
            barcode: None,
            name: format!("Produto {id}"),
            price_cents,
            promotion: None,
            quantity_discount: None,
            ncm: "22021000".to_string(),
            cfop: "5102".to_string(),
            csosn: "102".to_string(),
            unit: "UN".to_string(),
            track_stock: true,
            allow_negative_stock: false,
            current_stock: Some(100),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn config(emit_fiscal: bool) -> CheckoutConfig {
        CheckoutConfig {
            emit_fiscal_default: emit_fiscal,
            ..CheckoutConfig::default()
        }
    }

    /// Cart with 2 × R$ 50,00 => subtotal R$ 100,00.
    fn hundred_real_cart() -> CartHandle {
        let handle = CartHandle::new();
        handle
            .with_cart_mut(|c| c.add_item(&product("p1", 5000), 2))
            .unwrap();
        handle
    }

    fn cash_request(total_due: i64, tendered: i64) -> FinalizeRequest {
        let mut ledger = PaymentLedger::new(Money::from_cents(total_due));
        ledger
            .add_entry("dinheiro", PaymentClass::Cash, Some(Money::from_cents(tendered)))
            .unwrap();
        FinalizeRequest {
            customer: None,
            global_discount: None,
            term_tier: None,
            ledger,
            emit_fiscal: None,
            buyer_document: None,
        }
    }

    fn finalizer(
        cfg: CheckoutConfig,
        store: MockStore,
        gateway: Option<MockGateway>,
    ) -> SaleFinalizer<MockStore, MockStore, MockGateway> {
        SaleFinalizer::new(cfg, store.clone(), store, gateway)
    }

    // -------------------------------------------------------------------------
    // Finalize
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_happy_path_without_fiscal() {
        let store = MockStore::default();
        let f = finalizer(config(false), store.clone(), None);
        let cart = hundred_real_cart();
        let mut events = f.events().subscribe();

        let completed = f.finalize(&cart, cash_request(10_000, 10_000)).await.unwrap();

        assert!(matches!(completed.fiscal, FiscalResolution::Skipped));
        assert_eq!(completed.sale.total_cents, 10_000);
        assert_eq!(completed.sale.number, 1);
        assert!(completed.sale.total_reproducible());
        assert!(completed.sale.completed_at.is_some());

        // Persisted rows and stock movement.
        store.with(|inner| {
            assert_eq!(inner.sales.len(), 1);
            assert_eq!(inner.items.len(), 1);
            assert_eq!(inner.payments.len(), 1);
            assert_eq!(inner.stock.len(), 1);
            assert_eq!(inner.stock[0].1, -2);
            assert_eq!(inner.stock[0].2, "NFC-e 65/1-000001");
        });

        // Cart cleared on completion.
        assert!(cart.with_cart(|c| c.is_empty()));

        // Event published.
        match events.recv().await.unwrap() {
            CheckoutEvent::SaleFinalized { number, total_cents, .. } => {
                assert_eq!(number, 1);
                assert_eq!(total_cents, 10_000);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_fixed_discount_and_change() {
        // Subtotal 100.00, global discount 10.00 fixed, single cash
        // payment of 100.00 => total 90.00, change 10.00.
        let store = MockStore::default();
        let f = finalizer(config(false), store.clone(), None);
        let cart = hundred_real_cart();

        let mut request = cash_request(9000, 10_000);
        request.global_discount = Some(DiscountValue::Fixed(1000));

        let completed = f.finalize(&cart, request).await.unwrap();

        assert_eq!(completed.sale.subtotal_cents, 10_000);
        assert_eq!(completed.sale.global_discount_cents, 1000);
        assert_eq!(completed.sale.total_cents, 9000);
        assert_eq!(completed.sale.change_cents, 1000);
        assert_eq!(completed.receipt.total_cents, 9000);
        assert_eq!(completed.receipt.change_cents, 1000);
    }

    #[tokio::test]
    async fn test_fiscal_success_stamps_sale() {
        let store = MockStore::default();
        let gateway = MockGateway::authorizing();
        let f = finalizer(config(true), store.clone(), Some(gateway));
        let cart = hundred_real_cart();

        let completed = f.finalize(&cart, cash_request(10_000, 10_000)).await.unwrap();

        let FiscalResolution::Authorized(auth) = &completed.fiscal else {
            panic!("expected authorized, got {:?}", completed.fiscal);
        };
        assert_eq!(auth.protocol, "135260000042");
        assert_eq!(completed.sale.fiscal_status, FiscalStatus::Authorized);
        assert!(completed.receipt.fiscal.is_some());

        store.with(|inner| {
            let sale = inner.sales.values().next().unwrap();
            assert_eq!(sale.fiscal_status, FiscalStatus::Authorized);
            assert_eq!(sale.fiscal_key.as_deref(), Some("3526ABC0000042"));
        });
    }

    #[tokio::test]
    async fn test_fiscal_failure_still_completes() {
        // A gateway rejection must still complete the sale: fiscal
        // status pending, error retrievable, cart cleared.
        let store = MockStore::default();
        let gateway = MockGateway::scripted(vec![Err(FiscalError::Rejected {
            message: "rejeição 539".to_string(),
        })]);
        let f = finalizer(config(true), store.clone(), Some(gateway));
        let cart = hundred_real_cart();

        let completed = f.finalize(&cart, cash_request(10_000, 10_000)).await.unwrap();

        let FiscalResolution::Pending { error } = &completed.fiscal else {
            panic!("expected pending, got {:?}", completed.fiscal);
        };
        assert!(error.contains("rejeição 539"));
        assert!(completed.message.contains("pending"));

        store.with(|inner| {
            let sale = inner.sales.values().next().unwrap();
            assert_eq!(sale.fiscal_status, FiscalStatus::Pending);
            assert!(sale.fiscal_error.as_deref().unwrap().contains("rejeição 539"));
        });

        // Local commit wins: the cart is cleared as if everything
        // succeeded.
        assert!(cart.with_cart(|c| c.is_empty()));
    }

    #[tokio::test]
    async fn test_validation_failure_has_no_side_effect() {
        let store = MockStore::default();
        let f = finalizer(config(false), store.clone(), None);
        let cart = hundred_real_cart();

        // Ledger covers only part of the total.
        let mut ledger = PaymentLedger::new(Money::from_cents(10_000));
        ledger
            .add_entry("pix", PaymentClass::Electronic, Some(Money::from_cents(4000)))
            .unwrap();
        let request = FinalizeRequest {
            customer: None,
            global_discount: None,
            term_tier: None,
            ledger,
            emit_fiscal: None,
            buyer_document: None,
        };

        let err = f.finalize(&cart, request).await.unwrap_err();
        assert!(matches!(err, FinalizeError::Validation(_)));

        store.with(|inner| {
            assert!(inner.sales.is_empty());
            assert!(inner.items.is_empty());
            assert!(inner.stock.is_empty());
        });
        assert!(!cart.with_cart(|c| c.is_empty()));
    }

    #[tokio::test]
    async fn test_invalid_global_discount_rejected_before_any_layer() {
        let store = MockStore::default();
        let f = finalizer(config(false), store.clone(), None);
        let cart = hundred_real_cart();

        // Fixed discount equal to the subtotal is invalid.
        let mut request = cash_request(10_000, 10_000);
        request.global_discount = Some(DiscountValue::Fixed(10_000));

        let err = f.finalize(&cart, request).await.unwrap_err();
        assert!(matches!(err, FinalizeError::Validation(_)));
        store.with(|inner| assert!(inner.sales.is_empty()));
    }

    #[tokio::test]
    async fn test_persistence_failure_aborts_and_retry_re_reserves() {
        let store = MockStore::default();
        let f = finalizer(config(false), store.clone(), None);
        let cart = hundred_real_cart();

        // First attempt dies between the header and the items.
        store.with(|inner| inner.fail_insert_items = true);
        let err = f.finalize(&cart, cash_request(10_000, 10_000)).await.unwrap_err();
        assert!(matches!(
            err,
            FinalizeError::Persistence {
                step: "insert_items",
                ..
            }
        ));
        // The cart survives for the retry.
        assert!(!cart.with_cart(|c| c.is_empty()));

        // Retry from scratch takes a fresh reservation (the failed
        // attempt's header row already owns number 1).
        store.with(|inner| inner.fail_insert_items = false);
        let completed = f.finalize(&cart, cash_request(10_000, 10_000)).await.unwrap();
        assert_eq!(completed.sale.number, 2);
    }

    #[tokio::test]
    async fn test_stock_failure_aborts_but_leaves_durable_rows() {
        let store = MockStore::default();
        let f = finalizer(config(false), store.clone(), None);
        let cart = hundred_real_cart();

        store.with(|inner| inner.fail_stock = true);
        let err = f.finalize(&cart, cash_request(10_000, 10_000)).await.unwrap_err();
        assert!(matches!(err, FinalizeError::StockAdjustment { .. }));

        // The sale/item rows are still there, the stock ledger is
        // untouched. An orphan for manual inspection.
        store.with(|inner| {
            assert_eq!(inner.sales.len(), 1);
            assert_eq!(inner.items.len(), 1);
            assert!(inner.stock.is_empty());
        });
        assert!(!cart.with_cart(|c| c.is_empty()));
    }

    #[tokio::test]
    async fn test_verification_mismatch_aborts() {
        let store = MockStore::default();
        let f = finalizer(config(false), store.clone(), None);
        let cart = hundred_real_cart();

        store.with(|inner| inner.lie_on_probe = true);
        let err = f.finalize(&cart, cash_request(10_000, 10_000)).await.unwrap_err();

        match err {
            FinalizeError::Verification { detail } => {
                assert!(detail.contains("item rows"), "unexpected detail: {detail}");
            }
            other => panic!("expected verification error, got {other:?}"),
        }
        assert!(!cart.with_cart(|c| c.is_empty()));
    }

    #[tokio::test]
    async fn test_second_finalize_rejected_while_busy() {
        let store = MockStore::default();
        store.with(|inner| inner.yield_in_insert_sale = true);
        let f = finalizer(config(false), store.clone(), None);
        let cart = hundred_real_cart();

        let first = f.finalize(&cart, cash_request(10_000, 10_000));
        let second = f.finalize(&cart, cash_request(10_000, 10_000));
        let (first, second) = tokio::join!(first, second);

        // Exactly one of them ran; the other was rejected immediately.
        let busy_count = [&first, &second]
            .iter()
            .filter(|r| matches!(r, Err(FinalizeError::Busy)))
            .count();
        assert_eq!(busy_count, 1);
        assert!(first.is_ok() || second.is_ok());

        // The flag is released afterwards: a third attempt is not busy
        // (it fails validation because the cart is now empty).
        let err = f.finalize(&cart, cash_request(10_000, 10_000)).await.unwrap_err();
        assert!(matches!(err, FinalizeError::Validation(_)));
    }

    #[tokio::test]
    async fn test_required_staff_blocks_finalize() {
        let store = MockStore::default();
        let mut cfg = config(false);
        cfg.require_staff_on_items = true;
        let f = finalizer(cfg, store.clone(), None);
        let cart = hundred_real_cart();

        assert_eq!(f.pending_inputs(&cart).len(), 1);
        let err = f.finalize(&cart, cash_request(10_000, 10_000)).await.unwrap_err();
        assert!(err.to_string().contains("staff"));

        // Resolving the pending input unblocks the flow.
        cart.with_cart_mut(|c| c.assign_staff("p1", Some("staff-7".to_string())))
            .unwrap();
        assert!(f.pending_inputs(&cart).is_empty());
        f.finalize(&cart, cash_request(10_000, 10_000)).await.unwrap();
    }

    // -------------------------------------------------------------------------
    // Retransmit / cancel
    // -------------------------------------------------------------------------

    /// Finalizes one sale whose fiscal emission fails, returning its id.
    async fn pending_sale_id(f: &SaleFinalizer<MockStore, MockStore, MockGateway>) -> String {
        let cart = hundred_real_cart();
        let completed = f.finalize(&cart, cash_request(10_000, 10_000)).await.unwrap();
        assert!(matches!(completed.fiscal, FiscalResolution::Pending { .. }));
        completed.sale.id
    }

    #[tokio::test]
    async fn test_retransmit_reuses_number_and_authorizes() {
        let store = MockStore::default();
        let gateway = MockGateway::scripted(vec![
            Err(FiscalError::Rejected {
                message: "rejeição 539".to_string(),
            }),
            Ok(authorization()),
        ]);
        let f = finalizer(config(true), store.clone(), Some(gateway));

        let sale_id = pending_sale_id(&f).await;
        let number_before = store.with(|inner| inner.sales[&sale_id].number);

        let auth = f.retransmit_fiscal(&sale_id, None).await.unwrap();
        assert_eq!(auth.protocol, "135260000042");

        store.with(|inner| {
            let sale = &inner.sales[&sale_id];
            assert_eq!(sale.fiscal_status, FiscalStatus::Authorized);
            // Same reserved number, never re-reserved.
            assert_eq!(sale.number, number_before);
        });
    }

    #[tokio::test]
    async fn test_retransmit_with_corrected_items() {
        let store = MockStore::default();
        let gateway = MockGateway::scripted(vec![
            Err(FiscalError::Transport("timeout".to_string())),
            Ok(authorization()),
        ]);
        let f = finalizer(config(true), store.clone(), Some(gateway));

        let sale_id = pending_sale_id(&f).await;
        let mut corrected = store.with(|inner| {
            inner
                .items
                .iter()
                .find(|i| i.sale_id == sale_id)
                .cloned()
                .unwrap()
        });
        corrected.ncm = "22021001".to_string();

        f.retransmit_fiscal(&sale_id, Some(vec![corrected])).await.unwrap();

        store.with(|inner| {
            let item = inner.items.iter().find(|i| i.sale_id == sale_id).unwrap();
            assert_eq!(item.ncm, "22021001");
        });
    }

    #[tokio::test]
    async fn test_retransmit_failure_refreshes_error() {
        let store = MockStore::default();
        let gateway = MockGateway::scripted(vec![
            Err(FiscalError::Rejected {
                message: "rejeição 539".to_string(),
            }),
            Err(FiscalError::Rejected {
                message: "rejeição 204".to_string(),
            }),
        ]);
        let f = finalizer(config(true), store.clone(), Some(gateway));

        let sale_id = pending_sale_id(&f).await;
        let err = f.retransmit_fiscal(&sale_id, None).await.unwrap_err();
        assert!(matches!(err, FinalizeError::Fiscal(_)));

        store.with(|inner| {
            let sale = &inner.sales[&sale_id];
            assert_eq!(sale.fiscal_status, FiscalStatus::Pending);
            assert!(sale.fiscal_error.as_deref().unwrap().contains("204"));
        });
    }

    #[tokio::test]
    async fn test_retransmit_rejected_for_authorized_sale() {
        let store = MockStore::default();
        let gateway = MockGateway::authorizing();
        let f = finalizer(config(true), store.clone(), Some(gateway));

        let cart = hundred_real_cart();
        let completed = f.finalize(&cart, cash_request(10_000, 10_000)).await.unwrap();

        let err = f.retransmit_fiscal(&completed.sale.id, None).await.unwrap_err();
        assert!(matches!(err, FinalizeError::FiscalState { .. }));
    }

    #[tokio::test]
    async fn test_cancel_within_window() {
        let store = MockStore::default();
        let gateway = MockGateway::authorizing();
        let f = finalizer(config(true), store.clone(), Some(gateway.clone()));

        let cart = hundred_real_cart();
        let completed = f.finalize(&cart, cash_request(10_000, 10_000)).await.unwrap();

        f.cancel_fiscal(&completed.sale.id, "operator mistake").await.unwrap();

        assert_eq!(gateway.cancel_count(), 1);
        store.with(|inner| {
            assert_eq!(
                inner.sales[&completed.sale.id].fiscal_status,
                FiscalStatus::Cancelled
            );
        });
    }

    #[tokio::test]
    async fn test_cancel_outside_window_rejected() {
        let store = MockStore::default();
        let gateway = MockGateway::authorizing();
        let f = finalizer(config(true), store.clone(), Some(gateway.clone()));

        let cart = hundred_real_cart();
        let completed = f.finalize(&cart, cash_request(10_000, 10_000)).await.unwrap();

        // Age the authorization past the 30-minute window.
        store.with(|inner| {
            let sale = inner.sales.get_mut(&completed.sale.id).unwrap();
            sale.authorized_at = Some(Utc::now() - chrono::Duration::minutes(31));
        });

        let err = f
            .cancel_fiscal(&completed.sale.id, "too late")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FinalizeError::Fiscal(FiscalError::WindowExpired { .. })
        ));
        assert_eq!(gateway.cancel_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_requires_authorization() {
        let store = MockStore::default();
        let gateway = MockGateway::scripted(vec![Err(FiscalError::Transport(
            "offline".to_string(),
        ))]);
        let f = finalizer(config(true), store.clone(), Some(gateway));

        let sale_id = pending_sale_id(&f).await;
        let err = f.cancel_fiscal(&sale_id, "nope").await.unwrap_err();
        assert!(matches!(err, FinalizeError::FiscalState { .. }));
    }
}

