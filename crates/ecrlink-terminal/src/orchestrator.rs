//! # Transaction Orchestrator
//!
//! Sequences session, commands, and event waits into complete business
//! flows.
//!
//! ## Flow Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Orchestrated Flow Skeleton                           │
//! │                                                                         │
//! │   acquire single-flight guard (one flow per terminal at a time)        │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   open_pos ──► flow steps (unlock / command / event waits)             │
//! │        │                │                                               │
//! │        │          success or error - EITHER WAY:                       │
//! │        │                ▼                                               │
//! │        │        lock_device   (best-effort, errors swallowed)          │
//! │        │        close_pos     (best-effort, errors swallowed)          │
//! │        │                │                                               │
//! │        ▼                ▼                                               │
//! │   result / original error re-raised to the caller                      │
//! │                                                                         │
//! │  The physical device must never be left unlocked and the session       │
//! │  never left open, including on the declined and failure paths.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Why a Single-Flight Guard
//! The event queue carries no correlation IDs. Two in-flight commands of the
//! same kind would make event attribution ambiguous, so a second flow must
//! not start while another one's wait is outstanding. The guard is the
//! poller mutex itself: every flow holds the poller for its whole duration.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ecrlink_core::types::{PosOperation, PrintResult, RefundReference, TransactionResult};

use crate::config::TerminalConfig;
use crate::dispatcher::CommandDispatcher;
use crate::error::LinkResult;
use crate::poller::EventPoller;
use crate::session::Session;
use crate::transport::{HttpTransport, TerminalTransport};

// =============================================================================
// Flow Requests
// =============================================================================

/// Parameters of a purchase flow.
#[derive(Debug, Clone)]
pub struct PurchaseRequest {
    /// Decimal amount; converted to minor units at the dispatch boundary.
    pub amount: Decimal,

    /// ECR document number for the new document.
    pub document_nr: String,

    /// Last four digits of the PAN, as keyed on the ECR.
    pub pan_l4: String,

    /// Currency override; the configured code applies when `None`.
    pub currency: Option<String>,
}

/// Parameters of a refund flow.
#[derive(Debug, Clone)]
pub struct RefundRequest {
    /// STAN/RRN of the original authorization being refunded.
    pub reference: RefundReference,

    /// Decimal amount; converted to minor units at the dispatch boundary.
    pub amount: Decimal,

    /// ECR document number for the refund document.
    pub document_nr: String,

    /// Last four digits of the PAN.
    pub pan_l4: String,

    /// Currency override; the configured code applies when `None`.
    pub currency: Option<String>,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives complete terminal flows: purchase, refund, manual void, and
/// end-of-day closure.
pub struct TransactionOrchestrator {
    config: Arc<TerminalConfig>,
    session: Session,
    dispatcher: CommandDispatcher,
    poller: Mutex<EventPoller>,
}

impl TransactionOrchestrator {
    /// Builds an orchestrator with the production HTTP transport.
    pub fn connect(config: TerminalConfig) -> LinkResult<Self> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Builds an orchestrator over an externally supplied transport.
    pub fn with_transport(config: TerminalConfig, transport: Arc<dyn TerminalTransport>) -> Self {
        let config = Arc::new(config);
        TransactionOrchestrator {
            session: Session::new(transport.clone()),
            dispatcher: CommandDispatcher::new(transport.clone(), config.clone()),
            poller: Mutex::new(EventPoller::new(transport, config.clone())),
            config,
        }
    }

    /// The session manager, for integrations that need direct access
    /// (e.g. the software-version announcement check).
    pub fn session(&self) -> &Session {
        &self.session
    }

    // =========================================================================
    // Flows
    // =========================================================================

    /// Runs a complete purchase:
    /// open → unlock(AUTHORIZE) → await card → authorize → await status →
    /// close document → lock → close.
    ///
    /// A `Declined` outcome returns through `Ok`; the document is closed for
    /// declined authorizations too, so the terminal's document state never
    /// diverges from the ECR's.
    pub async fn purchase(&self, request: &PurchaseRequest) -> LinkResult<TransactionResult> {
        let mut poller = self.poller.lock().await;
        info!(document_nr = %request.document_nr, "Starting purchase flow");

        self.session.open_pos(&self.config.credentials).await?;
        let result = self.run_purchase(request, &mut poller).await;
        self.cleanup().await;
        result
    }

    async fn run_purchase(
        &self,
        request: &PurchaseRequest,
        poller: &mut EventPoller,
    ) -> LinkResult<TransactionResult> {
        self.dispatcher
            .unlock_device(
                request.amount,
                PosOperation::Authorize,
                request.currency.as_deref(),
            )
            .await?;
        poller.wait_for_card().await?;

        let ack = self
            .dispatcher
            .authorize(
                request.amount,
                &request.document_nr,
                &request.pan_l4,
                request.currency.as_deref(),
            )
            .await?;
        // Informational only; the event below is authoritative
        debug!(immediate_ok = ack.is_ok(), "AUTHORIZE accepted for processing");

        let result = poller.wait_for_transaction_status().await?;
        self.close_doc_if_assigned(&result, &request.document_nr, poller)
            .await?;
        Ok(result)
    }

    /// Runs a refund:
    /// open → unlock(CREDIT) → await card → credit → await status →
    /// close document → lock → close.
    pub async fn refund(&self, request: &RefundRequest) -> LinkResult<TransactionResult> {
        let mut poller = self.poller.lock().await;
        info!(document_nr = %request.document_nr, rrn = %request.reference.rrn, "Starting refund flow");

        self.session.open_pos(&self.config.credentials).await?;
        let result = self.run_refund(request, &mut poller).await;
        self.cleanup().await;
        result
    }

    async fn run_refund(
        &self,
        request: &RefundRequest,
        poller: &mut EventPoller,
    ) -> LinkResult<TransactionResult> {
        self.dispatcher
            .unlock_device(
                request.amount,
                PosOperation::Credit,
                request.currency.as_deref(),
            )
            .await?;
        poller.wait_for_card().await?;

        self.dispatcher
            .refund(
                &request.reference,
                request.amount,
                &request.document_nr,
                &request.pan_l4,
                request.currency.as_deref(),
            )
            .await?;

        let result = poller.wait_for_transaction_status().await?;
        self.close_doc_if_assigned(&result, &request.document_nr, poller)
            .await?;
        Ok(result)
    }

    /// Runs a manual void of a prior operation:
    /// open → unlock(NOOPERATION) → void → await status → lock → close.
    ///
    /// No card read and no document close; the void folds into the original
    /// document.
    pub async fn void(&self, operation_id: &str, amount: Decimal) -> LinkResult<TransactionResult> {
        let mut poller = self.poller.lock().await;
        info!(operation_id, "Starting manual void flow");

        self.session.open_pos(&self.config.credentials).await?;
        let result = self.run_void(operation_id, amount, &mut poller).await;
        self.cleanup().await;
        result
    }

    async fn run_void(
        &self,
        operation_id: &str,
        amount: Decimal,
        poller: &mut EventPoller,
    ) -> LinkResult<TransactionResult> {
        self.dispatcher
            .unlock_device(amount, PosOperation::NoOperation, None)
            .await?;
        self.dispatcher.void_transaction(operation_id).await?;
        poller.wait_for_void_status().await
    }

    /// Runs the end-of-day closure:
    /// open → close day → await receipt (answering prompts) → lock → close.
    ///
    /// The wait is bounded by the configured wall-clock deadline and by the
    /// caller's cancellation token, checked once per poll.
    pub async fn close_day(&self, cancel: &CancellationToken) -> LinkResult<PrintResult> {
        let mut poller = self.poller.lock().await;
        info!("Starting end-of-day flow");

        self.session.open_pos(&self.config.credentials).await?;
        let result = self.run_close_day(cancel, &mut poller).await;
        self.cleanup().await;
        result
    }

    async fn run_close_day(
        &self,
        cancel: &CancellationToken,
        poller: &mut EventPoller,
    ) -> LinkResult<PrintResult> {
        self.dispatcher.close_day().await?;
        poller.wait_for_day_close_receipt(cancel).await
    }

    // =========================================================================
    // Shared Steps
    // =========================================================================

    /// Closes the document named by a status event, when the terminal
    /// assigned one. Runs for declined outcomes too.
    async fn close_doc_if_assigned(
        &self,
        result: &TransactionResult,
        document_nr: &str,
        poller: &mut EventPoller,
    ) -> LinkResult<()> {
        match result.operation_id.as_deref() {
            Some(operation_id) => {
                self.dispatcher
                    .close_doc(operation_id, document_nr, poller)
                    .await
            }
            None => {
                warn!(document_nr, "Status event carried no operationId, skipping document close");
                Ok(())
            }
        }
    }

    /// Best-effort teardown, run after every flow regardless of outcome.
    ///
    /// Errors are logged and swallowed; the original flow error (if any) is
    /// the one the caller sees.
    async fn cleanup(&self) {
        if let Err(e) = self.dispatcher.lock_device().await {
            warn!(?e, "lock_device failed during cleanup, ignoring");
        }
        self.session.close_pos().await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
