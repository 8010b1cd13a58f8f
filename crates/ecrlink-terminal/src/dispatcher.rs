//! # Command Dispatcher
//!
//! One method per terminal command. Builds the `executeposcmd` envelope,
//! sends it, and hands back whatever acknowledgment the terminal offers.
//!
//! ## The Boundary Rule for Amounts
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   Caller world          │  DISPATCHER  │         Wire world             │
//! │                         │              │                                │
//! │   Decimal 9.99  ────────┼─► from_decimal ─►  999  (integer minor units) │
//! │                         │   (half-up,  │                                │
//! │   Decimal 61.00 ────────┼─►  exactly   ─►  6100                         │
//! │                         │    once)     │                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! No other module converts amounts. The currency code defaults from
//! configuration unless a call overrides it.
//!
//! ## CLOSEDOC Is Different
//! The terminal may acknowledge a document close either synchronously (the
//! HTTP body carries `resultCode: OK`) or asynchronously (a later
//! ONTRNSTATUS event). The dispatcher therefore retries: attempt the
//! command, watch the event queue for a short confirmation window, and
//! repeat with backoff up to a fixed attempt cap before surfacing
//! [`LinkError::DocCloseFailed`]. An explicit bounded loop, not recursion,
//! so the failure mode stays observable.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use ecrlink_core::money::Money;
use ecrlink_core::types::{EventKind, MsgBoxKey, PosCommand, PosOperation, RefundReference};
use ecrlink_core::validation::{validate_document_nr, validate_operation_id, validate_pan_l4};

use crate::config::TerminalConfig;
use crate::error::{LinkError, LinkResult};
use crate::poller::EventPoller;
use crate::protocol::{
    command_request, AuthorizeParams, CloseDayParams, CloseDocParams, CommandAck, CreditParams,
    LockDeviceParams, QueueMessage, ResultEnvelope, SetMsgBoxKeyParams, UnlockDeviceParams,
    VoidParams,
};
use crate::transport::{RawResponse, TerminalTransport};

/// Initial pause between CLOSEDOC attempts.
const CLOSE_DOC_INITIAL_BACKOFF: Duration = Duration::from_millis(400);

/// Upper bound on the pause between CLOSEDOC attempts.
const CLOSE_DOC_MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Builds and sends one-shot terminal commands.
pub struct CommandDispatcher {
    transport: Arc<dyn TerminalTransport>,
    config: Arc<TerminalConfig>,
}

impl CommandDispatcher {
    /// Creates a dispatcher over a transport.
    pub fn new(transport: Arc<dyn TerminalTransport>, config: Arc<TerminalConfig>) -> Self {
        CommandDispatcher { transport, config }
    }

    /// Sends one command and returns the raw acknowledgment.
    async fn execute<P: Serialize>(
        &self,
        command: PosCommand,
        params: &P,
    ) -> LinkResult<RawResponse> {
        let body = command_request(command, params)?;
        debug!(%command, "Dispatching command");
        let response = self.transport.post_json("executeposcmd", Some(&body)).await?;

        if !response.is_success() {
            return Err(LinkError::Http {
                status: response.status,
                body: response.body,
            });
        }
        Ok(response)
    }

    fn currency_or_default(&self, currency: Option<&str>) -> String {
        currency
            .map(str::to_string)
            .unwrap_or_else(|| self.config.device.currency_code.clone())
    }

    // =========================================================================
    // Device Lock / Unlock
    // =========================================================================

    /// Unlocks the device ahead of an operation, declaring the intent so the
    /// terminal primes the right card-read flow. Fire-and-forget; the card
    /// read itself is observed through the event poller.
    pub async fn unlock_device(
        &self,
        amount: Decimal,
        intent: PosOperation,
        currency: Option<&str>,
    ) -> LinkResult<()> {
        let amount = Money::from_decimal(amount)?;
        let device = &self.config.device;
        let operator = &self.config.operator;

        let params = UnlockDeviceParams {
            pos_operation: intent.to_string(),
            amount,
            cash_back_amount: Money::zero(),
            currency_code: self.currency_or_default(currency),
            idle_text: device.idle_text.clone(),
            language: device.language.clone(),
            ecr_version: device.ecr_version.clone(),
            operator_id: operator.id.clone(),
            operator_name: operator.name.clone(),
            silent_card_read: device.silent_card_read,
        };

        info!(%intent, %amount, "Unlocking device");
        self.execute(PosCommand::UnlockDevice, &params).await?;
        Ok(())
    }

    /// Returns the device to its locked idle state. Fire-and-forget; the
    /// device may already be locked and that is fine.
    pub async fn lock_device(&self) -> LinkResult<()> {
        let params = LockDeviceParams {
            idle_text: self.config.device.lock_idle_text.clone(),
        };
        self.execute(PosCommand::LockDevice, &params).await?;
        Ok(())
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Authorizes a purchase amount.
    ///
    /// The returned acknowledgment is informational only. The terminal
    /// answers "accepted for processing"; the authoritative outcome is the
    /// ONTRNSTATUS event a subsequent
    /// [`EventPoller::wait_for_transaction_status`] resolves.
    pub async fn authorize(
        &self,
        amount: Decimal,
        document_nr: &str,
        pan_l4: &str,
        currency: Option<&str>,
    ) -> LinkResult<CommandAck> {
        validate_document_nr(document_nr)?;
        validate_pan_l4(pan_l4)?;
        let amount = Money::from_decimal(amount)?;

        let params = AuthorizeParams {
            amount,
            cash_back_amount: Money::zero(),
            currency_code: self.currency_or_default(currency),
            document_nr: document_nr.to_string(),
            pan_l4_digit: pan_l4.to_string(),
        };

        info!(%amount, document_nr, "Authorizing");
        let response = self.execute(PosCommand::Authorize, &params).await?;
        Ok(CommandAck::parse_lenient(&response.body))
    }

    /// Refunds an amount back to the card (CREDIT).
    ///
    /// The RRN of the original authorization rides along so the terminal can
    /// correlate; the timestamp is the ECR-local moment of the request.
    /// Same contract as [`Self::authorize`]: the event is authoritative.
    pub async fn refund(
        &self,
        reference: &RefundReference,
        amount: Decimal,
        document_nr: &str,
        pan_l4: &str,
        currency: Option<&str>,
    ) -> LinkResult<CommandAck> {
        validate_document_nr(document_nr)?;
        validate_pan_l4(pan_l4)?;
        let amount = Money::from_decimal(amount)?;

        let params = CreditParams {
            amount,
            currency_code: self.currency_or_default(currency),
            document_nr: document_nr.to_string(),
            pan_l4_digit: pan_l4.to_string(),
            rrn: reference.rrn.clone(),
            time: Utc::now().format("%Y%m%d%H%M%S").to_string(),
        };

        info!(%amount, document_nr, rrn = %reference.rrn, "Refunding");
        let response = self.execute(PosCommand::Credit, &params).await?;

        // The terminal answers INVALID_ARG instead of a non-success status
        // when the refund references are unusable
        if response.body.contains("INVALID_ARG") {
            return Err(LinkError::CommandRejected {
                command: PosCommand::Credit.wire_name().to_string(),
                message: response.body,
            });
        }

        Ok(CommandAck::parse_lenient(&response.body))
    }

    /// Voids a prior operation by its terminal operation id.
    pub async fn void_transaction(&self, operation_id: &str) -> LinkResult<()> {
        validate_operation_id(operation_id)?;

        let params = VoidParams {
            operation_id: operation_id.to_string(),
        };
        info!(operation_id, "Voiding");
        self.execute(PosCommand::Void, &params).await?;
        Ok(())
    }

    // =========================================================================
    // End of Day
    // =========================================================================

    /// Starts the end-of-day closure.
    ///
    /// The immediate acknowledgment must carry `resultCode: OK`; anything
    /// else means the terminal refused to start closing and the caller must
    /// not sit waiting for a receipt that will never print.
    pub async fn close_day(&self) -> LinkResult<()> {
        let operator = &self.config.operator;
        let params = CloseDayParams {
            operator_id: operator.id.clone(),
            operator_name: operator.name.clone(),
        };

        info!(operator_id = %operator.id, "Closing business day");
        let response = self.execute(PosCommand::CloseDay, &params).await?;

        let ack = CommandAck::parse_lenient(&response.body);
        if !ack.is_ok() {
            let message = ack
                .result
                .and_then(|r| r.result_message)
                .unwrap_or(response.body);
            return Err(LinkError::CommandRejected {
                command: PosCommand::CloseDay.wire_name().to_string(),
                message,
            });
        }
        Ok(())
    }

    // =========================================================================
    // Document Close (retry with bounded backoff)
    // =========================================================================

    /// Closes a document, retrying until the terminal acknowledges.
    ///
    /// ## Acknowledgment Paths
    /// 1. Quick: the HTTP body of the attempt itself carries
    ///    `resultCode: OK`.
    /// 2. Slow: an ONTRNSTATUS event with `resultCode: OK` shows up on the
    ///    queue within the confirmation window (a few short long-polls).
    ///
    /// When neither confirms, the attempt repeats after a backoff pause, up
    /// to the configured cap. Exhaustion surfaces
    /// [`LinkError::DocCloseFailed`]; the caller decides between retrying
    /// the closure step and escalating to manual reconciliation.
    ///
    /// Borrows the poller mutably: the confirmation window reads the same
    /// shared event queue every other wait uses.
    pub async fn close_doc(
        &self,
        operation_id: &str,
        document_nr: &str,
        poller: &mut EventPoller,
    ) -> LinkResult<()> {
        validate_operation_id(operation_id)?;
        validate_document_nr(document_nr)?;

        let params = CloseDocParams {
            operations: vec![operation_id.to_string()],
            document_nr: document_nr.to_string(),
        };
        let attempts = self.config.timing.close_doc_attempts;
        let poll_secs = self.config.timing.close_doc_event_poll_secs.max(1);
        // The confirmation window is expressed as a number of short
        // long-polls; server-side blocking makes them span the window
        let confirm_polls =
            (self.config.timing.close_doc_event_window_secs.max(1)).div_ceil(poll_secs);

        let mut pause = ExponentialBackoffBuilder::new()
            .with_initial_interval(CLOSE_DOC_INITIAL_BACKOFF)
            .with_max_interval(CLOSE_DOC_MAX_BACKOFF)
            .with_max_elapsed_time(None)
            .build();

        for attempt in 1..=attempts {
            let response = self.execute(PosCommand::CloseDoc, &params).await?;

            if CommandAck::parse_lenient(&response.body).is_ok() {
                debug!(attempt, document_nr, "CLOSEDOC acknowledged immediately");
                return Ok(());
            }

            for _ in 0..confirm_polls {
                if let QueueMessage::Event(envelope) = poller.poll_once(poll_secs).await? {
                    if envelope.kind() == EventKind::OnTrnStatus
                        && envelope.result.as_ref().is_some_and(ResultEnvelope::is_ok)
                    {
                        debug!(attempt, document_nr, "CLOSEDOC acknowledged via event");
                        return Ok(());
                    }
                    debug!(
                        event = %envelope.kind(),
                        "Ignoring event while confirming CLOSEDOC"
                    );
                }
            }

            if attempt < attempts {
                warn!(attempt, document_nr, "CLOSEDOC not acknowledged, retrying");
                if let Some(delay) = pause.next_backoff() {
                    sleep(delay).await;
                }
            }
        }

        Err(LinkError::DocCloseFailed { attempts })
    }

    // =========================================================================
    // Message Box
    // =========================================================================

    /// Answers an on-screen message-box prompt.
    pub async fn set_msg_box_key(&self, key: MsgBoxKey) -> LinkResult<()> {
        let params = SetMsgBoxKeyParams {
            key_value: key.wire_name().to_string(),
        };
        self.execute(PosCommand::SetMsgBoxKey, &params).await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    fn dispatcher_with(transport: Arc<MockTransport>) -> CommandDispatcher {
        CommandDispatcher::new(transport, Arc::new(TerminalConfig::default()))
    }

    fn poller_with(transport: Arc<MockTransport>) -> EventPoller {
        EventPoller::new(transport, Arc::new(TerminalConfig::default()))
    }

    #[tokio::test]
    async fn test_unlock_converts_amount_to_minor_units() {
        let transport = Arc::new(MockTransport::new());
        let dispatcher = dispatcher_with(transport.clone());

        dispatcher
            .unlock_device(Decimal::new(999, 2), PosOperation::Authorize, None)
            .await
            .unwrap();

        let posts = transport.posts();
        let params = &posts[0].body.as_ref().unwrap()["params"];
        assert_eq!(params["amount"], 999);
        assert_eq!(params["cashBackAmount"], 0);
        assert_eq!(params["posOperation"], "AUTHORIZE");
        assert_eq!(params["currencyCode"], "981");
        assert_eq!(params["silentCardRead"], true);
    }

    #[tokio::test]
    async fn test_authorize_whole_amount() {
        let transport = Arc::new(MockTransport::new());
        let dispatcher = dispatcher_with(transport.clone());

        dispatcher
            .authorize(Decimal::new(6100, 2), "T01", "9999", None)
            .await
            .unwrap();

        let posts = transport.posts();
        let body = posts[0].body.as_ref().unwrap();
        assert_eq!(body["header"]["command"], "AUTHORIZE");
        assert_eq!(body["params"]["amount"], 6100);
        assert_eq!(body["params"]["documentNr"], "T01");
        assert_eq!(body["params"]["panL4Digit"], "9999");
    }

    #[tokio::test]
    async fn test_currency_override() {
        let transport = Arc::new(MockTransport::new());
        let dispatcher = dispatcher_with(transport.clone());

        dispatcher
            .authorize(Decimal::new(999, 2), "T01", "9999", Some("978"))
            .await
            .unwrap();

        let posts = transport.posts();
        assert_eq!(posts[0].body.as_ref().unwrap()["params"]["currencyCode"], "978");
    }

    #[tokio::test]
    async fn test_authorize_validates_before_wire() {
        let transport = Arc::new(MockTransport::new());
        let dispatcher = dispatcher_with(transport.clone());

        let err = dispatcher
            .authorize(Decimal::new(999, 2), "T01", "99x9", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::Core(_)));
        assert!(transport.posts().is_empty());
    }

    #[tokio::test]
    async fn test_refund_sends_rrn_and_time() {
        let transport = Arc::new(MockTransport::new());
        let dispatcher = dispatcher_with(transport.clone());
        let reference = RefundReference {
            stan: "50".to_string(),
            rrn: "5259RR100060".to_string(),
        };

        dispatcher
            .refund(&reference, Decimal::new(999, 2), "T05", "9999", None)
            .await
            .unwrap();

        let posts = transport.posts();
        let params = &posts[0].body.as_ref().unwrap()["params"];
        assert_eq!(params["RRN"], "5259RR100060");
        assert_eq!(params["amount"], 999);
        // yyyyMMddHHmmss
        assert_eq!(params["time"].as_str().unwrap().len(), 14);
        // The STAN stays off the wire
        assert!(params.get("STAN").is_none());
    }

    #[tokio::test]
    async fn test_refund_invalid_arg_is_rejected() {
        let transport = Arc::new(MockTransport::new());
        transport.push_post_ok(r#"{"result":{"resultCode":"INVALID_ARG","resultMessage":"bad RRN"}}"#);
        let dispatcher = dispatcher_with(transport);
        let reference = RefundReference {
            stan: "50".to_string(),
            rrn: "bogus".to_string(),
        };

        let err = dispatcher
            .refund(&reference, Decimal::new(999, 2), "T05", "9999", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::CommandRejected { .. }));
    }

    #[tokio::test]
    async fn test_close_day_requires_immediate_ok() {
        let transport = Arc::new(MockTransport::new());
        transport.push_post_ok(r#"{"result":{"resultCode":"BUSY","resultMessage":"terminal busy"}}"#);
        let dispatcher = dispatcher_with(transport);

        let err = dispatcher.close_day().await.unwrap_err();
        match err {
            LinkError::CommandRejected { command, message } => {
                assert_eq!(command, "CLOSEDAY");
                assert!(message.contains("busy"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_close_doc_immediate_ok() {
        let transport = Arc::new(MockTransport::new());
        transport.push_post_ok(r#"{"result":{"resultCode":"OK"}}"#);
        let dispatcher = dispatcher_with(transport.clone());
        let mut poller = poller_with(transport.clone());

        dispatcher
            .close_doc("OA1", "T01", &mut poller)
            .await
            .unwrap();

        // Quick path: one POST, no event polls
        assert_eq!(transport.commands_sent(), vec!["CLOSEDOC"]);
    }

    #[tokio::test]
    async fn test_close_doc_confirmed_via_event() {
        let transport = Arc::new(MockTransport::new());
        // First attempt: ack without OK, then the queue confirms
        transport.push_post_ok(r#"{"result":{"resultCode":"PENDING"}}"#);
        transport.push_get_ok(
            r#"{"eventName":"ONTRNSTATUS","properties":{"state":"Approved"},"result":{"resultCode":"OK"}}"#,
        );
        let dispatcher = dispatcher_with(transport.clone());
        let mut poller = poller_with(transport.clone());

        dispatcher
            .close_doc("OA1", "T01", &mut poller)
            .await
            .unwrap();
        assert_eq!(transport.commands_sent(), vec!["CLOSEDOC"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_doc_exhausts_retries() {
        let transport = Arc::new(MockTransport::new());
        let config = TerminalConfig::default();
        // Default timing: 5 attempts, each followed by ceil(3/2)=2 polls
        for _ in 0..config.timing.close_doc_attempts {
            transport.push_post_ok(r#"{"result":{"resultCode":"PENDING"}}"#);
            transport.push_queue_empty();
            transport.push_queue_empty();
        }
        let dispatcher = dispatcher_with(transport.clone());
        let mut poller = poller_with(transport.clone());

        let err = dispatcher
            .close_doc("OA1", "T01", &mut poller)
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::DocCloseFailed { attempts: 5 }));
        assert_eq!(transport.commands_sent().len(), 5);
    }

    #[tokio::test]
    async fn test_close_doc_poll_transport_error_propagates() {
        let transport = Arc::new(MockTransport::new());
        transport.push_post_ok(r#"{"result":{"resultCode":"PENDING"}}"#);
        transport.push_get_err(LinkError::Transport("connection reset".to_string()));
        let dispatcher = dispatcher_with(transport.clone());
        let mut poller = poller_with(transport);

        let err = dispatcher
            .close_doc("OA1", "T01", &mut poller)
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::Transport(_)));
    }

    #[tokio::test]
    async fn test_lock_device_uses_configured_idle_text() {
        let transport = Arc::new(MockTransport::new());
        let dispatcher = dispatcher_with(transport.clone());

        dispatcher.lock_device().await.unwrap();

        let posts = transport.posts();
        let body = posts[0].body.as_ref().unwrap();
        assert_eq!(body["header"]["command"], "LOCKDEVICE");
        assert_eq!(body["params"]["idleText"], "READY");
    }
}
