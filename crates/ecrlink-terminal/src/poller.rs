//! # Event Poller / Correlator
//!
//! Turns the terminal's single shared event queue into typed, awaited
//! outcomes. This is the heart of the client: the protocol has no
//! request/response correlation IDs, so the only correct strategy is
//! "await the next event of kind K, treating every other kind as either
//! ignorable noise or side-channel state to merge in".
//!
//! ## Wait State Machine (per wait operation)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Event Wait State Machine                          │
//! │                                                                         │
//! │        ┌──────┐  GET /getEvent?longPollingTimeout=N   ┌─────────┐      │
//! │   ┌───►│ Idle │ ─────────────────────────────────────►│ Waiting │      │
//! │   │    └──────┘                                       └────┬────┘      │
//! │   │                                                        │           │
//! │   │   "Queue empty."  ───────────── idle tick ─────────────┤           │
//! │   ├────────────────────────────────────────────────────────┤           │
//! │   │   ONPRINT (side channel)  ── capture receipt ──────────┤           │
//! │   ├────────────────────────────────────────────────────────┤           │
//! │   │   ONMSGBOX  ── answer with SETMSGBOXKEY, inline ───────┤           │
//! │   ├────────────────────────────────────────────────────────┤           │
//! │   │   other kinds  ── discard (duplicate/echo tolerance) ──┤           │
//! │   │                                                        │           │
//! │   │   awaited kind ── parse, attach captured side state    │           │
//! │   │                         │                              │           │
//! │   │                         ▼                              │           │
//! │   │                  ┌────────────┐                        │           │
//! │   └──                │ Satisfied  │ (terminal state)       │           │
//! │                      └────────────┘                        │           │
//! │                                                                         │
//! │  Failure exits: transport error (propagates, no silent retry),         │
//! │  decode failure on the MATCHED kind (protocol drift must surface),     │
//! │  wall-clock deadline / cancellation on the day-close wait.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Exclusivity
//! Every wait takes `&mut self`. One poller instance means at most one
//! outstanding wait, which is exactly what the un-correlated queue demands;
//! the borrow checker enforces the invariant instead of a runtime flag.

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ecrlink_core::types::{CardEvent, CardEventSource, EventKind, MsgBoxKey, PosCommand, PrintResult, TransactionResult};
use ecrlink_core::validation::clamp_long_poll_secs;

use crate::config::TerminalConfig;
use crate::error::{LinkError, LinkResult};
use crate::protocol::{classify_queue_body, command_request, EventEnvelope, QueueMessage, SetMsgBoxKeyParams};
use crate::transport::TerminalTransport;

/// Awaits events from the terminal's shared queue and resolves them into
/// typed outcomes.
pub struct EventPoller {
    transport: Arc<dyn TerminalTransport>,
    config: Arc<TerminalConfig>,

    /// Receipt captured from ONPRINT side-channel events. Survives across
    /// waits within one transaction so a receipt printed before the status
    /// event still ends up attached to the final result.
    captured_print: Option<PrintResult>,
}

impl EventPoller {
    /// Creates a poller over a transport.
    pub fn new(transport: Arc<dyn TerminalTransport>, config: Arc<TerminalConfig>) -> Self {
        EventPoller {
            transport,
            config,
            captured_print: None,
        }
    }

    // =========================================================================
    // Single Poll Tick
    // =========================================================================

    /// Issues one long-poll and classifies the response.
    ///
    /// The window is clamped to the 1-60 s range the terminal accepts. A
    /// transport error is NOT retried here; the caller owns retry policy.
    pub(crate) async fn poll_once(&mut self, long_poll_secs: u64) -> LinkResult<QueueMessage> {
        let window = clamp_long_poll_secs(long_poll_secs);
        let response = self
            .transport
            .get(&format!("getEvent?longPollingTimeout={window}"))
            .await?;

        if !response.is_success() {
            return Err(LinkError::Http {
                status: response.status,
                body: response.body,
            });
        }

        Ok(classify_queue_body(&response.body))
    }

    // =========================================================================
    // Side-Channel Handling
    // =========================================================================

    /// Records the receipt carried by an ONPRINT side-channel event.
    fn capture_print(&mut self, envelope: &EventEnvelope) {
        match envelope.print_result() {
            Some(print) => {
                debug!(document_nr = ?print.document_nr, "Captured receipt from ONPRINT");
                self.captured_print = Some(print);
            }
            None => {
                // Side channel only; a receipt-less ONPRINT is dropped, not fatal
                warn!("ONPRINT event carried no receipt text, ignoring");
            }
        }
    }

    /// Takes the receipt captured so far, clearing it for the next
    /// transaction.
    fn take_captured_print(&mut self) -> Option<PrintResult> {
        self.captured_print.take()
    }

    /// Answers an ONMSGBOX prompt so the terminal can continue.
    ///
    /// The terminal blocks on its message box; the answer has to go out
    /// inline, before the next poll, or the awaited event never arrives.
    async fn answer_msg_box(&self, key: MsgBoxKey) -> LinkResult<()> {
        info!(key = key.wire_name(), "Answering ONMSGBOX prompt");
        let params = SetMsgBoxKeyParams {
            key_value: key.wire_name().to_string(),
        };
        let body = command_request(PosCommand::SetMsgBoxKey, &params)?;
        let response = self.transport.post_json("executeposcmd", Some(&body)).await?;

        if !response.is_success() {
            return Err(LinkError::Http {
                status: response.status,
                body: response.body,
            });
        }
        Ok(())
    }

    /// Decides what a malformed queue body means for the current wait.
    ///
    /// Undecodable bodies of the MATCHED kind are protocol drift and fatal;
    /// anything else is noise another firmware revision put on the shared
    /// queue, logged and skipped.
    fn handle_malformed(
        &self,
        target: &EventKind,
        event_name: String,
        detail: String,
    ) -> LinkResult<()> {
        if &EventKind::from_wire(&event_name) == target {
            Err(LinkError::Parse {
                context: format!("{event_name} event"),
                detail,
            })
        } else {
            debug!(%event_name, %detail, "Skipping malformed unrelated event");
            Ok(())
        }
    }

    // =========================================================================
    // Waits
    // =========================================================================

    /// Waits for a card presentation after an UNLOCKDEVICE.
    ///
    /// Satisfied by ONCARD, or by the ONKBD "FR"/OK confirmation some
    /// firmware revisions emit instead of a card read. ONPRINT events seen
    /// meanwhile are captured for the transaction result; everything else
    /// is discarded.
    pub async fn wait_for_card(&mut self) -> LinkResult<CardEvent> {
        let long_poll = self.config.timing.long_poll_secs;
        loop {
            match self.poll_once(long_poll).await? {
                QueueMessage::Empty => continue,
                QueueMessage::Event(envelope) => match envelope.kind() {
                    EventKind::OnCard => {
                        info!(card_type = ?envelope.properties.card_type, "Card presented");
                        return Ok(envelope.card_event());
                    }
                    EventKind::OnKbd if envelope.is_keyboard_confirm() => {
                        info!("Keyboard confirmation received in place of card read");
                        return Ok(CardEvent {
                            source: CardEventSource::KeyboardConfirm,
                            card_type: None,
                            pan: None,
                        });
                    }
                    EventKind::OnPrint => self.capture_print(&envelope),
                    EventKind::OnMsgBox => self.answer_msg_box(MsgBoxKey::Ok).await?,
                    other => debug!(event = %other, "Ignoring event while waiting for card"),
                },
                QueueMessage::Malformed { event_name, detail } => {
                    self.handle_malformed(&EventKind::OnCard, event_name, detail)?
                }
                QueueMessage::Unrecognized(body) => {
                    debug!(%body, "Ignoring unrecognized queue body")
                }
            }
        }
    }

    /// Waits for the final ONTRNSTATUS of an AUTHORIZE or CREDIT, merging in
    /// any receipt captured from ONPRINT along the way.
    ///
    /// The HTTP acknowledgment of the command only meant "accepted for
    /// processing"; this event is the authoritative outcome. A `Declined`
    /// state returns through `Ok` like any other.
    pub async fn wait_for_transaction_status(&mut self) -> LinkResult<TransactionResult> {
        let long_poll = self.config.timing.long_poll_secs;
        loop {
            match self.poll_once(long_poll).await? {
                QueueMessage::Empty => continue,
                QueueMessage::Event(envelope) => match envelope.kind() {
                    EventKind::OnTrnStatus => {
                        let print = self.take_captured_print();
                        let result = envelope.into_transaction_result(print)?;
                        info!(
                            state = %result.state,
                            operation_id = ?result.operation_id,
                            "Transaction status received"
                        );
                        return Ok(result);
                    }
                    EventKind::OnPrint => self.capture_print(&envelope),
                    EventKind::OnMsgBox => self.answer_msg_box(MsgBoxKey::Ok).await?,
                    other => {
                        debug!(event = %other, "Ignoring event while waiting for transaction status")
                    }
                },
                QueueMessage::Malformed { event_name, detail } => {
                    self.handle_malformed(&EventKind::OnTrnStatus, event_name, detail)?
                }
                QueueMessage::Unrecognized(body) => {
                    debug!(%body, "Ignoring unrecognized queue body")
                }
            }
        }
    }

    /// Waits for the ONTRNSTATUS confirming a VOID.
    ///
    /// Same contract as [`Self::wait_for_transaction_status`] minus the
    /// receipt merge; voids do not print through the side channel.
    pub async fn wait_for_void_status(&mut self) -> LinkResult<TransactionResult> {
        let long_poll = self.config.timing.long_poll_secs;
        loop {
            match self.poll_once(long_poll).await? {
                QueueMessage::Empty => continue,
                QueueMessage::Event(envelope) => match envelope.kind() {
                    EventKind::OnTrnStatus => {
                        let result = envelope.into_transaction_result(None)?;
                        info!(state = %result.state, "Void status received");
                        return Ok(result);
                    }
                    EventKind::OnMsgBox => self.answer_msg_box(MsgBoxKey::Ok).await?,
                    other => debug!(event = %other, "Ignoring event while waiting for void status"),
                },
                QueueMessage::Malformed { event_name, detail } => {
                    self.handle_malformed(&EventKind::OnTrnStatus, event_name, detail)?
                }
                QueueMessage::Unrecognized(body) => {
                    debug!(%body, "Ignoring unrecognized queue body")
                }
            }
        }
    }

    /// Waits for the day-close receipt (ONPRINT), answering ONMSGBOX
    /// prompts along the way.
    ///
    /// Unlike the other waits this one is bounded: a wall-clock deadline
    /// spans the repeated long-polls, and the cancellation token is checked
    /// once per iteration. On expiry the in-flight poll has already
    /// drained, so no read event is left stranded in the queue.
    pub async fn wait_for_day_close_receipt(
        &mut self,
        cancel: &CancellationToken,
    ) -> LinkResult<PrintResult> {
        let deadline_secs = self.config.timing.close_day_deadline_secs;
        let deadline = Instant::now() + self.config.timing.close_day_deadline();
        let long_poll = self.config.timing.close_day_poll_secs;

        loop {
            if cancel.is_cancelled() {
                return Err(LinkError::Cancelled {
                    event: EventKind::OnPrint.wire_name().to_string(),
                });
            }
            if Instant::now() >= deadline {
                return Err(LinkError::PollTimeout {
                    event: EventKind::OnPrint.wire_name().to_string(),
                    deadline_secs,
                });
            }

            match self.poll_once(long_poll).await? {
                QueueMessage::Empty => continue,
                QueueMessage::Event(envelope) => match envelope.kind() {
                    EventKind::OnPrint => {
                        return envelope.print_result().ok_or_else(|| LinkError::Parse {
                            context: "ONPRINT event".to_string(),
                            detail: "missing receiptText property".to_string(),
                        });
                    }
                    EventKind::OnMsgBox => self.answer_msg_box(MsgBoxKey::Ok).await?,
                    other => debug!(event = %other, "Ignoring event while waiting for day-close receipt"),
                },
                QueueMessage::Malformed { event_name, detail } => {
                    self.handle_malformed(&EventKind::OnPrint, event_name, detail)?
                }
                QueueMessage::Unrecognized(body) => {
                    debug!(%body, "Ignoring unrecognized queue body")
                }
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    fn poller_with(transport: Arc<MockTransport>) -> EventPoller {
        EventPoller::new(transport, Arc::new(TerminalConfig::default()))
    }

    #[tokio::test]
    async fn test_empty_queue_ticks_are_tolerated() {
        let transport = Arc::new(MockTransport::new());
        for _ in 0..7 {
            transport.push_queue_empty();
        }
        transport.push_get_ok(r#"{"eventName":"ONCARD","properties":{"cardType":"VISA"}}"#);

        let mut poller = poller_with(transport);
        let card = poller.wait_for_card().await.unwrap();
        assert_eq!(card.source, CardEventSource::CardReader);
        assert_eq!(card.card_type.as_deref(), Some("VISA"));
    }

    #[tokio::test]
    async fn test_event_kind_isolation() {
        // Interleaved [ONPRINT, ONKBD, ONCARD]: only ONCARD satisfies the
        // wait; ONPRINT is captured as side state, the non-FR ONKBD dropped.
        let transport = Arc::new(MockTransport::new());
        transport.push_get_ok(
            r#"{"eventName":"ONPRINT","properties":{"receiptText":"PRE-RECEIPT","documentNr":"T01"}}"#,
        );
        transport.push_get_ok(r#"{"eventName":"ONKBD","properties":{"kbdKey":"F1"}}"#);
        transport.push_get_ok(r#"{"eventName":"ONCARD"}"#);

        let mut poller = poller_with(transport.clone());
        let card = poller.wait_for_card().await.unwrap();
        assert_eq!(card.source, CardEventSource::CardReader);

        // The captured receipt attaches to the next status result
        transport.push_get_ok(r#"{"eventName":"ONTRNSTATUS","properties":{"state":"Approved"}}"#);
        let result = poller.wait_for_transaction_status().await.unwrap();
        assert_eq!(result.print.unwrap().receipt_text, "PRE-RECEIPT");
    }

    #[tokio::test]
    async fn test_keyboard_confirm_satisfies_card_wait() {
        let transport = Arc::new(MockTransport::new());
        transport.push_get_ok(
            r#"{"eventName":"ONKBD","properties":{"kbdKey":"FR"},"result":{"resultCode":"OK"}}"#,
        );

        let mut poller = poller_with(transport);
        let card = poller.wait_for_card().await.unwrap();
        assert_eq!(card.source, CardEventSource::KeyboardConfirm);
    }

    #[tokio::test]
    async fn test_transaction_status_merges_print() {
        let transport = Arc::new(MockTransport::new());
        transport.push_queue_empty();
        transport.push_get_ok(
            r#"{"eventName":"ONPRINT","properties":{"receiptText":"CUSTOMER COPY"}}"#,
        );
        transport.push_get_ok(
            r#"{
                "eventName":"ONTRNSTATUS",
                "properties":{"state":"Approved","operationId":"OA1","STAN":"50","RRN":"5259RR100060","amountAuthorized":999},
                "result":{"resultCode":"OK"}
            }"#,
        );

        let mut poller = poller_with(transport);
        let result = poller.wait_for_transaction_status().await.unwrap();
        assert!(result.state.is_approved());
        assert_eq!(result.operation_id.as_deref(), Some("OA1"));
        assert_eq!(result.amount_authorized.minor_units(), 999);
        assert_eq!(result.print.unwrap().receipt_text, "CUSTOMER COPY");
    }

    #[tokio::test]
    async fn test_declined_flows_through_ok_path() {
        let transport = Arc::new(MockTransport::new());
        transport.push_get_ok(r#"{"eventName":"ONTRNSTATUS","properties":{"state":"Declined"}}"#);

        let mut poller = poller_with(transport);
        let result = poller.wait_for_transaction_status().await.unwrap();
        assert!(!result.state.is_approved());
        assert_eq!(String::from(result.state), "Declined");
    }

    #[tokio::test]
    async fn test_malformed_matched_event_is_fatal() {
        let transport = Arc::new(MockTransport::new());
        transport.push_get_ok(
            r#"{"eventName":"ONTRNSTATUS","properties":{"amountAuthorized":{"nested":true}}}"#,
        );

        let mut poller = poller_with(transport);
        let err = poller.wait_for_transaction_status().await.unwrap_err();
        assert!(matches!(err, LinkError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_malformed_unrelated_event_is_skipped() {
        let transport = Arc::new(MockTransport::new());
        // Malformed ONPRINT must not kill a status wait
        transport.push_get_ok(
            r#"{"eventName":"ONPRINT","properties":{"receiptText":{"bad":"shape"}}}"#,
        );
        transport.push_get_ok(r#"{"eventName":"ONTRNSTATUS","properties":{"state":"Approved"}}"#);

        let mut poller = poller_with(transport);
        let result = poller.wait_for_transaction_status().await.unwrap();
        assert!(result.state.is_approved());
    }

    #[tokio::test]
    async fn test_poll_transport_error_propagates() {
        let transport = Arc::new(MockTransport::new());
        transport.push_get_err(LinkError::Transport("connection reset".to_string()));

        let mut poller = poller_with(transport);
        let err = poller.wait_for_card().await.unwrap_err();
        assert!(matches!(err, LinkError::Transport(_)));
    }

    #[tokio::test]
    async fn test_msg_box_answered_inline_during_day_close() {
        let transport = Arc::new(MockTransport::new());
        transport.push_get_ok(r#"{"eventName":"ONMSGBOX","properties":{"text":"CLOSE DAY?"}}"#);
        transport.push_get_ok(
            r#"{"eventName":"ONPRINT","properties":{"receiptText":"DAY TOTALS","documentNr":"Z-001"}}"#,
        );

        let mut poller = poller_with(transport.clone());
        let cancel = CancellationToken::new();
        let print = poller.wait_for_day_close_receipt(&cancel).await.unwrap();

        assert_eq!(print.receipt_text, "DAY TOTALS");
        // The prompt was acknowledged before polling resumed
        assert_eq!(transport.commands_sent(), vec!["SETMSGBOXKEY"]);
        let posts = transport.posts();
        assert_eq!(posts[0].body.as_ref().unwrap()["params"]["keyValue"], "Ok");
    }

    #[tokio::test]
    async fn test_day_close_deadline_elapses() {
        let transport = Arc::new(MockTransport::new());
        let mut config = TerminalConfig::default();
        config.timing.close_day_deadline_secs = 0;

        let mut poller = EventPoller::new(transport, Arc::new(config));
        let cancel = CancellationToken::new();
        let err = poller.wait_for_day_close_receipt(&cancel).await.unwrap_err();
        assert!(matches!(err, LinkError::PollTimeout { .. }));
    }

    #[tokio::test]
    async fn test_day_close_cancellation() {
        let transport = Arc::new(MockTransport::new());
        let mut poller = poller_with(transport);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = poller.wait_for_day_close_receipt(&cancel).await.unwrap_err();
        assert!(matches!(err, LinkError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_non_success_poll_status_is_an_error() {
        let transport = Arc::new(MockTransport::new());
        transport.push_get_status(502, "bad gateway");

        let mut poller = poller_with(transport);
        let err = poller.wait_for_card().await.unwrap_err();
        assert!(matches!(err, LinkError::Http { status: 502, .. }));
    }
}
