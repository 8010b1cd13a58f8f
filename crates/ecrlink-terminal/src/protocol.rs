//! # Wire Protocol Messages
//!
//! Serde models for the terminal's JSON command-and-event protocol.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Terminal Wire Protocol                             │
//! │                                                                         │
//! │  SESSION                                                               │
//! │  ───────                                                               │
//! │  POST /openpos   { licenseToken, alias, userName, password }           │
//! │            ◄───  { accessToken }                                       │
//! │  POST /closepos  (no body)                                             │
//! │                                                                         │
//! │  COMMANDS                                                              │
//! │  ────────                                                              │
//! │  POST /executeposcmd                                                   │
//! │    { "header": { "command": "AUTHORIZE" },                             │
//! │      "params": { "amount": 999, "currencyCode": "981", ... } }         │
//! │            ◄───  { "result": { "resultCode": "OK", ... } }             │
//! │                                                                         │
//! │  EVENTS (shared queue, long-poll)                                      │
//! │  ────────────────────────────────                                      │
//! │  GET /getEvent?longPollingTimeout=5                                    │
//! │            ◄───  { "message": "Queue empty." }          (idle tick)    │
//! │            ◄───  { "eventName": "ONTRNSTATUS",                         │
//! │                    "properties": { "state": "Approved", ... },         │
//! │                    "result": { "resultCode": "OK", ... } }             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no request/response correlation ID anywhere in this protocol.
//! An event correlates to a command only by its name and emission order,
//! which is why every amount, state, and identifier a flow needs must be
//! read out of the event itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ecrlink_core::money::Money;
use ecrlink_core::types::{
    AmountAdditional, CardEvent, CardEventSource, EventKind, PosCommand, PrintResult,
    TransactionResult, TransactionState,
};

use crate::error::{LinkError, LinkResult};

/// Substring the terminal uses to signal an empty event queue.
const QUEUE_EMPTY_MARKER: &str = "Queue empty.";

// =============================================================================
// Command Envelope
// =============================================================================

/// Builds the `executeposcmd` envelope: `{ header: { command }, params }`.
pub fn command_request<P: Serialize>(command: PosCommand, params: &P) -> LinkResult<Value> {
    Ok(serde_json::json!({
        "header": { "command": command.wire_name() },
        "params": serde_json::to_value(params)?,
    }))
}

// =============================================================================
// Command Parameter Shapes
// =============================================================================

/// UNLOCKDEVICE parameters. `pos_operation` declares the coming operation so
/// the terminal primes the right card-read flow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockDeviceParams {
    pub pos_operation: String,
    pub amount: Money,
    pub cash_back_amount: Money,
    pub currency_code: String,
    pub idle_text: String,
    pub language: String,
    pub ecr_version: String,
    pub operator_id: String,
    pub operator_name: String,
    pub silent_card_read: bool,
}

/// AUTHORIZE parameters. Amount already in minor units.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeParams {
    pub amount: Money,
    pub cash_back_amount: Money,
    pub currency_code: String,
    pub document_nr: String,
    pub pan_l4_digit: String,
}

/// CREDIT (refund) parameters. The RRN points at the original authorization;
/// `time` is the ECR-local timestamp in `yyyyMMddHHmmss`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditParams {
    pub amount: Money,
    pub currency_code: String,
    pub document_nr: String,
    pub pan_l4_digit: String,
    #[serde(rename = "RRN")]
    pub rrn: String,
    pub time: String,
}

/// VOID parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoidParams {
    pub operation_id: String,
}

/// CLOSEDOC parameters. `operations` lists the operation ids folded into the
/// document being closed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseDocParams {
    pub operations: Vec<String>,
    pub document_nr: String,
}

/// CLOSEDAY parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseDayParams {
    pub operator_id: String,
    pub operator_name: String,
}

/// LOCKDEVICE parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockDeviceParams {
    pub idle_text: String,
}

/// SETMSGBOXKEY parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetMsgBoxKeyParams {
    pub key_value: String,
}

// =============================================================================
// Session Shapes
// =============================================================================

/// `POST /openpos` request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPosRequest {
    pub license_token: String,
    pub alias: String,
    pub user_name: String,
    pub password: String,
}

/// `POST /openpos` response body.
///
/// The token is decoded through this typed shape on purpose: a success
/// status with no `accessToken` field is an authentication failure, not a
/// session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPosResponse {
    pub access_token: String,
}

// =============================================================================
// Result Envelope
// =============================================================================

/// The `result` envelope attached to command acknowledgments and events.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    #[serde(default)]
    pub result_code: Option<String>,

    #[serde(default)]
    pub result_message: Option<String>,

    #[serde(default)]
    pub result_time: Option<String>,
}

impl ResultEnvelope {
    /// True when the result code is "OK" (the terminal is case-insensitive
    /// about it, so we are too).
    pub fn is_ok(&self) -> bool {
        self.result_code
            .as_deref()
            .is_some_and(|code| code.eq_ignore_ascii_case("OK"))
    }
}

/// Immediate acknowledgment body of a command call.
///
/// Informational only for AUTHORIZE / VOID / CREDIT: the correlated event is
/// authoritative for the final state. CLOSEDAY and CLOSEDOC do inspect it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandAck {
    #[serde(default)]
    pub result: Option<ResultEnvelope>,
}

impl CommandAck {
    /// Decodes an acknowledgment body, tolerating any shape.
    ///
    /// Command bodies vary between firmware revisions; an undecodable ack is
    /// an empty ack, never an error.
    pub fn parse_lenient(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    /// True when the ack carries a result envelope with code "OK".
    pub fn is_ok(&self) -> bool {
        self.result.as_ref().is_some_and(ResultEnvelope::is_ok)
    }
}

// =============================================================================
// Event Envelope
// =============================================================================

/// One line item of the `amountAdditional` array.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountAdditionalWire {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub currency_code: String,

    pub amount: i64,
}

/// Properties bag of an event. Everything is optional; which fields are
/// populated depends on the event kind and firmware revision.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventProperties {
    pub operation_id: Option<String>,
    pub amount_authorized: Option<i64>,
    pub document_nr: Option<String>,
    pub cryptogram: Option<String>,
    pub auth_code: Option<String>,
    #[serde(rename = "RRN")]
    pub rrn: Option<String>,
    #[serde(rename = "STAN")]
    pub stan: Option<String>,
    pub card_type: Option<String>,
    pub amount_additional: Option<Vec<AmountAdditionalWire>>,
    pub text: Option<String>,
    pub state: Option<String>,
    pub authorization_state: Option<String>,
    pub card_name: Option<String>,
    #[serde(rename = "APN")]
    pub apn: Option<String>,
    #[serde(rename = "AID")]
    pub aid: Option<String>,
    #[serde(rename = "CVMApplied")]
    pub cvm_applied: Option<Vec<String>>,
    pub auth_center_name: Option<String>,
    pub tran_source_media: Option<String>,
    #[serde(rename = "PAN")]
    pub pan: Option<String>,
    #[serde(rename = "DCCResult")]
    pub dcc_result: Option<String>,
    #[serde(rename = "EcrData")]
    pub ecr_data: Option<String>,
    pub receipt_text: Option<String>,
    pub kbd_key: Option<String>,
}

/// A full event from the terminal's queue.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_name: String,

    #[serde(default)]
    pub properties: EventProperties,

    #[serde(default)]
    pub result: Option<ResultEnvelope>,
}

impl EventEnvelope {
    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        EventKind::from_wire(&self.event_name)
    }

    /// True for the ONKBD "FR" key confirmation some firmware revisions send
    /// in place of an ONCARD event. It satisfies a card wait.
    pub fn is_keyboard_confirm(&self) -> bool {
        self.kind() == EventKind::OnKbd
            && self.properties.kbd_key.as_deref() == Some("FR")
            && self.result.as_ref().is_some_and(ResultEnvelope::is_ok)
    }

    /// Extracts the card-presented outcome from an ONCARD event.
    pub fn card_event(&self) -> CardEvent {
        CardEvent {
            source: CardEventSource::CardReader,
            card_type: self.properties.card_type.clone(),
            pan: self.properties.pan.clone(),
        }
    }

    /// Extracts receipt text from an ONPRINT event, when present.
    pub fn print_result(&self) -> Option<PrintResult> {
        self.properties.receipt_text.as_ref().map(|text| PrintResult {
            receipt_text: text.clone(),
            document_nr: self.properties.document_nr.clone(),
        })
    }

    /// Converts an ONTRNSTATUS event into a typed [`TransactionResult`].
    ///
    /// The `state` property is the one field a status event cannot do
    /// without; its absence means the payload is not what this client
    /// understands and must surface as a decode failure.
    pub fn into_transaction_result(
        self,
        print: Option<PrintResult>,
    ) -> LinkResult<TransactionResult> {
        let props = self.properties;
        let result = self.result.unwrap_or_default();

        let state = props.state.ok_or_else(|| LinkError::Parse {
            context: format!("{} event", self.event_name),
            detail: "missing `state` property".to_string(),
        })?;

        let amount_additional = props
            .amount_additional
            .unwrap_or_default()
            .into_iter()
            .map(|line| AmountAdditional {
                kind: line.kind,
                currency_code: line.currency_code,
                amount: Money::from_minor_units(line.amount),
            })
            .collect();

        Ok(TransactionResult {
            operation_id: props.operation_id,
            document_nr: props.document_nr,
            state: TransactionState::from(state),
            stan: props.stan,
            rrn: props.rrn,
            auth_code: props.auth_code,
            card_type: props.card_type,
            amount_authorized: Money::from_minor_units(props.amount_authorized.unwrap_or(0)),
            amount_additional,
            print,
            authorization_state: props.authorization_state,
            card_name: props.card_name,
            pan: props.pan,
            aid: props.aid,
            apn: props.apn,
            cvm_applied: props.cvm_applied.unwrap_or_default(),
            auth_center_name: props.auth_center_name,
            tran_source_media: props.tran_source_media,
            dcc_result: props.dcc_result,
            ecr_data: props.ecr_data,
            cryptogram: props.cryptogram,
            text: props.text,
            result_code: result.result_code,
            result_message: result.result_message,
            result_time: result.result_time,
        })
    }
}

// =============================================================================
// Poll Body Classification
// =============================================================================

/// Classified body of one `getEvent` response.
#[derive(Debug)]
pub enum QueueMessage {
    /// The queue had nothing within the long-poll window. A normal idle
    /// tick, not an error; the poller simply polls again.
    Empty,

    /// A decoded event.
    Event(Box<EventEnvelope>),

    /// A body that names an event but does not decode into the envelope
    /// shape. Fatal only when the named event is the one being awaited.
    Malformed { event_name: String, detail: String },

    /// A body this client cannot place at all. Logged and skipped.
    Unrecognized(String),
}

/// Classifies one raw `getEvent` body.
pub fn classify_queue_body(body: &str) -> QueueMessage {
    if body.trim().is_empty() || body.contains(QUEUE_EMPTY_MARKER) {
        return QueueMessage::Empty;
    }

    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return QueueMessage::Unrecognized(body.to_string()),
    };

    let Some(event_name) = value.get("eventName").and_then(Value::as_str) else {
        // JSON, but neither an idle tick nor an event
        return QueueMessage::Unrecognized(body.to_string());
    };
    let event_name = event_name.to_string();

    match serde_json::from_value::<EventEnvelope>(value) {
        Ok(envelope) => QueueMessage::Event(Box::new(envelope)),
        Err(e) => QueueMessage::Malformed {
            event_name,
            detail: e.to_string(),
        },
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
