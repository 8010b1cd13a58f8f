//! # Domain Types
//!
//! Core domain types for the terminal's command-and-event protocol.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   PosCommand    │   │    EventKind    │   │TransactionState │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  UnlockDevice   │   │  OnCard         │   │  Approved       │       │
//! │  │  Authorize      │   │  OnTrnStatus    │   │  Declined       │       │
//! │  │  Void, Credit   │   │  OnPrint        │   │  Reversed       │       │
//! │  │  CloseDoc/Day   │   │  OnKbd/OnMsgBox │   │  Other(..)      │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────┐      │
//! │  │  TransactionResult                                           │      │
//! │  │  ──────────────────                                          │      │
//! │  │  operation_id, document_nr, state, STAN, RRN, auth_code,     │      │
//! │  │  card_type, amount_authorized, amount_additional[],          │      │
//! │  │  attached PrintResult                                        │      │
//! │  └──────────────────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Correlation Model
//! The terminal's event queue carries no request/response correlation IDs.
//! Events correlate to commands purely by event *name* and emission order,
//! which is why these enums (not free strings) anchor the client's waits.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Money;

// =============================================================================
// Commands
// =============================================================================

/// Commands accepted by the terminal's `executeposcmd` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PosCommand {
    /// Unlock the device for a coming operation (card read starts here).
    UnlockDevice,
    /// Authorize a purchase amount.
    Authorize,
    /// Void (reverse) a prior operation by its operation id.
    Void,
    /// Refund an amount back to the card.
    Credit,
    /// Close a document, finalizing its operations.
    CloseDoc,
    /// Close the business day and print totals.
    CloseDay,
    /// Return the device to its idle, locked state.
    LockDevice,
    /// Answer an on-screen message-box prompt.
    SetMsgBoxKey,
}

impl PosCommand {
    /// The exact command name on the wire.
    pub const fn wire_name(&self) -> &'static str {
        match self {
            PosCommand::UnlockDevice => "UNLOCKDEVICE",
            PosCommand::Authorize => "AUTHORIZE",
            PosCommand::Void => "VOID",
            PosCommand::Credit => "CREDIT",
            PosCommand::CloseDoc => "CLOSEDOC",
            PosCommand::CloseDay => "CLOSEDAY",
            PosCommand::LockDevice => "LOCKDEVICE",
            PosCommand::SetMsgBoxKey => "SETMSGBOXKEY",
        }
    }
}

impl fmt::Display for PosCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Intent declared when unlocking the device.
///
/// The terminal primes its card-read flow differently for a purchase, a
/// refund, and a plain administrative unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PosOperation {
    /// Unlock ahead of an AUTHORIZE (purchase).
    #[serde(rename = "AUTHORIZE")]
    Authorize,
    /// Unlock ahead of a CREDIT (refund).
    #[serde(rename = "CREDIT")]
    Credit,
    /// Unlock with no card operation planned (e.g. before a manual void).
    #[serde(rename = "NOOPERATION")]
    NoOperation,
}

impl fmt::Display for PosOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PosOperation::Authorize => f.write_str("AUTHORIZE"),
            PosOperation::Credit => f.write_str("CREDIT"),
            PosOperation::NoOperation => f.write_str("NOOPERATION"),
        }
    }
}

/// Keys accepted as an answer to an ONMSGBOX prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsgBoxKey {
    Ok,
    Yes,
    No,
    Cancel,
}

impl MsgBoxKey {
    /// The exact key value on the wire.
    pub const fn wire_name(&self) -> &'static str {
        match self {
            MsgBoxKey::Ok => "Ok",
            MsgBoxKey::Yes => "Yes",
            MsgBoxKey::No => "No",
            MsgBoxKey::Cancel => "Cancel",
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Event kinds the terminal emits on its shared queue.
///
/// Unknown names map to [`EventKind::Other`] rather than failing: the queue
/// may carry event kinds newer than this client, and unrelated kinds are
/// legal noise between a command and its correlated event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A card was presented to the reader.
    OnCard,
    /// Final status of an AUTHORIZE / VOID / CREDIT / CLOSEDOC operation.
    OnTrnStatus,
    /// Receipt text produced by the terminal.
    OnPrint,
    /// A physical key was pressed on the terminal keyboard.
    OnKbd,
    /// The terminal is showing a message box and waits for an answer.
    OnMsgBox,
    /// Any event kind this client does not model.
    Other(String),
}

impl EventKind {
    /// Maps a wire event name to its kind.
    pub fn from_wire(name: &str) -> Self {
        match name {
            "ONCARD" => EventKind::OnCard,
            "ONTRNSTATUS" => EventKind::OnTrnStatus,
            "ONPRINT" => EventKind::OnPrint,
            "ONKBD" => EventKind::OnKbd,
            "ONMSGBOX" => EventKind::OnMsgBox,
            other => EventKind::Other(other.to_string()),
        }
    }

    /// The wire name of this kind.
    pub fn wire_name(&self) -> &str {
        match self {
            EventKind::OnCard => "ONCARD",
            EventKind::OnTrnStatus => "ONTRNSTATUS",
            EventKind::OnPrint => "ONPRINT",
            EventKind::OnKbd => "ONKBD",
            EventKind::OnMsgBox => "ONMSGBOX",
            EventKind::Other(name) => name,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// =============================================================================
// Transaction State
// =============================================================================

/// Terminal-reported outcome of a transaction.
///
/// ## Declined Is Not an Error
/// A declined authorization is a perfectly valid outcome and flows through
/// the same result path as an approval. Only transport, parse, and timeout
/// failures are errors. Callers branch on this enum, they do not catch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransactionState {
    Approved,
    Declined,
    Reversed,
    /// A state string this client does not model; preserved verbatim.
    Other(String),
}

impl TransactionState {
    /// True for an approved authorization.
    pub fn is_approved(&self) -> bool {
        matches!(self, TransactionState::Approved)
    }
}

impl From<String> for TransactionState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Approved" => TransactionState::Approved,
            "Declined" => TransactionState::Declined,
            "Reversed" => TransactionState::Reversed,
            _ => TransactionState::Other(value),
        }
    }
}

impl From<TransactionState> for String {
    fn from(value: TransactionState) -> Self {
        match value {
            TransactionState::Approved => "Approved".to_string(),
            TransactionState::Declined => "Declined".to_string(),
            TransactionState::Reversed => "Reversed".to_string(),
            TransactionState::Other(s) => s,
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Approved => f.write_str("Approved"),
            TransactionState::Declined => f.write_str("Declined"),
            TransactionState::Reversed => f.write_str("Reversed"),
            TransactionState::Other(s) => f.write_str(s),
        }
    }
}

// =============================================================================
// Session Credentials
// =============================================================================

/// Credentials for opening a terminal session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// License token issued for this integration.
    pub license_token: String,

    /// Merchant alias registered on the terminal.
    pub alias: String,

    /// Operator user name.
    pub user_name: String,

    /// Operator password.
    pub password: String,
}

// =============================================================================
// Refund Reference
// =============================================================================

/// Identifiers correlating a refund with its original authorization.
///
/// The STAN stays in the domain model for reconciliation, but only the RRN
/// travels on the CREDIT wire payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReference {
    /// System Trace Audit Number of the original authorization.
    pub stan: String,

    /// Retrieval Reference Number of the original authorization.
    pub rrn: String,
}

// =============================================================================
// Transaction Result Model
// =============================================================================

/// One surcharge / discount / adjustment line on a transaction.
///
/// Sign and magnitude are preserved exactly as reported: a discount of one
/// unit arrives as `amount = -100` and stays `-100`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountAdditional {
    /// Adjustment type code reported by the terminal (e.g. "70").
    pub kind: String,

    /// ISO 4217 numeric currency code (e.g. "981").
    pub currency_code: String,

    /// Signed amount in minor units.
    pub amount: Money,
}

/// Receipt text captured from an ONPRINT event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintResult {
    /// The formatted receipt text, ready for the ECR's printer.
    pub receipt_text: String,

    /// Document number the receipt belongs to, when reported.
    pub document_nr: Option<String>,
}

/// How a card wait was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardEventSource {
    /// An ONCARD event: a card was presented to the reader.
    CardReader,
    /// The ONKBD "FR"/OK confirmation the terminal sends in place of a card
    /// read on some firmware revisions.
    KeyboardConfirm,
}

/// Outcome of waiting for a card presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardEvent {
    /// What satisfied the wait.
    pub source: CardEventSource,

    /// Card scheme reported with the event, when present.
    pub card_type: Option<String>,

    /// Masked PAN reported with the event, when present.
    pub pan: Option<String>,
}

/// Fully parsed outcome of a terminal transaction.
///
/// Built from an ONTRNSTATUS event; `print` carries the receipt captured
/// from any ONPRINT event observed during the same wait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
    /// Terminal-assigned operation identifier; required for VOID and CLOSEDOC.
    pub operation_id: Option<String>,

    /// ECR document number the operation belongs to.
    pub document_nr: Option<String>,

    /// Terminal-reported outcome.
    pub state: TransactionState,

    /// System Trace Audit Number.
    pub stan: Option<String>,

    /// Retrieval Reference Number.
    pub rrn: Option<String>,

    /// Authorization code from the issuing host.
    pub auth_code: Option<String>,

    /// Card scheme (e.g. "VISA").
    pub card_type: Option<String>,

    /// Amount actually authorized, in minor units.
    pub amount_authorized: Money,

    /// Ordered surcharge / discount lines; may be empty.
    pub amount_additional: Vec<AmountAdditional>,

    /// Receipt captured during the same wait, if any.
    pub print: Option<PrintResult>,

    /// Issuer-reported authorization state string, when distinct from `state`.
    pub authorization_state: Option<String>,

    /// Cardholder-facing card product name.
    pub card_name: Option<String>,

    /// Masked PAN.
    pub pan: Option<String>,

    /// EMV application identifier.
    pub aid: Option<String>,

    /// EMV application preferred name.
    pub apn: Option<String>,

    /// Cardholder verification methods applied, in order.
    pub cvm_applied: Vec<String>,

    /// Authorization center that answered.
    pub auth_center_name: Option<String>,

    /// Media the transaction was initiated from (chip, contactless, ...).
    pub tran_source_media: Option<String>,

    /// Dynamic currency conversion outcome.
    pub dcc_result: Option<String>,

    /// Free-form data echoed back to the ECR.
    pub ecr_data: Option<String>,

    /// EMV cryptogram.
    pub cryptogram: Option<String>,

    /// Free-form text attached to the status event.
    pub text: Option<String>,

    /// Result code from the event's result envelope (e.g. "OK").
    pub result_code: Option<String>,

    /// Human-readable result message from the event's result envelope.
    pub result_message: Option<String>,

    /// Timestamp string from the event's result envelope.
    pub result_time: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================
