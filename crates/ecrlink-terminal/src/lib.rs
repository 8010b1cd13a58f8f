//! # ecrlink-terminal: Async Client for JSON/HTTP POS Payment Terminals
//!
//! This crate turns a payment terminal's stateless request/response HTTP API
//! plus its out-of-band event queue into a coherent asynchronous transaction
//! lifecycle.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Terminal Client Architecture                        │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │              TransactionOrchestrator (Main Entry)                │  │
//! │  │                                                                  │  │
//! │  │  purchase / refund / void / close_day                            │  │
//! │  │  Single-flight per terminal, guaranteed lock+close cleanup       │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │    Session     │  │   Dispatcher   │  │   EventPoller          │    │
//! │  │                │  │                │  │                        │    │
//! │  │ open/close POS │  │ one method per │  │ long-polls the shared  │    │
//! │  │ bearer token   │  │ command; minor │  │ event queue; resolves  │    │
//! │  │ holder         │  │ unit boundary  │  │ waits by event kind    │    │
//! │  └───────┬────────┘  └───────┬────────┘  └───────────┬────────────┘    │
//! │          │                   │                       │                  │
//! │          └───────────────────┼───────────────────────┘                  │
//! │                              ▼                                          │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        TerminalTransport trait ── HttpTransport (reqwest)       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  The protocol has no correlation IDs: an event matches a command by    │
//! │  its name and emission order only. Everything here exists to make      │
//! │  that safe: one flow at a time, one outstanding wait at a time,        │
//! │  side-channel events captured or answered, noise tolerated.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Terminal configuration (base URL, credentials, timing)
//! - [`dispatcher`] - Command dispatch, amount conversion, CLOSEDOC retry
//! - [`error`] - Client error taxonomy
//! - [`orchestrator`] - Full business flows with guaranteed cleanup
//! - [`poller`] - Event poller / correlator over the shared queue
//! - [`protocol`] - Wire shapes (commands, events, classification)
//! - [`session`] - Session lifecycle and the bearer token
//! - [`transport`] - The HTTP seam (trait + reqwest implementation)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ecrlink_terminal::{PurchaseRequest, TerminalConfig, TransactionOrchestrator};
//! use rust_decimal::Decimal;
//!
//! let config = TerminalConfig::load("terminal.toml")?;
//! let orchestrator = TransactionOrchestrator::connect(config)?;
//!
//! let result = orchestrator
//!     .purchase(&PurchaseRequest {
//!         amount: Decimal::new(999, 2), // 9.99
//!         document_nr: "T01".into(),
//!         pan_l4: "9999".into(),
//!         currency: None,
//!     })
//!     .await?;
//!
//! println!("state: {}, receipt: {:?}", result.state, result.print);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod poller;
pub mod protocol;
pub mod session;
pub mod transport;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{DeviceConfig, OperatorConfig, TerminalConfig, TimingConfig};
pub use dispatcher::CommandDispatcher;
pub use error::{LinkError, LinkResult};
pub use orchestrator::{PurchaseRequest, RefundRequest, TransactionOrchestrator};
pub use poller::EventPoller;
pub use session::Session;
pub use transport::{HttpTransport, RawResponse, TerminalTransport};

// Domain types callers branch on
pub use ecrlink_core::money::Money;
pub use ecrlink_core::types::{
    CardEvent, CardEventSource, Credentials, MsgBoxKey, PosOperation, PrintResult,
    RefundReference, TransactionResult, TransactionState,
};
