//! # Client Error Types
//!
//! Error types for terminal client operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Client Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │     Session     │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Auth           │  │  Transport      │  │  Parse                  │ │
//! │  │                 │  │  Http           │  │  Serialization          │ │
//! │  │                 │  │                 │  │  CommandRejected        │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │     Waits       │  │  Configuration  │  │      Domain             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  PollTimeout    │  │  InvalidConfig  │  │  Core (from             │ │
//! │  │  Cancelled      │  │  InvalidUrl     │  │   ecrlink-core)         │ │
//! │  │  DocCloseFailed │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A declined transaction is NOT represented here. Declines are a valid
//! [`TransactionState`](ecrlink_core::TransactionState) and travel the
//! success path.

use thiserror::Error;

/// Result type alias for terminal client operations.
pub type LinkResult<T> = Result<T, LinkError>;

/// Terminal client error type covering all failure modes.
///
/// ## Design Principles
/// - Each variant includes enough context for debugging
/// - Errors are categorized for different handling strategies
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum LinkError {
    // =========================================================================
    // Session Errors
    // =========================================================================
    /// Opening the session failed (bad credentials/license, or the response
    /// carried no access token).
    #[error("POS session open failed: {0}")]
    Auth(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// HTTP-level failure: connection refused, timeout, TLS failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The terminal answered with a non-success HTTP status.
    #[error("Terminal returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// A matched event body could not be decoded into the expected shape.
    /// Fatal to the wait; a mismatch here means protocol drift that must
    /// surface rather than be swallowed.
    #[error("Failed to decode {context}: {detail}")]
    Parse { context: String, detail: String },

    /// Failed to serialize a request body.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// The terminal rejected a command outright (e.g. INVALID_ARG, or a
    /// CLOSEDAY result other than OK).
    #[error("{command} rejected by terminal: {message}")]
    CommandRejected { command: String, message: String },

    // =========================================================================
    // Wait Errors
    // =========================================================================
    /// A wall-clock deadline elapsed without the awaited event.
    #[error("Timed out after {deadline_secs}s waiting for {event}")]
    PollTimeout { event: String, deadline_secs: u64 },

    /// The caller cancelled the wait.
    #[error("Wait for {event} cancelled")]
    Cancelled { event: String },

    /// CLOSEDOC exhausted its retry budget without an acknowledgment.
    #[error("Document close not acknowledged after {attempts} attempts")]
    DocCloseFailed { attempts: u32 },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid base URL.
    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),

    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// Domain-level failure from ecrlink-core (validation, amount range).
    #[error(transparent)]
    Core(#[from] ecrlink_core::CoreError),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<reqwest::Error> for LinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LinkError::Transport(format!("request timed out: {err}"))
        } else if err.is_connect() {
            LinkError::Transport(format!("connection failed: {err}"))
        } else {
            LinkError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(err: serde_json::Error) -> Self {
        LinkError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for LinkError {
    fn from(err: url::ParseError) -> Self {
        LinkError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::InvalidConfig(format!("failed to load config: {err}"))
    }
}

impl From<toml::de::Error> for LinkError {
    fn from(err: toml::de::Error) -> Self {
        LinkError::InvalidConfig(format!("failed to parse config: {err}"))
    }
}

impl From<ecrlink_core::ValidationError> for LinkError {
    fn from(err: ecrlink_core::ValidationError) -> Self {
        LinkError::Core(err.into())
    }
}

// =============================================================================
// Error Categorization (for retry decisions)
// =============================================================================

impl LinkError {
    /// Returns true if this error is transient and the whole operation can be
    /// retried against the same terminal.
    ///
    /// ## Retryable Errors
    /// - Transport failures (network issues)
    /// - Non-success HTTP statuses
    /// - Poll deadline expirations
    /// - Exhausted document-close retries (caller may re-run the closure step)
    ///
    /// ## Non-Retryable Errors
    /// - Authentication failures
    /// - Protocol decode failures (version drift)
    /// - Configuration errors
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LinkError::Transport(_)
                | LinkError::Http { .. }
                | LinkError::PollTimeout { .. }
                | LinkError::DocCloseFailed { .. }
        )
    }

    /// Returns true if this error indicates protocol drift between client
    /// and terminal firmware.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            LinkError::Parse { .. }
                | LinkError::Serialization(_)
                | LinkError::CommandRejected { .. }
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(self, LinkError::InvalidConfig(_) | LinkError::InvalidUrl(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(LinkError::Transport("connection refused".into()).is_retryable());
        assert!(LinkError::Http {
            status: 502,
            body: "bad gateway".into()
        }
        .is_retryable());
        assert!(LinkError::PollTimeout {
            event: "ONPRINT".into(),
            deadline_secs: 130
        }
        .is_retryable());
        assert!(LinkError::DocCloseFailed { attempts: 5 }.is_retryable());

        assert!(!LinkError::Auth("bad license".into()).is_retryable());
        assert!(!LinkError::Parse {
            context: "ONTRNSTATUS event".into(),
            detail: "missing state".into()
        }
        .is_retryable());
        assert!(!LinkError::InvalidConfig("no base url".into()).is_retryable());
    }

    #[test]
    fn test_protocol_errors() {
        assert!(LinkError::Parse {
            context: "ONPRINT event".into(),
            detail: "not json".into()
        }
        .is_protocol_error());
        assert!(LinkError::CommandRejected {
            command: "CLOSEDAY".into(),
            message: "BUSY".into()
        }
        .is_protocol_error());
        assert!(!LinkError::Transport("reset".into()).is_protocol_error());
    }

    #[test]
    fn test_error_display() {
        let err = LinkError::PollTimeout {
            event: "ONPRINT".into(),
            deadline_secs: 130,
        };
        assert!(err.to_string().contains("130"));
        assert!(err.to_string().contains("ONPRINT"));

        let err = LinkError::DocCloseFailed { attempts: 5 };
        assert!(err.to_string().contains("5 attempts"));
    }
}
