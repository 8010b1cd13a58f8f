//! # Error Types
//!
//! Domain-specific error types for ecrlink-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  ecrlink-core errors (this file)                                       │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  ecrlink-terminal errors (separate crate)                              │
//! │  └── LinkError        - Session, transport, parse, timeout failures    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → LinkError → caller                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (field names, offending values)
//! 3. Errors are enum variants, never String
//! 4. A declined transaction is NOT an error; it is a terminal state

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
///
/// These errors represent protocol rule violations or domain logic failures.
/// Transport and session failures live in the client crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A decimal amount did not fit in integer minor units.
    ///
    /// ## When This Occurs
    /// - Caller passes an absurdly large decimal amount
    /// - Defensive bound; real card amounts never approach it
    #[error("Amount out of range for minor units: {amount}")]
    AmountOutOfRange { amount: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when command parameters don't meet the terminal's
/// requirements. Used for early validation before anything hits the wire.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g. non-digit PAN suffix).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
