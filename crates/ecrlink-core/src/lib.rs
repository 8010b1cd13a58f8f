//! # ecrlink-core: Pure Domain Logic for the ECRLink Terminal Client
//!
//! This crate is the **heart** of ECRLink. It contains the protocol's domain
//! model as pure types and functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        ECRLink Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 ecrlink-terminal (client crate)                 │   │
//! │  │                                                                 │   │
//! │  │   Session ──► Dispatcher ──► Event Poller ──► Orchestrator     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ ecrlink-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │ validation│  │   error   │  │   │
//! │  │   │  events   │  │   Money   │  │   rules   │  │  domain   │  │   │
//! │  │   │  results  │  │ minor unit│  │  checks   │  │  errors   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • PURE FUNCTIONS                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Protocol domain types (commands, events, transaction results)
//! - [`money`] - Money type with integer minor-unit arithmetic (no floats!)
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation for command parameters
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Network and file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in minor units (i64)
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use ecrlink_core::money::Money;
//! use rust_decimal::Decimal;
//!
//! // Convert a decimal amount exactly once, at the command boundary
//! let amount = Money::from_decimal(Decimal::new(999, 2)).unwrap();
//! assert_eq!(amount.minor_units(), 999); // 9.99 -> 999
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use ecrlink_core::Money` instead of
// `use ecrlink_core::money::Money`

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default ISO 4217 numeric currency code sent with every amount ("981" = GEL).
///
/// ## Why a constant?
/// The terminal requires a currency code on every monetary command. Deployments
/// targeting a different currency override it in configuration; everything else
/// falls back to this value.
pub const DEFAULT_CURRENCY_CODE: &str = "981";

/// Lower bound the terminal accepts for the long-poll window, in seconds.
pub const MIN_LONG_POLL_SECS: u64 = 1;

/// Upper bound the terminal accepts for the long-poll window, in seconds.
///
/// Out-of-range values are clamped rather than rejected so a misconfigured
/// poll interval degrades to a legal one instead of failing every wait.
pub const MAX_LONG_POLL_SECS: u64 = 60;
