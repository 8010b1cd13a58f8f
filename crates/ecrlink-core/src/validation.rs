//! # Validation Module
//!
//! Input validation for command parameters, applied before anything reaches
//! the wire.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (client-side, before the request is built)       │
//! │  ├── Required fields (credentials, operation id, document number)      │
//! │  └── Format rules (PAN suffix digits, long-poll clamp)                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Terminal (authoritative)                                     │
//! │  └── Rejects what it dislikes with an INVALID_ARG result               │
//! │                                                                         │
//! │  Failing early keeps a half-validated command from ever occupying      │
//! │  the device.                                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use ecrlink_core::validation::{validate_document_nr, validate_pan_l4};
//!
//! validate_document_nr("T01").unwrap();
//! validate_pan_l4("9999").unwrap();
//! assert!(validate_pan_l4("99x9").is_err());
//! ```

use crate::error::ValidationError;
use crate::types::Credentials;
use crate::{MAX_LONG_POLL_SECS, MIN_LONG_POLL_SECS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

fn require_non_empty(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates session credentials before an open-pos call.
///
/// All four fields are required by the terminal; an empty one would only be
/// rejected after the request round-trip.
pub fn validate_credentials(credentials: &Credentials) -> ValidationResult<()> {
    require_non_empty("licenseToken", &credentials.license_token)?;
    require_non_empty("alias", &credentials.alias)?;
    require_non_empty("userName", &credentials.user_name)?;
    require_non_empty("password", &credentials.password)?;
    Ok(())
}

/// Validates a terminal operation identifier (VOID, CLOSEDOC).
pub fn validate_operation_id(operation_id: &str) -> ValidationResult<()> {
    require_non_empty("operationId", operation_id)
}

/// Validates an ECR document number.
///
/// ## Rules
/// - Must not be empty
/// - Must be at most 50 characters (wire field limit)
pub fn validate_document_nr(document_nr: &str) -> ValidationResult<()> {
    require_non_empty("documentNr", document_nr)?;

    if document_nr.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "documentNr".to_string(),
            max: 50,
        });
    }

    Ok(())
}

/// Validates the last-four-digits PAN hint sent with AUTHORIZE and CREDIT.
pub fn validate_pan_l4(pan_l4: &str) -> ValidationResult<()> {
    if pan_l4.len() != 4 || !pan_l4.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "panL4Digit".to_string(),
            reason: "must be exactly 4 digits".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Clamps a long-poll window to the range the terminal accepts (1-60 s).
///
/// Out-of-range values degrade to a legal window instead of failing the
/// wait; a zero-second poll would busy-loop and a too-long one would be
/// rejected by the terminal.
pub fn clamp_long_poll_secs(secs: u64) -> u64 {
    secs.clamp(MIN_LONG_POLL_SECS, MAX_LONG_POLL_SECS)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            license_token: "lic".to_string(),
            alias: "shop-1".to_string(),
            user_name: "operator".to_string(),
            password: "secret".to_string(),
        }
    }

    #[test]
    fn test_validate_credentials_ok() {
        assert!(validate_credentials(&credentials()).is_ok());
    }

    #[test]
    fn test_validate_credentials_missing_fields() {
        let mut creds = credentials();
        creds.license_token = String::new();
        assert!(validate_credentials(&creds).is_err());

        let mut creds = credentials();
        creds.password = "   ".to_string();
        assert!(matches!(
            validate_credentials(&creds),
            Err(ValidationError::Required { field }) if field == "password"
        ));
    }

    #[test]
    fn test_validate_operation_id() {
        assert!(validate_operation_id("OA10000000021069").is_ok());
        assert!(validate_operation_id("").is_err());
    }

    #[test]
    fn test_validate_document_nr() {
        assert!(validate_document_nr("T01").is_ok());
        assert!(validate_document_nr("").is_err());
        assert!(validate_document_nr(&"9".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_pan_l4() {
        assert!(validate_pan_l4("9999").is_ok());
        assert!(validate_pan_l4("0000").is_ok());
        assert!(validate_pan_l4("999").is_err());
        assert!(validate_pan_l4("99999").is_err());
        assert!(validate_pan_l4("99x9").is_err());
    }

    #[test]
    fn test_clamp_long_poll() {
        assert_eq!(clamp_long_poll_secs(0), 1);
        assert_eq!(clamp_long_poll_secs(5), 5);
        assert_eq!(clamp_long_poll_secs(60), 60);
        assert_eq!(clamp_long_poll_secs(600), 60);
    }
}
