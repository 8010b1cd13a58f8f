//! # Session Manager
//!
//! Owns the terminal session: opening, closing, and the bearer token every
//! other component rides on.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Session Lifecycle                                │
//! │                                                                         │
//! │   open_pos(credentials)                                                 │
//! │        │  POST /openpos {licenseToken, alias, userName, password}       │
//! │        │  ◄── {accessToken}                                             │
//! │        ▼                                                                │
//! │   token stored + installed on the transport                             │
//! │   (every later request carries Authorization: Bearer <token>)           │
//! │        │                                                                │
//! │        │  ... commands, event waits ...                                 │
//! │        ▼                                                                │
//! │   close_pos()   POST /closepos   best-effort: a failure here is        │
//! │                                  logged, never propagated - closing    │
//! │                                  must not block shutdown                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Exactly one session is active at a time. The token lives in one shared
//! holder on the transport; it is never copied into the dispatcher or
//! poller, so separate `Session` instances (e.g. in tests) cannot interfere
//! through process-global state.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use ecrlink_core::types::Credentials;
use ecrlink_core::validation::validate_credentials;

use crate::error::{LinkError, LinkResult};
use crate::protocol::{OpenPosRequest, OpenPosResponse};
use crate::transport::TerminalTransport;

/// Manages the POS session and its bearer token.
pub struct Session {
    transport: Arc<dyn TerminalTransport>,
    token: RwLock<Option<String>>,
}

impl Session {
    /// Creates a session manager over a transport. No network traffic until
    /// [`Session::open_pos`].
    pub fn new(transport: Arc<dyn TerminalTransport>) -> Self {
        Session {
            transport,
            token: RwLock::new(None),
        }
    }

    /// Opens the POS session and installs the bearer token.
    ///
    /// Fails with [`LinkError::Auth`] when the terminal answers with a
    /// non-success status or the response carries no `accessToken`. The
    /// token extraction is a typed decode on purpose; a drifting response
    /// shape fails loudly instead of storing an empty token.
    pub async fn open_pos(&self, credentials: &Credentials) -> LinkResult<String> {
        validate_credentials(credentials)?;

        let request = OpenPosRequest {
            license_token: credentials.license_token.clone(),
            alias: credentials.alias.clone(),
            user_name: credentials.user_name.clone(),
            password: credentials.password.clone(),
        };
        let body = serde_json::to_value(&request)?;

        let response = self.transport.post_json("openpos", Some(&body)).await?;
        if !response.is_success() {
            return Err(LinkError::Auth(format!(
                "openpos returned HTTP {}: {}",
                response.status, response.body
            )));
        }

        let parsed: OpenPosResponse = serde_json::from_str(&response.body)
            .map_err(|e| LinkError::Auth(format!("openpos response lacked accessToken: {e}")))?;

        *self.token.write().await = Some(parsed.access_token.clone());
        self.transport
            .set_bearer(Some(parsed.access_token.clone()))
            .await;

        info!(alias = %credentials.alias, "POS session opened");
        Ok(parsed.access_token)
    }

    /// Closes the POS session, best-effort.
    ///
    /// A transport failure here is logged and swallowed; the local session
    /// state is cleared either way so the caller's shutdown path never
    /// blocks on a dying terminal.
    pub async fn close_pos(&self) {
        match self.transport.post_json("closepos", None).await {
            Ok(response) if response.is_success() => {
                debug!("POS session closed");
            }
            Ok(response) => {
                warn!(status = response.status, "closepos answered non-success, ignoring");
            }
            Err(e) => {
                warn!(?e, "closepos failed, ignoring");
            }
        }

        *self.token.write().await = None;
        self.transport.set_bearer(None).await;
    }

    /// True while a token from a successful open is held.
    pub async fn is_open(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// The current bearer token, if any.
    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    /// Fetches terminal/software version info.
    ///
    /// Used by integrations that must announce or verify the terminal's
    /// software stack before taking payments.
    pub async fn software_versions(&self) -> LinkResult<Value> {
        let response = self.transport.get("getsoftwareversions").await?;
        if !response.is_success() {
            return Err(LinkError::Http {
                status: response.status,
                body: response.body,
            });
        }

        serde_json::from_str(&response.body).map_err(|e| LinkError::Parse {
            context: "software versions response".to_string(),
            detail: e.to_string(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    fn credentials() -> Credentials {
        Credentials {
            license_token: "lic".to_string(),
            alias: "shop-1".to_string(),
            user_name: "op".to_string(),
            password: "pw".to_string(),
        }
    }

    #[tokio::test]
    async fn test_open_pos_installs_bearer() {
        let transport = Arc::new(MockTransport::new());
        transport.push_post_ok(r#"{"accessToken":"tok-123"}"#);

        let session = Session::new(transport.clone());
        let token = session.open_pos(&credentials()).await.unwrap();

        assert_eq!(token, "tok-123");
        assert!(session.is_open().await);
        assert_eq!(transport.bearer().as_deref(), Some("tok-123"));

        let posts = transport.posts();
        assert_eq!(posts[0].path, "openpos");
        assert_eq!(posts[0].body.as_ref().unwrap()["alias"], "shop-1");
    }

    #[tokio::test]
    async fn test_open_pos_rejects_non_success() {
        let transport = Arc::new(MockTransport::new());
        transport.push_post_status(401, r#"{"error":"bad license"}"#);

        let session = Session::new(transport.clone());
        let err = session.open_pos(&credentials()).await.unwrap_err();

        assert!(matches!(err, LinkError::Auth(_)));
        assert!(!session.is_open().await);
        assert!(transport.bearer().is_none());
    }

    #[tokio::test]
    async fn test_open_pos_rejects_missing_token() {
        let transport = Arc::new(MockTransport::new());
        transport.push_post_ok(r#"{"sessionId":"whatever"}"#);

        let session = Session::new(transport.clone());
        let err = session.open_pos(&credentials()).await.unwrap_err();

        assert!(matches!(err, LinkError::Auth(_)));
        assert!(err.to_string().contains("accessToken"));
    }

    #[tokio::test]
    async fn test_open_pos_validates_credentials_before_wire() {
        let transport = Arc::new(MockTransport::new());
        let session = Session::new(transport.clone());

        let mut creds = credentials();
        creds.password = String::new();
        let err = session.open_pos(&creds).await.unwrap_err();

        assert!(matches!(err, LinkError::Core(_)));
        // Nothing was sent
        assert!(transport.posts().is_empty());
    }

    #[tokio::test]
    async fn test_close_pos_swallows_transport_errors() {
        let transport = Arc::new(MockTransport::new());
        transport.push_post_ok(r#"{"accessToken":"tok"}"#);
        transport.push_post_err(LinkError::Transport("connection reset".to_string()));

        let session = Session::new(transport.clone());
        session.open_pos(&credentials()).await.unwrap();

        // Does not panic, does not return an error, clears state
        session.close_pos().await;
        assert!(!session.is_open().await);
        assert!(transport.bearer().is_none());
    }

    #[tokio::test]
    async fn test_software_versions() {
        let transport = Arc::new(MockTransport::new());
        transport.push_post_ok(r#"{"accessToken":"tok"}"#);

        let session = Session::new(transport.clone());
        session.open_pos(&credentials()).await.unwrap();

        // getsoftwareversions rides the GET script
        transport.push_get_ok(r#"[{"name":"firmware","version":"1.0.5"}]"#);
        let versions = session.software_versions().await.unwrap();
        assert_eq!(versions[0]["version"], "1.0.5");
    }
}
