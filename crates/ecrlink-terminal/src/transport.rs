//! # HTTP Transport
//!
//! The one seam between this crate and the network.
//!
//! ## Transport Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Transport Seam                                     │
//! │                                                                         │
//! │  Session ─┐                                                             │
//! │  Dispatcher ─┼──► TerminalTransport (trait)                             │
//! │  EventPoller ─┘          │                                              │
//! │                          ├──► HttpTransport   (reqwest, production)     │
//! │                          └──► MockTransport   (scripted, tests)         │
//! │                                                                         │
//! │  The bearer token lives HERE, in one shared holder. The session        │
//! │  manager writes it on open/close; every request reads it. Dispatcher   │
//! │  and poller never see the token itself.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything above this trait deals in `RawResponse` (status + body text);
//! classification and decoding happen in [`crate::protocol`].

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::config::TerminalConfig;
use crate::error::LinkResult;

// =============================================================================
// Raw Response
// =============================================================================

/// Raw HTTP outcome: status code plus undecoded body text.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,

    /// Body text, exactly as received.
    pub body: String,
}

impl RawResponse {
    /// True for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// =============================================================================
// Transport Trait
// =============================================================================

/// Object-safe transport abstraction over the terminal's HTTP endpoints.
///
/// A transport never interprets bodies and never retries; classification,
/// retries, and error policy belong to the callers.
#[async_trait]
pub trait TerminalTransport: Send + Sync {
    /// POSTs a JSON body (or an empty body) to a path under the base URL.
    async fn post_json(&self, path: &str, body: Option<&Value>) -> LinkResult<RawResponse>;

    /// GETs a path (with query string) under the base URL.
    async fn get(&self, path: &str) -> LinkResult<RawResponse>;

    /// Installs or clears the bearer token attached to every request.
    async fn set_bearer(&self, token: Option<String>);
}

// =============================================================================
// HTTP Transport (reqwest)
// =============================================================================

/// Production transport over `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    bearer: RwLock<Option<String>>,
}

impl HttpTransport {
    /// Builds a transport from the terminal configuration.
    ///
    /// The request timeout must exceed the largest long-poll window
    /// ([`TerminalConfig::validate`] enforces it) so a held-open `getEvent`
    /// is not misread as a dead connection.
    pub fn new(config: &TerminalConfig) -> LinkResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timing.connect_timeout())
            .timeout(config.timing.request_timeout())
            .build()?;

        Ok(HttpTransport {
            client,
            base_url: config.normalized_base_url(),
            bearer: RwLock::new(None),
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl TerminalTransport for HttpTransport {
    async fn post_json(&self, path: &str, body: Option<&Value>) -> LinkResult<RawResponse> {
        let url = self.url_for(path);
        let mut request = self.client.post(&url);

        if let Some(token) = self.bearer.read().await.as_deref() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        trace!(%url, "POST");
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(%url, status, "POST complete");

        Ok(RawResponse { status, body })
    }

    async fn get(&self, path: &str) -> LinkResult<RawResponse> {
        let url = self.url_for(path);
        let mut request = self.client.get(&url);

        if let Some(token) = self.bearer.read().await.as_deref() {
            request = request.bearer_auth(token);
        }

        trace!(%url, "GET");
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(%url, status, "GET complete");

        Ok(RawResponse { status, body })
    }

    async fn set_bearer(&self, token: Option<String>) {
        *self.bearer.write().await = token;
    }
}

// =============================================================================
// Mock Transport (tests)
// =============================================================================

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted transport for exercising the session, dispatcher, poller and
    //! orchestrator without a terminal.
    //!
    //! GET responses (the event queue) are a strict script: when it runs dry
    //! the mock returns a transport error, so a test with a wrong wait never
    //! spins forever.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::error::{LinkError, LinkResult};

    use super::{RawResponse, TerminalTransport};

    /// One recorded POST.
    #[derive(Debug, Clone)]
    pub struct RecordedPost {
        pub path: String,
        pub body: Option<Value>,
    }

    #[derive(Default)]
    pub struct MockTransport {
        posts: Mutex<Vec<RecordedPost>>,
        post_responses: Mutex<VecDeque<LinkResult<RawResponse>>>,
        get_responses: Mutex<VecDeque<LinkResult<RawResponse>>>,
        bearer: Mutex<Option<String>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Scripts the next POST response.
        pub fn push_post_ok(&self, body: &str) {
            self.post_responses.lock().unwrap().push_back(Ok(RawResponse {
                status: 200,
                body: body.to_string(),
            }));
        }

        /// Scripts the next POST to fail.
        pub fn push_post_err(&self, err: LinkError) {
            self.post_responses.lock().unwrap().push_back(Err(err));
        }

        /// Scripts the next POST to answer a non-success status.
        pub fn push_post_status(&self, status: u16, body: &str) {
            self.post_responses.lock().unwrap().push_back(Ok(RawResponse {
                status,
                body: body.to_string(),
            }));
        }

        /// Queues the next `getEvent` body.
        pub fn push_get_ok(&self, body: &str) {
            self.get_responses.lock().unwrap().push_back(Ok(RawResponse {
                status: 200,
                body: body.to_string(),
            }));
        }

        /// Queues a `getEvent` transport failure.
        pub fn push_get_err(&self, err: LinkError) {
            self.get_responses.lock().unwrap().push_back(Err(err));
        }

        /// Queues a `getEvent` response with a non-success status.
        pub fn push_get_status(&self, status: u16, body: &str) {
            self.get_responses.lock().unwrap().push_back(Ok(RawResponse {
                status,
                body: body.to_string(),
            }));
        }

        /// Queues an idle tick.
        pub fn push_queue_empty(&self) {
            self.push_get_ok(r#"{"message":"Queue empty."}"#);
        }

        /// All POSTs recorded so far.
        pub fn posts(&self) -> Vec<RecordedPost> {
            self.posts.lock().unwrap().clone()
        }

        /// The `executeposcmd` command names sent, in order.
        pub fn commands_sent(&self) -> Vec<String> {
            self.posts()
                .iter()
                .filter_map(|post| {
                    post.body
                        .as_ref()?
                        .pointer("/header/command")?
                        .as_str()
                        .map(str::to_string)
                })
                .collect()
        }

        /// Current bearer token, as the transport sees it.
        pub fn bearer(&self) -> Option<String> {
            self.bearer.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TerminalTransport for MockTransport {
        async fn post_json(&self, path: &str, body: Option<&Value>) -> LinkResult<RawResponse> {
            self.posts.lock().unwrap().push(RecordedPost {
                path: path.to_string(),
                body: body.cloned(),
            });

            // Unscripted POSTs succeed with a plain OK envelope
            self.post_responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(RawResponse {
                        status: 200,
                        body: r#"{"result":{"resultCode":"OK"}}"#.to_string(),
                    })
                })
        }

        async fn get(&self, _path: &str) -> LinkResult<RawResponse> {
            self.get_responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(LinkError::Transport(
                        "mock event script exhausted".to_string(),
                    ))
                })
        }

        async fn set_bearer(&self, token: Option<String>) {
            *self.bearer.lock().unwrap() = token;
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_response_success_range() {
        assert!(RawResponse { status: 200, body: String::new() }.is_success());
        assert!(RawResponse { status: 204, body: String::new() }.is_success());
        assert!(!RawResponse { status: 302, body: String::new() }.is_success());
        assert!(!RawResponse { status: 401, body: String::new() }.is_success());
        assert!(!RawResponse { status: 500, body: String::new() }.is_success());
    }

    #[test]
    fn test_http_transport_url_join() {
        let config = TerminalConfig {
            base_url: "http://terminal:6678/v105/".to_string(),
            ..Default::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(
            transport.url_for("/getEvent?longPollingTimeout=5"),
            "http://terminal:6678/v105/getEvent?longPollingTimeout=5"
        );
        assert_eq!(transport.url_for("openpos"), "http://terminal:6678/v105/openpos");
    }

    #[tokio::test]
    async fn test_mock_transport_scripts_in_order() {
        use mock::MockTransport;

        let transport = MockTransport::new();
        transport.push_get_ok(r#"{"message":"Queue empty."}"#);
        transport.push_get_ok(r#"{"eventName":"ONCARD"}"#);

        let first = transport.get("getEvent?longPollingTimeout=5").await.unwrap();
        assert!(first.body.contains("Queue empty."));
        let second = transport.get("getEvent?longPollingTimeout=5").await.unwrap();
        assert!(second.body.contains("ONCARD"));

        // Script exhaustion is a hard error, not a hang
        assert!(transport.get("getEvent?longPollingTimeout=5").await.is_err());
    }
}
